//! Connection pool for a single server address.
//!
//! A pool is born from discovery: the connection that answered the winning
//! primary probe becomes its first idle connection. Further connections to
//! the same address are opened lazily through the `ConnectionFactory` when
//! every existing one is checked out.
//!
//! ```text
//! checkout()
//!   → closed? → PoolClosed
//!   → acquire permit (wait up to connect_timeout) → else PoolExhausted
//!     → idle connection available → reuse it
//!     → none idle → factory.open(address)
//! release(conn, healthy)
//!   → healthy and pool open → back to idle
//!   → otherwise → close it
//! ```
//!
//! The pool serializes its own state; it is shared by every database handle
//! of a server and never takes the server lock.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use seedlink_core::ServerAddress;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};

use crate::connection::{Connection, ConnectionFactory};
use crate::error::{ClientError, ClientResult};

/// Configuration for a server's connection pool.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum checked-out connections at once (default: 100).
    pub max_size: usize,
    /// Maximum time a checkout waits on an exhausted pool (default: 5s).
    pub connect_timeout: Duration,
    /// Idle connections unused for longer are reaped (default: 300s).
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 100,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(300),
        }
    }
}

/// Pool statistics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolStats {
    /// Connections currently checked out.
    pub active: usize,
    /// Connections sitting idle in the pool.
    pub idle: usize,
    /// Total connections (active + idle).
    pub total: usize,
    /// Number of checkouts that timed out waiting for a free slot.
    pub wait_count: u64,
}

struct IdleConnection {
    id: u64,
    created_at: Instant,
    last_used: Instant,
    connection: Box<dyn Connection>,
}

/// A connection checked out of a pool. Hand it back with
/// [`ConnectionPool::release`]; dropping it frees the slot but discards the
/// connection.
pub struct PooledConnection {
    id: u64,
    created_at: Instant,
    connection: Box<dyn Connection>,
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}

impl Deref for PooledConnection {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        self.connection.as_ref()
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.connection.as_mut()
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("connection", &self.connection)
            .finish_non_exhaustive()
    }
}

pub struct ConnectionPool {
    address: ServerAddress,
    config: PoolConfig,
    factory: Arc<dyn ConnectionFactory>,
    idle: Mutex<Vec<IdleConnection>>,
    /// One permit per checked-out connection.
    semaphore: Arc<Semaphore>,
    next_id: AtomicU64,
    wait_count: AtomicU64,
    closed: AtomicBool,
}

impl ConnectionPool {
    /// Create a pool seeded with an already-open connection to `address`.
    pub fn new(
        address: ServerAddress,
        seed: Box<dyn Connection>,
        factory: Arc<dyn ConnectionFactory>,
        config: PoolConfig,
    ) -> Self {
        let now = Instant::now();
        let seed = IdleConnection {
            id: 1,
            created_at: now,
            last_used: now,
            connection: seed,
        };
        Self {
            address,
            semaphore: Arc::new(Semaphore::new(config.max_size)),
            config,
            factory,
            idle: Mutex::new(vec![seed]),
            next_id: AtomicU64::new(2),
            wait_count: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn address(&self) -> &ServerAddress {
        &self.address
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Check out a connection, reusing an idle one or opening a new one.
    pub async fn checkout(&self) -> ClientResult<PooledConnection> {
        if self.is_closed() {
            return Err(ClientError::PoolClosed(self.address.clone()));
        }

        let permit = match tokio::time::timeout(
            self.config.connect_timeout,
            Arc::clone(&self.semaphore).acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(ClientError::PoolClosed(self.address.clone())),
            Err(_) => {
                self.wait_count.fetch_add(1, Ordering::Relaxed);
                return Err(ClientError::PoolExhausted {
                    address: self.address.clone(),
                    max_size: self.config.max_size,
                });
            }
        };

        if let Some(idle) = self.idle.lock().await.pop() {
            tracing::debug!(
                address = %self.address,
                id = idle.id,
                "reused idle connection from pool"
            );
            return Ok(PooledConnection {
                id: idle.id,
                created_at: idle.created_at,
                connection: idle.connection,
                _permit: permit,
            });
        }

        // Dropping the permit on failure frees the slot again.
        let connection = self.factory.open(&self.address).await?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(address = %self.address, id, "opened new pooled connection");

        Ok(PooledConnection {
            id,
            created_at: Instant::now(),
            connection,
            _permit: permit,
        })
    }

    /// Return a connection to the pool. Unhealthy connections, and any
    /// connection released after the pool was closed, are closed instead.
    pub async fn release(&self, conn: PooledConnection, healthy: bool) {
        let PooledConnection {
            id,
            created_at,
            mut connection,
            _permit,
        } = conn;

        if !healthy || self.is_closed() {
            tracing::debug!(
                address = %self.address,
                id,
                healthy,
                "closing connection on release"
            );
            connection.close().await;
            return;
        }

        let mut idle = self.idle.lock().await;
        // `close` may have drained the idle list while we waited for the lock.
        if self.is_closed() {
            drop(idle);
            tracing::debug!(address = %self.address, id, "pool closed during release");
            connection.close().await;
            return;
        }
        idle.push(IdleConnection {
            id,
            created_at,
            last_used: Instant::now(),
            connection,
        });
        tracing::debug!(
            address = %self.address,
            id,
            idle_count = idle.len(),
            "returned connection to pool"
        );
    }

    /// Close idle connections unused for longer than `idle_timeout`.
    /// Returns the number reaped.
    pub async fn reap_idle(&self) -> usize {
        let idle_timeout = self.config.idle_timeout;
        let expired: Vec<IdleConnection> = {
            let mut idle = self.idle.lock().await;
            let (keep, expired) = idle
                .drain(..)
                .partition(|conn| conn.last_used.elapsed() < idle_timeout);
            *idle = keep;
            expired
        };

        let reaped = expired.len();
        for mut conn in expired {
            conn.connection.close().await;
        }
        if reaped > 0 {
            tracing::info!(address = %self.address, reaped, "reaped idle connections");
        }
        reaped
    }

    /// Close every idle connection and reject further checkouts. Connections
    /// still checked out are closed when released. Idempotent; returns the
    /// number of idle connections closed.
    pub async fn close(&self) -> usize {
        if self.closed.swap(true, Ordering::AcqRel) {
            return 0;
        }
        self.semaphore.close();

        let drained: Vec<IdleConnection> = self.idle.lock().await.drain(..).collect();
        let closed = drained.len();
        for mut conn in drained {
            conn.connection.close().await;
        }

        tracing::info!(address = %self.address, closed, "connection pool closed");
        closed
    }

    pub async fn stats(&self) -> PoolStats {
        let idle = self.idle.lock().await.len();
        let active = self
            .config
            .max_size
            .saturating_sub(self.semaphore.available_permits());
        PoolStats {
            active,
            idle,
            total: active + idle,
            wait_count: self.wait_count.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("address", &self.address)
            .field("config", &self.config)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
