//! Server — one logical database server reached through a seed list.
//!
//! Owns the connection state machine, the connection pool created from
//! discovery, and the cache of database handles.
//!
//! ```text
//!  Disconnected ──connect()──→ Connecting ──discovery ok──→ Connected
//!       ↑                           │                           │
//!       └──────── discovery err ────┘                           │
//!       └──────────────────────── disconnect() ─────────────────┘
//! ```
//!
//! Every state change happens under the server's single lock, so at most one
//! connect/disconnect/reconnect is in progress at a time. `pool` is `Some`
//! exactly when the state is `Connected`.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use seedlink_core::{Credentials, ServerAddress};
use tokio::sync::{Mutex, watch};
use tokio::time::Instant;

use crate::connection::ConnectionFactory;
use crate::database::Database;
use crate::discovery::PrimaryDiscovery;
use crate::error::ClientResult;
use crate::pool::ConnectionPool;
use crate::settings::ServerSettings;

/// Connection state of a `Server`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ServerState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerState::Disconnected => write!(f, "disconnected"),
            ServerState::Connecting => write!(f, "connecting"),
            ServerState::Connected => write!(f, "connected"),
        }
    }
}

/// Database-handle cache key: the database name, plus the identity of
/// explicitly supplied credentials.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct DatabaseKey {
    name: String,
    credentials: Option<String>,
}

#[derive(Default)]
struct ServerInner {
    pool: Option<Arc<ConnectionPool>>,
    primary: Option<ServerAddress>,
    replica_set: Option<Vec<ServerAddress>>,
    databases: HashMap<DatabaseKey, Arc<Database>>,
}

pub struct Server {
    settings: ServerSettings,
    factory: Arc<dyn ConnectionFactory>,
    discovery: PrimaryDiscovery,
    admin_credentials: Option<Credentials>,
    default_credentials: Option<Credentials>,
    /// Current state. Written only while `inner` is locked.
    state: watch::Sender<ServerState>,
    inner: Mutex<ServerInner>,
    this: Weak<Server>,
}

impl Server {
    /// Create a disconnected server. Nothing is probed until `connect`.
    ///
    /// Credentials given without a database name are server-wide admin
    /// credentials if flagged admin, default credentials otherwise.
    /// Credentials given with a database name are default credentials.
    pub fn new(settings: ServerSettings, factory: Arc<dyn ConnectionFactory>) -> Arc<Self> {
        let (admin_credentials, default_credentials) =
            match (&settings.credentials, &settings.database) {
                (Some(creds), None) if creds.is_admin() => (Some(creds.clone()), None),
                (Some(creds), _) => (None, Some(creds.clone())),
                (None, _) => (None, None),
            };

        Arc::new_cyclic(|this| Self {
            discovery: PrimaryDiscovery::new(Arc::clone(&factory))
                .with_cleanup_grace(settings.probe_cleanup_grace),
            factory,
            admin_credentials,
            default_credentials,
            state: watch::Sender::new(ServerState::Disconnected),
            inner: Mutex::new(ServerInner::default()),
            this: this.clone(),
            settings,
        })
    }

    pub fn settings(&self) -> &ServerSettings {
        &self.settings
    }

    /// The seed list this server was created with. Never changes.
    pub fn seed_list(&self) -> &[ServerAddress] {
        &self.settings.seeds
    }

    pub fn admin_credentials(&self) -> Option<&Credentials> {
        self.admin_credentials.as_ref()
    }

    pub fn default_credentials(&self) -> Option<&Credentials> {
        self.default_credentials.as_ref()
    }

    /// Current state, without waiting for an in-progress transition.
    pub fn state(&self) -> ServerState {
        *self.state.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<ServerState> {
        self.state.subscribe()
    }

    /// Members reported by the primary at the last successful connect, or
    /// `None` if it did not report a replica set.
    pub async fn replica_set(&self) -> Option<Vec<ServerAddress>> {
        self.inner.lock().await.replica_set.clone()
    }

    /// Address of the elected primary while connected.
    pub async fn primary(&self) -> Option<ServerAddress> {
        self.inner.lock().await.primary.clone()
    }

    /// Connect using the configured timeout.
    pub async fn connect(&self) -> ClientResult<()> {
        self.connect_with_timeout(self.settings.connect_timeout)
            .await
    }

    /// Discover the primary and open the pool. No-op if already connected.
    /// On failure the server is left disconnected and may be retried.
    pub async fn connect_with_timeout(&self, timeout: Duration) -> ClientResult<()> {
        let mut inner = self.inner.lock().await;
        self.connect_locked(&mut inner, timeout).await.map(|_| ())
    }

    /// Close the pool and return to `Disconnected`. No-op if not connected.
    pub async fn disconnect(&self) {
        let mut inner = self.inner.lock().await;
        self.disconnect_locked(&mut inner).await;
    }

    /// Disconnect only if `pool` is still the current pool. A caller that
    /// saw a failure on an older pool must not tear down a newer one.
    pub(crate) async fn disconnect_pool(&self, pool: &Arc<ConnectionPool>) -> bool {
        let mut inner = self.inner.lock().await;
        let is_current = inner
            .pool
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, pool));
        if is_current {
            self.disconnect_locked(&mut inner).await;
        }
        is_current
    }

    /// Disconnect then connect, without releasing the lock in between.
    pub async fn reconnect(&self, timeout: Duration) -> ClientResult<()> {
        let mut inner = self.inner.lock().await;
        self.disconnect_locked(&mut inner).await;
        self.connect_locked(&mut inner, timeout).await.map(|_| ())
    }

    /// The connection pool, connecting first (with the configured timeout)
    /// if there is none.
    pub async fn get_connection_pool(&self) -> ClientResult<Arc<ConnectionPool>> {
        let mut inner = self.inner.lock().await;
        self.connect_locked(&mut inner, self.settings.connect_timeout)
            .await
    }

    /// Handle for `name`, using the server's default credentials.
    pub async fn get_database(&self, name: &str) -> Arc<Database> {
        self.database_entry(name, None).await
    }

    /// Handle for `name` bound to explicit credentials. Handles are cached
    /// per (name, credentials identity).
    pub async fn get_database_with_credentials(
        &self,
        name: &str,
        credentials: &Credentials,
    ) -> Arc<Database> {
        self.database_entry(name, Some(credentials)).await
    }

    pub async fn admin_database(&self) -> Arc<Database> {
        self.get_database("admin").await
    }

    async fn database_entry(&self, name: &str, explicit: Option<&Credentials>) -> Arc<Database> {
        let key = DatabaseKey {
            name: name.to_string(),
            credentials: explicit.map(Credentials::identity),
        };

        let mut inner = self.inner.lock().await;
        let database = inner.databases.entry(key).or_insert_with(|| {
            let credentials = explicit
                .cloned()
                .or_else(|| self.implicit_credentials(name));
            Arc::new(Database::new(
                self.this.clone(),
                name,
                credentials,
                self.settings.write_concern.clone(),
            ))
        });
        Arc::clone(database)
    }

    /// Admin credentials apply server-wide; default credentials win for
    /// any database other than `admin`.
    fn implicit_credentials(&self, name: &str) -> Option<Credentials> {
        if name == "admin" {
            self.admin_credentials
                .clone()
                .or_else(|| self.default_credentials.clone())
        } else {
            self.default_credentials
                .clone()
                .or_else(|| self.admin_credentials.clone())
        }
    }

    async fn connect_locked(
        &self,
        inner: &mut ServerInner,
        timeout: Duration,
    ) -> ClientResult<Arc<ConnectionPool>> {
        if let Some(pool) = &inner.pool {
            return Ok(Arc::clone(pool));
        }

        let guard = ConnectingGuard::enter(&self.state);
        let deadline = Instant::now() + timeout;
        let outcome = match self.discovery.discover(&self.settings.seeds, deadline).await {
            Ok(outcome) => outcome,
            Err(e) => {
                inner.primary = None;
                inner.replica_set = None;
                drop(guard);
                tracing::info!(state = %ServerState::Disconnected, error = %e, "connect failed");
                return Err(e);
            }
        };

        let pool = Arc::new(ConnectionPool::new(
            outcome.primary.clone(),
            outcome.connection,
            Arc::clone(&self.factory),
            self.settings.pool.clone(),
        ));
        inner.replica_set = outcome.reply.hosts;
        inner.primary = Some(outcome.primary);
        inner.pool = Some(Arc::clone(&pool));
        guard.complete(ServerState::Connected);

        tracing::info!(
            state = %ServerState::Connected,
            primary = %pool.address(),
            members = inner.replica_set.as_ref().map_or(0, Vec::len),
            "server connected"
        );
        Ok(pool)
    }

    /// Tear down the pool. State and pool are cleared together before the
    /// pool's connections are closed, so a dropped caller cannot leave the
    /// server `Connected` without a pool.
    async fn disconnect_locked(&self, inner: &mut ServerInner) {
        let Some(pool) = inner.pool.take() else {
            return;
        };
        inner.primary = None;
        inner.replica_set = None;
        self.state.send_replace(ServerState::Disconnected);
        tracing::info!(state = %ServerState::Disconnected, address = %pool.address(), "server disconnected");
        pool.close().await;
    }
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("seeds", &self.settings.seeds)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Sets `Connecting` on entry. Unless completed, reverts to `Disconnected`
/// when dropped, including when the `connect` future itself is dropped.
struct ConnectingGuard<'a> {
    state: &'a watch::Sender<ServerState>,
    completed: bool,
}

impl<'a> ConnectingGuard<'a> {
    fn enter(state: &'a watch::Sender<ServerState>) -> Self {
        state.send_replace(ServerState::Connecting);
        Self {
            state,
            completed: false,
        }
    }

    fn complete(mut self, state: ServerState) {
        self.state.send_replace(state);
        self.completed = true;
    }
}

impl Drop for ConnectingGuard<'_> {
    fn drop(&mut self) {
        if !self.completed {
            self.state.send_replace(ServerState::Disconnected);
        }
    }
}
