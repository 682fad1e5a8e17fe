//! seedlink-client — connection-management core for a replica-set database client.
//!
//! - **connection**: `Connection` / `ConnectionFactory` traits the core drives
//! - **pool**: `ConnectionPool` seeded from the discovery winner, lazy growth
//! - **discovery**: parallel `ismaster` probing with a deadline and one winner
//! - **server**: `Server` state machine and database-handle cache
//! - **database**: `Database` handles that run commands on the primary
//! - **admin**: drop/list databases, rename collection
//! - **registry**: `ServerRegistry`, one shared `Server` per seed list

pub mod admin;
pub mod connection;
pub mod database;
pub mod discovery;
pub mod error;
pub mod pool;
pub mod registry;
pub mod server;
pub mod settings;

#[cfg(test)]
mod testing;

pub use connection::{Connection, ConnectionFactory};
pub use database::Database;
pub use discovery::{DiscoveryOutcome, IsMasterReply, PrimaryDiscovery};
pub use error::{ClientError, ClientResult, TransportError};
pub use pool::{ConnectionPool, PoolConfig, PoolStats, PooledConnection};
pub use registry::ServerRegistry;
pub use server::{Server, ServerState};
pub use settings::ServerSettings;
