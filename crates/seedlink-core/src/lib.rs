//! seedlink-core — value types shared by the seedlink client layers.
//!
//! - **address**: `ServerAddress` host/port values used as map and dedup keys
//! - **document**: `Document`, the opaque command/reply value
//! - **command**: `CommandRequest`, `QueryFlags`, and the opaque `WriteConcern`
//! - **credentials**: `Credentials` and their canonical cache identity
//! - **config**: `ClientConfig` TOML parsing and duration strings

pub mod address;
pub mod command;
pub mod config;
pub mod credentials;
pub mod document;
pub mod error;

pub use address::{DEFAULT_PORT, ServerAddress};
pub use command::{CommandRequest, QueryFlags, WriteConcern};
pub use config::ClientConfig;
pub use credentials::Credentials;
pub use document::Document;
pub use error::AddressError;
