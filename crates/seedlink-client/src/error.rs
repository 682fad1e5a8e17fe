//! Client error types.

use seedlink_core::{AddressError, ServerAddress};
use thiserror::Error;

/// Result type alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Socket-level failure reported by a connection or connection factory.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("i/o error talking to {address}: {message}")]
    Io {
        address: ServerAddress,
        message: String,
    },

    #[error("connection to {0} is closed")]
    Closed(ServerAddress),

    #[error("no reply document received from {0}")]
    EmptyReply(ServerAddress),

    #[error("timed out talking to {0}")]
    Timeout(ServerAddress),
}

/// Errors surfaced to callers of the connection core.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Discovery ran out of candidates or time without finding a primary.
    #[error("no primary found among {probed} candidate(s) for seed list [{}]", format_seeds(.seeds))]
    NoPrimary {
        seeds: Vec<ServerAddress>,
        probed: usize,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("command '{command}' failed: {message}")]
    CommandFailed { command: String, message: String },

    #[error("invalid reply to '{command}': {reason}")]
    InvalidReply { command: String, reason: String },

    #[error("{0} is not implemented")]
    NotImplemented(&'static str),

    #[error("connection pool for {0} is closed")]
    PoolClosed(ServerAddress),

    #[error("connection pool for {address} exhausted (max_size: {max_size})")]
    PoolExhausted {
        address: ServerAddress,
        max_size: usize,
    },

    #[error("server for database '{0}' has been dropped")]
    ServerDropped(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Address(#[from] AddressError),
}

fn format_seeds(seeds: &[ServerAddress]) -> String {
    seeds
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_primary_lists_seeds() {
        let err = ClientError::NoPrimary {
            seeds: vec![ServerAddress::new("a", 1), ServerAddress::new("b", 2)],
            probed: 3,
        };
        assert_eq!(
            err.to_string(),
            "no primary found among 3 candidate(s) for seed list [a:1, b:2]"
        );
    }

    #[test]
    fn transport_error_converts() {
        let err: ClientError = TransportError::Closed(ServerAddress::new("a", 1)).into();
        assert!(matches!(err, ClientError::Transport(TransportError::Closed(_))));
    }
}
