//! Error types for core value parsing.

use thiserror::Error;

/// Errors produced while parsing a `host[:port]` server address.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("empty host in server address '{0}'")]
    EmptyHost(String),

    #[error("invalid port in server address '{input}': {reason}")]
    InvalidPort { input: String, reason: String },

    #[error("unterminated IPv6 literal in server address '{0}'")]
    UnterminatedIpv6(String),
}
