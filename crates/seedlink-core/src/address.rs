//! Server addresses.
//!
//! A `ServerAddress` is an immutable `(host, port)` pair with structural
//! equality. It is used both as a map key and as the deduplication key when
//! discovery expands its candidate set from reported replica-set members.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AddressError;

/// Port assumed when an address string omits one.
pub const DEFAULT_PORT: u16 = 27017;

/// Host/port of a single database server.
///
/// Hostnames are case-insensitive, so the host is stored lowercased; two
/// addresses naming the same host in different case compare equal.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServerAddress {
    host: String,
    port: u16,
}

impl ServerAddress {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_ascii_lowercase(),
            port,
        }
    }

    /// Parse `host`, `host:port`, `[v6]` or `[v6]:port`.
    pub fn parse(input: &str) -> Result<Self, AddressError> {
        let trimmed = input.trim();

        let (host, port) = if let Some(rest) = trimmed.strip_prefix('[') {
            let (host, after) = rest
                .split_once(']')
                .ok_or_else(|| AddressError::UnterminatedIpv6(input.to_string()))?;
            match after.strip_prefix(':') {
                Some(port) => (host, Some(port)),
                None if after.is_empty() => (host, None),
                None => {
                    return Err(AddressError::InvalidPort {
                        input: input.to_string(),
                        reason: format!("unexpected trailing '{after}'"),
                    });
                }
            }
        } else if trimmed.matches(':').count() > 1 {
            // Bare IPv6 literal without brackets cannot carry a port.
            (trimmed, None)
        } else {
            match trimmed.split_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (trimmed, None),
            }
        };

        if host.is_empty() {
            return Err(AddressError::EmptyHost(input.to_string()));
        }

        let port = match port {
            Some(p) => p.parse::<u16>().map_err(|e| AddressError::InvalidPort {
                input: input.to_string(),
                reason: e.to_string(),
            })?,
            None => DEFAULT_PORT,
        };
        if port == 0 {
            return Err(AddressError::InvalidPort {
                input: input.to_string(),
                reason: "port must be non-zero".to_string(),
            });
        }

        Ok(Self::new(host, port))
    }

    /// Parse a comma-separated seed list, preserving order.
    pub fn parse_list(input: &str) -> Result<Vec<Self>, AddressError> {
        input
            .split(',')
            .filter(|part| !part.trim().is_empty())
            .map(Self::parse)
            .collect()
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for ServerAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ServerAddress {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ServerAddress> for String {
    fn from(address: ServerAddress) -> Self {
        address.to_string()
    }
}
