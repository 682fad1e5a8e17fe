//! ServerSettings — validated connection settings for one server.
//!
//! Built programmatically or from a `seedlink-core::ClientConfig` (the TOML
//! representation).

use std::time::Duration;

use seedlink_core::config::parse_duration;
use seedlink_core::{ClientConfig, Credentials, ServerAddress, WriteConcern};

use crate::discovery::DEFAULT_CLEANUP_GRACE;
use crate::error::{ClientError, ClientResult};
use crate::pool::PoolConfig;

/// Default discovery deadline for `Server::connect`.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Candidate addresses, in order. Two settings share a server only if
    /// their seed lists are equal as ordered sequences.
    pub seeds: Vec<ServerAddress>,
    pub credentials: Option<Credentials>,
    /// Target database named alongside the credentials, if any.
    pub database: Option<String>,
    pub connect_timeout: Duration,
    pub write_concern: WriteConcern,
    pub pool: PoolConfig,
    /// How long cancelled discovery probes get to close their connections
    /// in the background. `connect` does not wait for this.
    pub probe_cleanup_grace: Duration,
}

impl ServerSettings {
    pub fn new(seeds: Vec<ServerAddress>) -> Self {
        Self {
            seeds,
            credentials: None,
            database: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            write_concern: WriteConcern::default(),
            pool: PoolConfig::default(),
            probe_cleanup_grace: DEFAULT_CLEANUP_GRACE,
        }
    }

    /// Settings from a comma-separated seed string such as `"db1:27017,db2"`.
    pub fn from_seed_list(seeds: &str) -> ClientResult<Self> {
        let seeds = ServerAddress::parse_list(seeds)?;
        if seeds.is_empty() {
            return Err(ClientError::Config("seed list is empty".to_string()));
        }
        Ok(Self::new(seeds))
    }

    /// Validate a `ClientConfig` into settings.
    pub fn from_client_config(config: &ClientConfig) -> ClientResult<Self> {
        let seeds = config
            .seeds
            .iter()
            .map(|s| ServerAddress::parse(s))
            .collect::<Result<Vec<_>, _>>()?;
        if seeds.is_empty() {
            return Err(ClientError::Config("seed list is empty".to_string()));
        }

        let mut settings = Self::new(seeds);

        if let Some(timeout) = &config.connect_timeout {
            settings.connect_timeout = duration_field("connect_timeout", timeout)?;
        }
        if let Some(creds) = &config.credentials {
            settings.credentials = Some(if creds.admin.unwrap_or(false) {
                Credentials::admin(&creds.username, &creds.password)
            } else {
                Credentials::new(&creds.username, &creds.password)
            });
        }
        settings.database = config.database.clone();
        if let Some(wc) = &config.write_concern {
            settings.write_concern = wc.clone();
        }
        if let Some(pool) = &config.pool {
            if let Some(max_size) = pool.max_size {
                if max_size == 0 {
                    return Err(ClientError::Config("pool.max_size must be at least 1".to_string()));
                }
                settings.pool.max_size = max_size;
            }
            if let Some(t) = &pool.connect_timeout {
                settings.pool.connect_timeout = duration_field("pool.connect_timeout", t)?;
            }
            if let Some(t) = &pool.idle_timeout {
                settings.pool.idle_timeout = duration_field("pool.idle_timeout", t)?;
            }
        }

        Ok(settings)
    }

    pub fn with_credentials(self, credentials: Credentials) -> Self {
        Self {
            credentials: Some(credentials),
            ..self
        }
    }

    pub fn with_database(self, database: &str) -> Self {
        Self {
            database: Some(database.to_string()),
            ..self
        }
    }

    pub fn with_connect_timeout(self, connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            ..self
        }
    }

    pub fn with_write_concern(self, write_concern: WriteConcern) -> Self {
        Self {
            write_concern,
            ..self
        }
    }

    pub fn with_pool_config(self, pool: PoolConfig) -> Self {
        Self { pool, ..self }
    }

    pub fn with_probe_cleanup_grace(self, probe_cleanup_grace: Duration) -> Self {
        Self {
            probe_cleanup_grace,
            ..self
        }
    }
}

fn duration_field(field: &str, value: &str) -> ClientResult<Duration> {
    parse_duration(value)
        .ok_or_else(|| ClientError::Config(format!("{field}: invalid duration '{value}'")))
}
