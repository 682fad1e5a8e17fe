//! seedlink.toml client configuration parser.
//!
//! This is the on-disk representation only: string durations and raw
//! address strings. `seedlink-client` validates it into `ServerSettings`.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::command::WriteConcern;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Seed addresses, in order. Order is part of the server identity.
    pub seeds: Vec<String>,
    pub database: Option<String>,
    /// Discovery deadline, e.g. `"30s"`.
    pub connect_timeout: Option<String>,
    pub credentials: Option<CredentialsConfig>,
    pub write_concern: Option<WriteConcern>,
    pub pool: Option<PoolSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsConfig {
    pub username: String,
    pub password: String,
    pub admin: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSection {
    pub max_size: Option<usize>,
    pub connect_timeout: Option<String>,
    pub idle_timeout: Option<String>,
}

impl ClientConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: ClientConfig = toml::from_str(content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Parse a duration string: `"500ms"`, `"5s"`, `"2m"`, or bare seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.trim().parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.trim().parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.trim().parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
