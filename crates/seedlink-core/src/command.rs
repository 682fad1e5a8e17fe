//! Command requests and write concerns.

use serde::{Deserialize, Serialize};

use crate::document::Document;

/// Per-request query flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueryFlags {
    /// Allow a non-primary member to answer.
    pub slave_ok: bool,
}

/// A single command sent over a connection: a query against `<db>.$cmd`.
#[derive(Clone, Debug, PartialEq)]
pub struct CommandRequest {
    /// Full namespace, e.g. `admin.$cmd`.
    pub namespace: String,
    pub query: Document,
    pub flags: QueryFlags,
    pub skip: u32,
    pub limit: i32,
    /// Field projection; `None` returns whole documents.
    pub fields: Option<Document>,
}

impl CommandRequest {
    /// Build a command against `database`'s command namespace.
    pub fn command(database: &str, query: Document) -> Self {
        Self {
            namespace: format!("{database}.$cmd"),
            query,
            flags: QueryFlags::default(),
            skip: 0,
            limit: 1,
            fields: None,
        }
    }

    pub fn with_slave_ok(mut self) -> Self {
        self.flags.slave_ok = true;
        self
    }

    /// Database part of the namespace.
    pub fn database(&self) -> &str {
        self.namespace
            .strip_suffix(".$cmd")
            .unwrap_or(&self.namespace)
    }

    /// Command name (first key of the query document).
    pub fn command_name(&self) -> Option<&str> {
        self.query.first_key()
    }
}

/// Write acknowledgement policy ("safe mode").
///
/// Carried through to connections untouched; the connection core never acts
/// on it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteConcern {
    #[serde(default)]
    pub acknowledged: bool,
    /// Number of members that must acknowledge.
    pub w: Option<u32>,
    pub wtimeout_ms: Option<u64>,
    #[serde(default)]
    pub fsync: bool,
    #[serde(default)]
    pub journal: bool,
}

impl WriteConcern {
    /// Fire-and-forget writes.
    pub fn unacknowledged() -> Self {
        Self::default()
    }

    pub fn acknowledged() -> Self {
        Self {
            acknowledged: true,
            ..Self::default()
        }
    }

    pub fn with_w(self, w: u32) -> Self {
        Self {
            acknowledged: true,
            w: Some(w),
            ..self
        }
    }

    pub fn is_acknowledged(&self) -> bool {
        self.acknowledged
    }
}
