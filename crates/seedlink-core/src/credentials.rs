//! Authentication credentials.
//!
//! The connection core treats credentials as opaque apart from two things:
//! the admin flag (server-wide vs. per-database), and a canonical identity
//! used to key the database-handle cache.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const ADMIN_SUFFIX: &str = "(admin)";

#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Credentials {
    username: String,
    password: String,
    #[serde(default)]
    admin: bool,
}

impl Credentials {
    /// Create credentials. A username ending in `(admin)` marks them as
    /// admin credentials; the suffix is stripped.
    pub fn new(username: &str, password: &str) -> Self {
        match username.strip_suffix(ADMIN_SUFFIX) {
            Some(name) => Self::admin(name, password),
            None => Self {
                username: username.to_string(),
                password: password.to_string(),
                admin: false,
            },
        }
    }

    pub fn admin(username: &str, password: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
            admin: true,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn is_admin(&self) -> bool {
        self.admin
    }

    /// Canonical identity: `user[(admin)]#<password digest prefix>`.
    ///
    /// Two credentials with the same identity are interchangeable. The
    /// password only contributes through its SHA-256 digest.
    pub fn identity(&self) -> String {
        let digest = hex::encode(Sha256::digest(self.password.as_bytes()));
        let suffix = if self.admin { ADMIN_SUFFIX } else { "" };
        format!("{}{}#{}", self.username, suffix, &digest[..16])
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("admin", &self.admin)
            .finish()
    }
}
