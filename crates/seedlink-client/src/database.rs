//! Database handles.
//!
//! A `Database` is a lightweight, cached handle owned by its `Server`. It
//! holds a weak back-reference so the server's handle cache does not keep
//! the server alive.

use std::sync::Weak;

use seedlink_core::{CommandRequest, Credentials, Document, WriteConcern};

use crate::connection::run_command;
use crate::error::{ClientError, ClientResult};
use crate::server::Server;

#[derive(Debug)]
pub struct Database {
    server: Weak<Server>,
    name: String,
    credentials: Option<Credentials>,
    write_concern: WriteConcern,
}

impl Database {
    pub(crate) fn new(
        server: Weak<Server>,
        name: &str,
        credentials: Option<Credentials>,
        write_concern: WriteConcern,
    ) -> Self {
        Self {
            server,
            name: name.to_string(),
            credentials,
            write_concern,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn write_concern(&self) -> &WriteConcern {
        &self.write_concern
    }

    /// Run `command` against this database on the primary.
    ///
    /// Connects the server if needed. A reply with `ok` false becomes
    /// `CommandFailed` carrying the server's `errmsg`. A transport failure
    /// discards the connection and, if its pool is still the server's
    /// current pool, disconnects the server so the next call rediscovers the
    /// primary.
    pub async fn run_command(&self, command: Document) -> ClientResult<Document> {
        let server = self
            .server
            .upgrade()
            .ok_or_else(|| ClientError::ServerDropped(self.name.clone()))?;
        let request = CommandRequest::command(&self.name, command);
        let command_name = request.command_name().unwrap_or_default().to_string();

        let pool = server.get_connection_pool().await?;
        let mut conn = pool.checkout().await?;

        let reply = match run_command(&mut *conn, &request, &self.write_concern).await {
            Ok(reply) => {
                pool.release(conn, true).await;
                reply
            }
            Err(e) => {
                pool.release(conn, false).await;
                tracing::warn!(
                    database = %self.name,
                    command = %command_name,
                    error = %e,
                    "command transport failure, disconnecting"
                );
                server.disconnect_pool(&pool).await;
                return Err(e.into());
            }
        };

        if !reply.get_bool("ok", false) {
            let message = reply
                .get_str("errmsg")
                .unwrap_or("unknown error")
                .to_string();
            tracing::debug!(database = %self.name, command = %command_name, %message, "command failed");
            return Err(ClientError::CommandFailed {
                command: command_name,
                message,
            });
        }
        Ok(reply)
    }
}
