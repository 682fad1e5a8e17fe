//! Connection collaborator contracts.
//!
//! The connection core does not speak the wire protocol itself. It drives
//! connections through these traits; the byte framing, document encoding and
//! socket handling live behind a `ConnectionFactory` implementation.
//!
//! ```text
//! PrimaryDiscovery ─┐
//!                   ├─→ ConnectionFactory::open(address) → Box<dyn Connection>
//! ConnectionPool  ──┘       send(request, write_concern) / receive() / close()
//! ```

use async_trait::async_trait;
use seedlink_core::{CommandRequest, Document, ServerAddress, WriteConcern};

use crate::error::TransportError;

/// A single open socket to one server.
#[async_trait]
pub trait Connection: Send + std::fmt::Debug {
    /// Address this connection was opened against.
    fn address(&self) -> &ServerAddress;

    /// Send one request.
    async fn send(
        &mut self,
        request: &CommandRequest,
        write_concern: &WriteConcern,
    ) -> Result<(), TransportError>;

    /// Receive the reply documents for the last request.
    async fn receive(&mut self) -> Result<Vec<Document>, TransportError>;

    /// Close the underlying transport. Must be safe to call more than once.
    async fn close(&mut self);
}

/// Opens fresh, unpooled connections.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn open(&self, address: &ServerAddress) -> Result<Box<dyn Connection>, TransportError>;
}

/// Send `request` and return the first reply document.
pub async fn run_command(
    connection: &mut dyn Connection,
    request: &CommandRequest,
    write_concern: &WriteConcern,
) -> Result<Document, TransportError> {
    connection.send(request, write_concern).await?;
    let replies = connection.receive().await?;
    replies
        .into_iter()
        .next()
        .ok_or_else(|| TransportError::EmptyReply(connection.address().clone()))
}
