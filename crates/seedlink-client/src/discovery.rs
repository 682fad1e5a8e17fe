//! Primary discovery.
//!
//! Fans out one `ismaster` probe per candidate address, consumes replies in
//! arrival order, and returns the first candidate that reports itself as the
//! elected primary. Replies from other members may name further candidates
//! in their `hosts` array; each new address is probed exactly once.
//!
//! # Architecture
//!
//! ```text
//! discover(seeds, deadline)
//!   → ProbeSet::spawn(addr) for each seed            (one task per candidate)
//!   → loop: timeout_at(deadline, join_next())
//!       → Primary       → winner, stop
//!       → NotPrimary    → spawn probes for unseen `hosts`
//!       → Rejected/Failed → discard
//!       → set empty or deadline → NoPrimary
//!   → ProbeSet::finish()           (cancel now, drain in a background task)
//! ```
//!
//! A probe that learns it is not the primary closes its own connection
//! before reporting, so only the winner's connection survives. Outstanding
//! probes are cancelled before `discover` returns; they close whatever
//! connection they hold and exit without holding up the caller.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use seedlink_core::{CommandRequest, Document, ServerAddress, WriteConcern};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::connection::{Connection, ConnectionFactory, run_command};
use crate::error::{ClientError, ClientResult, TransportError};

/// Database the primary probe runs against.
pub const PROBE_DATABASE: &str = "admin";

/// How long the background drain waits for cancelled probes to close their
/// connections. Probes still closing after that are detached, not aborted.
/// `discover` never waits for it.
pub const DEFAULT_CLEANUP_GRACE: Duration = Duration::from_millis(250);

/// The `{"ismaster": 1}` probe: slave-acceptable, skip 0, limit 1, no projection.
pub fn ismaster_request() -> CommandRequest {
    CommandRequest::command(PROBE_DATABASE, Document::new().with("ismaster", 1)).with_slave_ok()
}

/// Typed view of an `ismaster` reply.
#[derive(Clone, Debug, PartialEq)]
pub struct IsMasterReply {
    pub ok: bool,
    pub is_master: bool,
    /// Replica-set members reported by the server; `None` when the reply has
    /// no `hosts` field (not a replica set).
    pub hosts: Option<Vec<ServerAddress>>,
    pub raw: Document,
}

impl IsMasterReply {
    /// Extract the fields discovery relies on. Unparsable `hosts` entries are
    /// logged and skipped.
    pub fn from_document(raw: Document) -> Self {
        let hosts = raw.get_str_array("hosts").map(|entries| {
            entries
                .into_iter()
                .filter_map(|entry| match ServerAddress::parse(entry) {
                    Ok(address) => Some(address),
                    Err(e) => {
                        tracing::warn!(entry, error = %e, "ignoring unparsable host in ismaster reply");
                        None
                    }
                })
                .collect()
        });

        Self {
            ok: raw.get_bool("ok", false),
            is_master: raw.get_bool("ismaster", false),
            hosts,
            raw,
        }
    }
}

/// What one probe learned about its candidate.
#[derive(Debug)]
pub enum ProbeOutcome {
    /// `ok` and `ismaster`. The probe keeps its connection open.
    Primary {
        reply: IsMasterReply,
        connection: Box<dyn Connection>,
    },
    /// `ok` but not the primary; the connection has been closed.
    NotPrimary(IsMasterReply),
    /// Reply without `ok`; discarded.
    Rejected(IsMasterReply),
    /// Transport failure; discarded.
    Failed(TransportError),
    /// The search ended before this probe finished.
    Cancelled,
}

/// Outcome for one candidate address.
#[derive(Debug)]
pub struct ProbeResult {
    pub address: ServerAddress,
    pub outcome: ProbeOutcome,
}

/// A successful discovery.
#[derive(Debug)]
pub struct DiscoveryOutcome {
    pub primary: ServerAddress,
    /// The winning probe's open connection, used to seed the new pool.
    pub connection: Box<dyn Connection>,
    pub reply: IsMasterReply,
    /// Every address probed during this discovery, in dispatch order.
    pub probed: Vec<ServerAddress>,
}

pub struct PrimaryDiscovery {
    factory: Arc<dyn ConnectionFactory>,
    cleanup_grace: Duration,
}

impl PrimaryDiscovery {
    pub fn new(factory: Arc<dyn ConnectionFactory>) -> Self {
        Self {
            factory,
            cleanup_grace: DEFAULT_CLEANUP_GRACE,
        }
    }

    pub fn with_cleanup_grace(self, cleanup_grace: Duration) -> Self {
        Self {
            cleanup_grace,
            ..self
        }
    }

    /// Find the primary among `seeds` (and any members they report) before
    /// `deadline`.
    pub async fn discover(
        &self,
        seeds: &[ServerAddress],
        deadline: Instant,
    ) -> ClientResult<DiscoveryOutcome> {
        let mut probes = ProbeSet::new(Arc::clone(&self.factory));
        let mut queried: HashSet<ServerAddress> = HashSet::new();
        let mut probed: Vec<ServerAddress> = Vec::new();

        for address in seeds {
            if queried.insert(address.clone()) {
                probes.spawn(address.clone());
                probed.push(address.clone());
            }
        }
        tracing::debug!(candidates = probed.len(), "primary discovery started");

        let winner = loop {
            if probes.is_empty() {
                tracing::debug!(probed = probed.len(), "all probes answered without a primary");
                break None;
            }

            let next = match tokio::time::timeout_at(deadline, probes.join_next()).await {
                Ok(Some(next)) => next,
                Ok(None) => break None,
                Err(_) => {
                    tracing::debug!(pending = probes.len(), "discovery deadline elapsed");
                    break None;
                }
            };

            let ProbeResult { address, outcome } = match next {
                Ok(result) => result,
                Err(e) => {
                    tracing::warn!(error = %e, "probe task did not complete");
                    continue;
                }
            };

            match outcome {
                ProbeOutcome::Primary { reply, connection } => {
                    break Some((address, connection, reply));
                }
                ProbeOutcome::NotPrimary(reply) => {
                    tracing::debug!(address = %address, "candidate is not primary");
                    for host in reply.hosts.iter().flatten() {
                        if queried.insert(host.clone()) {
                            tracing::debug!(address = %host, reported_by = %address, "probing newly reported member");
                            probes.spawn(host.clone());
                            probed.push(host.clone());
                        }
                    }
                }
                ProbeOutcome::Rejected(reply) => {
                    tracing::debug!(
                        address = %address,
                        errmsg = reply.raw.get_str("errmsg").unwrap_or(""),
                        "candidate replied without ok"
                    );
                }
                ProbeOutcome::Failed(e) => {
                    tracing::debug!(address = %address, error = %e, "probe failed");
                }
                ProbeOutcome::Cancelled => {}
            }
        };

        probes.finish(self.cleanup_grace);

        match winner {
            Some((primary, connection, reply)) => {
                tracing::info!(primary = %primary, probed = probed.len(), "primary discovered");
                Ok(DiscoveryOutcome {
                    primary,
                    connection,
                    reply,
                    probed,
                })
            }
            None => {
                tracing::warn!(probed = probed.len(), "no primary found");
                Err(ClientError::NoPrimary {
                    seeds: seeds.to_vec(),
                    probed: probed.len(),
                })
            }
        }
    }
}

impl std::fmt::Debug for PrimaryDiscovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrimaryDiscovery")
            .field("cleanup_grace", &self.cleanup_grace)
            .finish_non_exhaustive()
    }
}

// ── ProbeSet ─────────────────────────────────────────────────────────

/// In-flight probes for one discovery: many producers, one consumer.
///
/// Every probe shares one cancellation token. Dropping the set without
/// `finish` (e.g. the `connect` future was dropped) still cancels the
/// probes and lets them close their connections in the background.
struct ProbeSet {
    tasks: JoinSet<ProbeResult>,
    factory: Arc<dyn ConnectionFactory>,
    token: CancellationToken,
}

impl ProbeSet {
    fn new(factory: Arc<dyn ConnectionFactory>) -> Self {
        Self {
            tasks: JoinSet::new(),
            factory,
            token: CancellationToken::new(),
        }
    }

    fn spawn(&mut self, address: ServerAddress) {
        let factory = Arc::clone(&self.factory);
        let token = self.token.clone();
        self.tasks.spawn(probe(factory, address, token));
    }

    fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    fn len(&self) -> usize {
        self.tasks.len()
    }

    async fn join_next(&mut self) -> Option<Result<ProbeResult, tokio::task::JoinError>> {
        self.tasks.join_next().await
    }

    /// Cancel outstanding probes and hand the set to a background drain.
    fn finish(self, grace: Duration) {
        self.token.cancel();
        if self.tasks.is_empty() {
            return;
        }
        tokio::spawn(self.drain(grace));
    }

    /// Wait (up to `grace`) for cancelled probes to close their connections.
    /// Any extra primary connection is closed here.
    async fn drain(mut self, grace: Duration) {

        let tasks = &mut self.tasks;
        let drained = tokio::time::timeout(grace, async {
            while let Some(next) = tasks.join_next().await {
                if let Ok(ProbeResult {
                    address,
                    outcome: ProbeOutcome::Primary { mut connection, .. },
                }) = next
                {
                    tracing::warn!(address = %address, "closing connection of a second primary");
                    connection.close().await;
                }
            }
        })
        .await;

        if drained.is_err() {
            tracing::warn!(
                remaining = self.tasks.len(),
                "probes still closing after cleanup grace, detaching"
            );
        }
    }
}

impl Drop for ProbeSet {
    fn drop(&mut self) {
        self.token.cancel();
        self.tasks.detach_all();
    }
}

/// Probe one candidate. Never returns an error: failures are reported as
/// outcomes. Only a primary's connection is handed back open.
async fn probe(
    factory: Arc<dyn ConnectionFactory>,
    address: ServerAddress,
    token: CancellationToken,
) -> ProbeResult {
    let opened = tokio::select! {
        biased;
        _ = token.cancelled() => None,
        opened = factory.open(&address) => Some(opened),
    };
    let mut connection = match opened {
        None => return ProbeResult::cancelled(address),
        Some(Ok(connection)) => connection,
        Some(Err(e)) => return ProbeResult::failed(address, e),
    };

    let request = ismaster_request();
    let write_concern = WriteConcern::default();
    let replied = tokio::select! {
        biased;
        _ = token.cancelled() => None,
        reply = run_command(connection.as_mut(), &request, &write_concern) => Some(reply),
    };

    let reply = match replied {
        None => {
            connection.close().await;
            return ProbeResult::cancelled(address);
        }
        Some(Err(e)) => {
            connection.close().await;
            return ProbeResult::failed(address, e);
        }
        Some(Ok(document)) => IsMasterReply::from_document(document),
    };

    let outcome = if reply.ok && reply.is_master {
        ProbeOutcome::Primary { reply, connection }
    } else {
        connection.close().await;
        if reply.ok {
            ProbeOutcome::NotPrimary(reply)
        } else {
            ProbeOutcome::Rejected(reply)
        }
    };

    ProbeResult { address, outcome }
}

impl ProbeResult {
    fn cancelled(address: ServerAddress) -> Self {
        Self {
            address,
            outcome: ProbeOutcome::Cancelled,
        }
    }

    fn failed(address: ServerAddress, error: TransportError) -> Self {
        Self {
            address,
            outcome: ProbeOutcome::Failed(error),
        }
    }
}
