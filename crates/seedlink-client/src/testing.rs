//! In-memory fake replica set for unit tests.
//!
//! Each address gets a `Script` describing how it answers the `ismaster`
//! probe. Other commands are answered from a per-command reply table
//! (default `{ok: 1}`). Every open, close, and request is recorded.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use seedlink_core::{CommandRequest, Document, ServerAddress, WriteConcern};
use serde_json::{Value, json};

use crate::connection::{Connection, ConnectionFactory};
use crate::error::TransportError;

#[derive(Clone, Debug)]
pub(crate) enum Script {
    /// Answer the probe with `reply` after `delay`.
    Reply { reply: Document, delay: Duration },
    /// Refuse the connection.
    Refuse,
    /// Accept the connection, never answer.
    Hang,
}

impl Script {
    pub(crate) fn reply(value: Value) -> Self {
        Script::Reply {
            reply: Document::from_value(value).unwrap_or_default(),
            delay: Duration::ZERO,
        }
    }

    pub(crate) fn primary(hosts: &[&str]) -> Self {
        Self::member(true, hosts)
    }

    pub(crate) fn secondary(hosts: &[&str]) -> Self {
        Self::member(false, hosts)
    }

    fn member(is_master: bool, hosts: &[&str]) -> Self {
        let mut reply = json!({"ok": 1, "ismaster": is_master});
        if !hosts.is_empty() {
            let hosts: Vec<String> = hosts.iter().map(|h| format!("{h}:27017")).collect();
            reply["hosts"] = json!(hosts);
        }
        Self::reply(reply)
    }

    pub(crate) fn delayed(self, ms: u64) -> Self {
        match self {
            Script::Reply { reply, .. } => Script::Reply {
                reply,
                delay: Duration::from_millis(ms),
            },
            other => other,
        }
    }
}

#[derive(Default)]
struct Ledger {
    next_id: u64,
    open: BTreeMap<u64, ServerAddress>,
    opens: HashMap<ServerAddress, usize>,
    requests: Vec<(ServerAddress, CommandRequest)>,
}

#[derive(Default)]
struct Shared {
    scripts: Mutex<HashMap<ServerAddress, Script>>,
    command_replies: Mutex<HashMap<String, Document>>,
    ledger: Mutex<Ledger>,
    fail_commands: AtomicBool,
    close_delay_ms: AtomicU64,
}

#[derive(Default)]
pub(crate) struct FakeCluster {
    shared: Arc<Shared>,
}

impl FakeCluster {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn script(&self, address: &ServerAddress, script: Script) {
        self.shared
            .scripts
            .lock()
            .unwrap()
            .insert(address.clone(), script);
    }

    /// Reply for a non-probe command, keyed by command name.
    pub(crate) fn on_command(&self, command: &str, reply: Value) {
        self.shared.command_replies.lock().unwrap().insert(
            command.to_string(),
            Document::from_value(reply).unwrap_or_default(),
        );
    }

    /// Make every non-probe command fail at the transport level.
    pub(crate) fn fail_commands(&self, fail: bool) {
        self.shared.fail_commands.store(fail, Ordering::Relaxed);
    }

    /// Make every `close` take `delay` before it completes.
    pub(crate) fn slow_close(&self, delay: Duration) {
        self.shared
            .close_delay_ms
            .store(delay.as_millis() as u64, Ordering::Relaxed);
    }

    /// Addresses of connections opened and not yet closed, in open order.
    pub(crate) fn open_connections(&self) -> Vec<ServerAddress> {
        self.shared
            .ledger
            .lock()
            .unwrap()
            .open
            .values()
            .cloned()
            .collect()
    }

    /// Number of connections ever opened to `address`.
    pub(crate) fn open_count(&self, address: &ServerAddress) -> usize {
        self.shared
            .ledger
            .lock()
            .unwrap()
            .opens
            .get(address)
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn requests(&self) -> Vec<(ServerAddress, CommandRequest)> {
        self.shared.ledger.lock().unwrap().requests.clone()
    }

    /// Requests other than the `ismaster` probe.
    pub(crate) fn commands(&self) -> Vec<CommandRequest> {
        self.requests()
            .into_iter()
            .map(|(_, req)| req)
            .filter(|req| req.command_name() != Some("ismaster"))
            .collect()
    }
}

/// Poll `check` until it holds, giving up after one second.
pub(crate) async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    let give_up = tokio::time::Instant::now() + Duration::from_secs(1);
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= give_up {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[async_trait]
impl ConnectionFactory for FakeCluster {
    async fn open(&self, address: &ServerAddress) -> Result<Box<dyn Connection>, TransportError> {
        let script = self
            .shared
            .scripts
            .lock()
            .unwrap()
            .get(address)
            .cloned()
            .unwrap_or(Script::Refuse);

        if matches!(script, Script::Refuse) {
            return Err(TransportError::Io {
                address: address.clone(),
                message: "connection refused".to_string(),
            });
        }

        let id = {
            let mut ledger = self.shared.ledger.lock().unwrap();
            ledger.next_id += 1;
            let id = ledger.next_id;
            ledger.open.insert(id, address.clone());
            *ledger.opens.entry(address.clone()).or_insert(0) += 1;
            id
        };

        Ok(Box::new(FakeConnection {
            id,
            address: address.clone(),
            script,
            shared: Arc::clone(&self.shared),
            last_command: None,
        }))
    }
}

#[derive(Debug)]
struct FakeConnection {
    id: u64,
    address: ServerAddress,
    script: Script,
    shared: Arc<Shared>,
    last_command: Option<String>,
}

impl std::fmt::Debug for Shared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shared").finish_non_exhaustive()
    }
}

#[async_trait]
impl Connection for FakeConnection {
    fn address(&self) -> &ServerAddress {
        &self.address
    }

    async fn send(
        &mut self,
        request: &CommandRequest,
        _write_concern: &WriteConcern,
    ) -> Result<(), TransportError> {
        self.last_command = request.command_name().map(str::to_string);
        self.shared
            .ledger
            .lock()
            .unwrap()
            .requests
            .push((self.address.clone(), request.clone()));
        Ok(())
    }

    async fn receive(&mut self) -> Result<Vec<Document>, TransportError> {
        let command = self.last_command.take().unwrap_or_default();
        if command == "ismaster" {
            return match &self.script {
                Script::Reply { reply, delay } => {
                    tokio::time::sleep(*delay).await;
                    Ok(vec![reply.clone()])
                }
                Script::Hang => std::future::pending().await,
                Script::Refuse => Err(TransportError::Closed(self.address.clone())),
            };
        }

        if self.shared.fail_commands.load(Ordering::Relaxed) {
            return Err(TransportError::Io {
                address: self.address.clone(),
                message: "connection reset".to_string(),
            });
        }
        let reply = self
            .shared
            .command_replies
            .lock()
            .unwrap()
            .get(&command)
            .cloned()
            .unwrap_or_else(|| Document::new().with("ok", 1));
        Ok(vec![reply])
    }

    async fn close(&mut self) {
        let delay = self.shared.close_delay_ms.load(Ordering::Relaxed);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.shared.ledger.lock().unwrap().open.remove(&self.id);
    }
}
