//! Shared in-memory replica set for integration tests.
//!
//! Each member is scripted with how it answers the `ismaster` probe. The
//! cluster counts opens, closes and probes per address so tests can assert
//! which connections survived discovery.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use async_trait::async_trait;
use seedlink_client::{Connection, ConnectionFactory, TransportError};
use seedlink_core::{CommandRequest, Document, ServerAddress, WriteConcern};
use serde_json::{Value, json};

static TRACING_INIT: Once = Once::new();

/// Install a test subscriber controlled by `RUST_LOG`. First call wins.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Poll `check` until it holds, giving up after one second.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
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

pub fn addr(host: &str) -> ServerAddress {
    ServerAddress::new(host, 27017)
}

#[derive(Clone, Debug)]
pub enum Member {
    /// Answer the probe after `delay`.
    Answer { reply: Value, delay: Duration },
    /// Accept the connection and never answer.
    Silent,
    /// Refuse the connection.
    Down,
}

impl Member {
    pub fn primary(hosts: &[&str]) -> Self {
        Self::answer(true, hosts)
    }

    pub fn secondary(hosts: &[&str]) -> Self {
        Self::answer(false, hosts)
    }

    fn answer(is_master: bool, hosts: &[&str]) -> Self {
        let mut reply = json!({"ok": 1, "ismaster": is_master});
        if !hosts.is_empty() {
            let hosts: Vec<String> = hosts.iter().map(|h| addr(h).to_string()).collect();
            reply["hosts"] = json!(hosts);
        }
        Member::Answer {
            reply,
            delay: Duration::ZERO,
        }
    }

    pub fn after(self, delay: Duration) -> Self {
        match self {
            Member::Answer { reply, .. } => Member::Answer { reply, delay },
            other => other,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Counts {
    pub opened: usize,
    pub closed: usize,
    pub probes: usize,
}

impl Counts {
    pub fn live(&self) -> usize {
        self.opened - self.closed
    }
}

#[derive(Debug, Default)]
struct State {
    members: HashMap<ServerAddress, Member>,
    counts: HashMap<ServerAddress, Counts>,
    commands: Vec<(ServerAddress, CommandRequest)>,
}

#[derive(Debug, Default)]
pub struct ReplicaSet {
    state: Arc<Mutex<State>>,
}

impl ReplicaSet {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn member(&self, host: &str, member: Member) -> &Self {
        self.state.lock().unwrap().members.insert(addr(host), member);
        self
    }

    pub fn counts(&self, host: &str) -> Counts {
        self.state
            .lock()
            .unwrap()
            .counts
            .get(&addr(host))
            .copied()
            .unwrap_or_default()
    }

    /// Non-probe commands, with the address they were sent to.
    pub fn commands(&self) -> Vec<(ServerAddress, CommandRequest)> {
        self.state.lock().unwrap().commands.clone()
    }
}

#[async_trait]
impl ConnectionFactory for ReplicaSet {
    async fn open(&self, address: &ServerAddress) -> Result<Box<dyn Connection>, TransportError> {
        let member = {
            let mut state = self.state.lock().unwrap();
            let member = state.members.get(address).cloned().unwrap_or(Member::Down);
            if !matches!(member, Member::Down) {
                state.counts.entry(address.clone()).or_default().opened += 1;
            }
            member
        };
        if matches!(member, Member::Down) {
            return Err(TransportError::Io {
                address: address.clone(),
                message: "connection refused".to_string(),
            });
        }
        Ok(Box::new(MemberConnection {
            address: address.clone(),
            member,
            state: Arc::clone(&self.state),
            pending: None,
            closed: false,
        }))
    }
}

#[derive(Debug)]
struct MemberConnection {
    address: ServerAddress,
    member: Member,
    state: Arc<Mutex<State>>,
    pending: Option<CommandRequest>,
    closed: bool,
}

#[async_trait]
impl Connection for MemberConnection {
    fn address(&self) -> &ServerAddress {
        &self.address
    }

    async fn send(
        &mut self,
        request: &CommandRequest,
        _write_concern: &WriteConcern,
    ) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed(self.address.clone()));
        }
        let mut state = self.state.lock().unwrap();
        if request.command_name() == Some("ismaster") {
            state.counts.entry(self.address.clone()).or_default().probes += 1;
        } else {
            state.commands.push((self.address.clone(), request.clone()));
        }
        self.pending = Some(request.clone());
        Ok(())
    }

    async fn receive(&mut self) -> Result<Vec<Document>, TransportError> {
        let request = self
            .pending
            .take()
            .ok_or_else(|| TransportError::EmptyReply(self.address.clone()))?;

        if request.command_name() != Some("ismaster") {
            return Ok(vec![Document::new().with("ok", 1)]);
        }
        match &self.member {
            Member::Answer { reply, delay } => {
                tokio::time::sleep(*delay).await;
                Ok(Document::from_value(reply.clone()).into_iter().collect())
            }
            Member::Silent => std::future::pending().await,
            Member::Down => Err(TransportError::Closed(self.address.clone())),
        }
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.state
                .lock()
                .unwrap()
                .counts
                .entry(self.address.clone())
                .or_default()
                .closed += 1;
        }
    }
}
