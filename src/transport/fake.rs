use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use super::{ConnectTarget, DeviceConnector, DeviceTransport, Record, TransportError};

/// Scripted reply for one command.
#[derive(Debug, Clone)]
pub(crate) enum FakeReply {
    Records(Vec<Record>),
    Trap(String),
    /// The link drops mid-command.
    Drop,
    /// The device never answers.
    Hang,
}

#[derive(Debug, Default)]
struct FakeState {
    replies: HashMap<(String, String), FakeReply>,
    refused: HashSet<String>,
    connects: HashMap<String, usize>,
    closes: HashMap<String, usize>,
    calls: Vec<(String, String)>,
}

/// In-memory connector keyed by hostname.
///
/// Unscripted commands answer with no records.
#[derive(Debug, Clone, Default)]
pub(crate) struct FakeConnector {
    state: Arc<Mutex<FakeState>>,
}

pub(crate) fn record(pairs: &[(&str, &str)]) -> Record {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

impl FakeConnector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn reply(&self, host: &str, command: &str, reply: FakeReply) {
        self.state
            .lock()
            .unwrap()
            .replies
            .insert((host.to_string(), command.to_string()), reply);
    }

    pub(crate) fn records(&self, host: &str, command: &str, records: Vec<Record>) {
        self.reply(host, command, FakeReply::Records(records));
    }

    pub(crate) fn refuse(&self, host: &str) {
        self.state.lock().unwrap().refused.insert(host.to_string());
    }

    pub(crate) fn accept(&self, host: &str) {
        self.state.lock().unwrap().refused.remove(host);
    }

    pub(crate) fn connects(&self, host: &str) -> usize {
        *self.state.lock().unwrap().connects.get(host).unwrap_or(&0)
    }

    pub(crate) fn closes(&self, host: &str) -> usize {
        *self.state.lock().unwrap().closes.get(host).unwrap_or(&0)
    }

    pub(crate) fn calls(&self, host: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|(h, _)| h == host)
            .map(|(_, c)| c.clone())
            .collect()
    }
}

#[async_trait::async_trait]
impl DeviceConnector for FakeConnector {
    async fn connect(
        &self,
        target: &ConnectTarget,
    ) -> Result<Box<dyn DeviceTransport>, TransportError> {
        let mut state = self.state.lock().unwrap();
        if state.refused.contains(&target.hostname) {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            )));
        }
        *state.connects.entry(target.hostname.clone()).or_default() += 1;
        Ok(Box::new(FakeTransport {
            host: target.hostname.clone(),
            state: Arc::clone(&self.state),
            closed: false,
        }))
    }
}

struct FakeTransport {
    host: String,
    state: Arc<Mutex<FakeState>>,
    closed: bool,
}

#[async_trait::async_trait]
impl DeviceTransport for FakeTransport {
    async fn run(&mut self, command: &str, _args: &[&str]) -> Result<Vec<Record>, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let reply = {
            let mut state = self.state.lock().unwrap();
            state.calls.push((self.host.clone(), command.to_string()));
            state
                .replies
                .get(&(self.host.clone(), command.to_string()))
                .cloned()
        };
        match reply {
            None => Ok(Vec::new()),
            Some(FakeReply::Records(records)) => Ok(records),
            Some(FakeReply::Trap(message)) => Err(TransportError::Trap {
                command: command.to_string(),
                message,
            }),
            Some(FakeReply::Drop) => {
                self.closed = true;
                Err(TransportError::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "connection reset",
                )))
            }
            Some(FakeReply::Hang) => std::future::pending().await,
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        *self
            .state
            .lock()
            .unwrap()
            .closes
            .entry(self.host.clone())
            .or_default() += 1;
    }
}
