// Shared fixtures for the orchestrator integration tests.
// Provisioning always goes through the in-memory MockProvider.
#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use ldapbake_orchestrator::remote::{CommandOutput, RemoteSession, SessionConnector, SshTarget};
use ldapbake_orchestrator::BakeConfig;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteEvent {
    ConnectAttempt(String),
    Command(String),
    Close,
}

#[derive(Default)]
struct Behaviour {
    refuse_connections: bool,
    refuse_first: u32,
    fail_command_containing: Option<String>,
}

/// Connector whose sessions record every command instead of running it.
#[derive(Clone, Default)]
pub struct RecordingConnector {
    events: Arc<Mutex<Vec<RemoteEvent>>>,
    behaviour: Arc<Mutex<Behaviour>>,
}

impl RecordingConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unreachable() -> Self {
        let c = Self::default();
        c.behaviour.lock().unwrap().refuse_connections = true;
        c
    }

    pub fn refusing_first(n: u32) -> Self {
        let c = Self::default();
        c.behaviour.lock().unwrap().refuse_first = n;
        c
    }

    pub fn failing_command(needle: &str) -> Self {
        let c = Self::default();
        c.behaviour.lock().unwrap().fail_command_containing = Some(needle.to_string());
        c
    }

    pub fn events(&self) -> Vec<RemoteEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                RemoteEvent::Command(c) => Some(c),
                _ => None,
            })
            .collect()
    }

    pub fn connect_attempts(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, RemoteEvent::ConnectAttempt(_)))
            .count()
    }

    pub fn closes(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, RemoteEvent::Close))
            .count()
    }
}

struct RecordingSession {
    events: Arc<Mutex<Vec<RemoteEvent>>>,
    fail_command_containing: Option<String>,
}

#[async_trait]
impl RemoteSession for RecordingSession {
    async fn exec_privileged(&mut self, command: &str) -> Result<CommandOutput> {
        self.events
            .lock()
            .unwrap()
            .push(RemoteEvent::Command(command.to_string()));
        let failed = self
            .fail_command_containing
            .as_deref()
            .map(|n| command.contains(n))
            .unwrap_or(false);
        Ok(CommandOutput {
            exit_code: Some(if failed { 100 } else { 0 }),
            stdout: String::new(),
            stderr: if failed {
                "E: simulated failure".to_string()
            } else {
                String::new()
            },
        })
    }

    async fn close(&mut self) -> Result<()> {
        self.events.lock().unwrap().push(RemoteEvent::Close);
        Ok(())
    }
}

#[async_trait]
impl SessionConnector for RecordingConnector {
    async fn try_connect(&self, target: &SshTarget) -> Result<Box<dyn RemoteSession>> {
        let attempt = {
            let mut events = self.events.lock().unwrap();
            events.push(RemoteEvent::ConnectAttempt(target.destination()));
            events
                .iter()
                .filter(|e| matches!(e, RemoteEvent::ConnectAttempt(_)))
                .count() as u32
        };
        let (refuse, fail_cmd) = {
            let b = self.behaviour.lock().unwrap();
            (
                b.refuse_connections || attempt <= b.refuse_first,
                b.fail_command_containing.clone(),
            )
        };
        if refuse {
            return Err(anyhow::anyhow!("connection refused"));
        }
        Ok(Box::new(RecordingSession {
            events: self.events.clone(),
            fail_command_containing: fail_cmd,
        }))
    }
}

pub fn test_config() -> BakeConfig {
    let mut cfg = BakeConfig::default();
    cfg.provider = "mock".to_string();
    cfg.key_file = PathBuf::from("/tmp/test-key.pem");
    cfg
}
