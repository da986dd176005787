use anyhow::{Context, Result};
use async_trait::async_trait;
use ldapbake_common::BakeError;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Where and as whom to open a remote session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshTarget {
    pub host: String,
    pub user: String,
    pub key_file: PathBuf,
}

impl SshTarget {
    pub fn new(host: &str, user: &str, key_file: &Path) -> Self {
        // Strip CIDR suffix if present (e.g. "1.2.3.4/32" -> "1.2.3.4")
        let host = host.split('/').next().unwrap_or(host).trim().to_string();
        Self {
            host,
            user: user.to_string(),
            key_file: key_file.to_path_buf(),
        }
    }

    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// An open session able to run privileged commands on one host.
#[async_trait]
pub trait RemoteSession: Send {
    /// Run `command` as root and report how it exited. Never fails on a
    /// non-zero exit; only on transport errors.
    async fn exec_privileged(&mut self, command: &str) -> Result<CommandOutput>;

    /// End the session. Calling it twice is a no-op.
    async fn close(&mut self) -> Result<()>;

    /// Run `command` as root; a non-zero exit is a `CommandFailed` error.
    async fn sudo(&mut self, command: &str) -> Result<CommandOutput> {
        info!("▶️  [remote] sudo: {}", command);
        let out = self.exec_privileged(command).await?;
        if out.success() {
            Ok(out)
        } else {
            Err(BakeError::CommandFailed {
                command: command.to_string(),
                exit_code: out.exit_code,
                stderr: tail_str(&out.stderr, 2000),
            }
            .into())
        }
    }
}

/// Opens sessions. One call is one connection attempt.
#[async_trait]
pub trait SessionConnector: Send + Sync {
    async fn try_connect(&self, target: &SshTarget) -> Result<Box<dyn RemoteSession>>;
}

/// Try up to `attempts` times, sleeping `delay` between failed attempts.
pub async fn connect_with_retries(
    connector: &dyn SessionConnector,
    target: &SshTarget,
    attempts: u32,
    delay: Duration,
) -> Result<Box<dyn RemoteSession>> {
    let mut last_error = String::from("no connection attempt made");
    for attempt in 1..=attempts {
        match connector.try_connect(target).await {
            Ok(session) => {
                info!(
                    "✅ [remote] Connected to {} (attempt {}/{})",
                    target.destination(),
                    attempt,
                    attempts
                );
                return Ok(session);
            }
            Err(e) => {
                warn!(
                    "⏳ [remote] Connection to {} failed (attempt {}/{}): {}",
                    target.destination(),
                    attempt,
                    attempts,
                    e
                );
                last_error = e.to_string();
                if attempt < attempts {
                    sleep(delay).await;
                }
            }
        }
    }
    Err(BakeError::ConnectionFailed {
        target: target.destination(),
        attempts,
        last_error,
    }
    .into())
}

/// Safe single-quote escape for sh: wrap with '...' and escape internal quotes.
pub fn sh_escape_single(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\"'\"'"))
}

fn tail_str(s: &str, max: usize) -> String {
    let count = s.chars().count();
    if count <= max {
        return s.trim_end().to_string();
    }
    s.chars().skip(count - max).collect::<String>().trim_end().to_string()
}

// --- OpenSSH ---

/// Connector shelling out to the system `ssh`, sharing one control-master
/// connection for every command of the session.
pub struct OpenSshConnector {
    connect_timeout_secs: u64,
}

impl OpenSshConnector {
    pub fn new(connect_timeout_secs: u64) -> Self {
        Self {
            connect_timeout_secs,
        }
    }
}

impl Default for OpenSshConnector {
    fn default() -> Self {
        Self::new(10)
    }
}

fn base_args(target: &SshTarget, control_path: &Path) -> Vec<String> {
    vec![
        "-i".to_string(),
        target.key_file.display().to_string(),
        "-o".to_string(),
        "StrictHostKeyChecking=no".to_string(),
        "-o".to_string(),
        "UserKnownHostsFile=/dev/null".to_string(),
        "-o".to_string(),
        "BatchMode=yes".to_string(),
        "-o".to_string(),
        format!("ControlPath={}", control_path.display()),
    ]
}

#[async_trait]
impl SessionConnector for OpenSshConnector {
    async fn try_connect(&self, target: &SshTarget) -> Result<Box<dyn RemoteSession>> {
        let id8: String = uuid::Uuid::new_v4().simple().to_string().chars().take(8).collect();
        let control_path = std::env::temp_dir().join(format!("ldapbake-{}.sock", id8));

        let output = Command::new("ssh")
            .args(base_args(target, &control_path))
            .arg("-o")
            .arg(format!("ConnectTimeout={}", self.connect_timeout_secs))
            .arg("-o")
            .arg("ControlMaster=yes")
            .arg("-o")
            .arg("ControlPersist=yes")
            .arg("-f")
            .arg("-N")
            .arg(target.destination())
            .stdin(Stdio::null())
            .output()
            .await
            .context("failed to spawn ssh")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow::anyhow!(
                "ssh exit={}: {}",
                output.status,
                tail_str(&stderr, 500)
            ));
        }

        Ok(Box::new(OpenSshSession {
            target: target.clone(),
            control_path,
            closed: false,
        }))
    }
}

pub struct OpenSshSession {
    target: SshTarget,
    control_path: PathBuf,
    closed: bool,
}

impl OpenSshSession {
    fn exit_args(&self) -> Vec<String> {
        let mut args = base_args(&self.target, &self.control_path);
        args.push("-O".to_string());
        args.push("exit".to_string());
        args.push(self.target.destination());
        args
    }
}

#[async_trait]
impl RemoteSession for OpenSshSession {
    async fn exec_privileged(&mut self, command: &str) -> Result<CommandOutput> {
        if self.closed {
            return Err(anyhow::anyhow!("session to {} is closed", self.target.destination()));
        }
        let remote = format!("sudo -n sh -c {}", sh_escape_single(command));
        let output = Command::new("ssh")
            .args(base_args(&self.target, &self.control_path))
            .arg(self.target.destination())
            .arg(&remote)
            .stdin(Stdio::null())
            .output()
            .await
            .context("failed to spawn ssh")?;

        let out = CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };
        debug!(
            "[remote] exit={:?} stdout_tail={}",
            out.exit_code,
            tail_str(&out.stdout, 400)
        );
        Ok(out)
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let output = Command::new("ssh")
            .args(self.exit_args())
            .stdin(Stdio::null())
            .output()
            .await
            .context("failed to spawn ssh -O exit")?;
        let _ = std::fs::remove_file(&self.control_path);
        if !output.status.success() {
            warn!(
                "⚠️ [remote] Control master for {} did not exit cleanly: {}",
                self.target.destination(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        } else {
            info!("🔌 [remote] Session to {} closed", self.target.destination());
        }
        Ok(())
    }
}

impl Drop for OpenSshSession {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        // Last resort when a caller bailed out without close(); blocking is fine here.
        let _ = std::process::Command::new("ssh")
            .args(self.exit_args())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        let _ = std::fs::remove_file(&self.control_path);
    }
}
