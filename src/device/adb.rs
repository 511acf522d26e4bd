//! `adb` implementation of the device-control channel.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{AgentError, DeviceAgent};
use crate::config::AdbConfig;

/// Output of one finished `adb` invocation.
#[derive(Debug, Clone)]
struct CommandOutput {
    success: bool,
    status: i32,
    stdout: String,
    stderr: String,
}

impl CommandOutput {
    fn combined(&self) -> String {
        format!("{}{}", self.stdout, self.stderr).trim().to_string()
    }
}

/// Drives the `adb` binary, one process per operation.
#[derive(Debug, Clone)]
pub struct AdbAgent {
    binary: String,
    timeout_secs: u64,
}

impl AdbAgent {
    pub fn new(config: &AdbConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            timeout_secs: config.command_timeout_seconds,
        }
    }

    /// Verify the binary is installed. Returns its version banner.
    pub async fn check_installed(&self) -> Result<String, AgentError> {
        let out = self.run(&["version"]).await?;
        if !out.success {
            return Err(AgentError::Failed {
                status: out.status,
                output: out.combined(),
            });
        }
        Ok(out.stdout.lines().next().unwrap_or_default().trim().to_string())
    }

    async fn run(&self, args: &[&str]) -> Result<CommandOutput, AgentError> {
        debug!(binary = %self.binary, ?args, "adb");

        let mut command = Command::new(&self.binary);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = command.spawn().map_err(|source| AgentError::Spawn {
            binary: self.binary.clone(),
            source,
        })?;

        let output = tokio::time::timeout(Duration::from_secs(self.timeout_secs), child.wait_with_output())
            .await
            .map_err(|_| AgentError::Timeout(self.timeout_secs))?
            .map_err(|source| AgentError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;

        Ok(CommandOutput {
            success: output.status.success(),
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    /// `adb -s <address> shell <command>`; the remote shell parses `command`.
    async fn shell(&self, address: &str, command: &str) -> Result<CommandOutput, AgentError> {
        self.run(&["-s", address, "shell", command]).await
    }
}

#[async_trait]
impl DeviceAgent for AdbAgent {
    async fn connect(&self, address: &str) -> bool {
        match self.run(&["connect", address]).await {
            Ok(out) if is_connect_success(&out.combined()) => {
                debug!(address, "adb connected");
                true
            }
            Ok(out) => {
                warn!(address, output = %out.combined(), "adb connect failed");
                false
            }
            Err(e) => {
                warn!(address, error = %e, "adb connect failed");
                false
            }
        }
    }

    async fn is_process_running(&self, address: &str, package: &str) -> bool {
        let command = format!("pidof {}", shell_quote(package));
        match self.shell(address, &command).await {
            Ok(out) => out.success && parse_pidof(&out.stdout),
            Err(e) => {
                warn!(address, package, error = %e, "Process query failed");
                false
            }
        }
    }

    async fn force_stop(&self, address: &str, package: &str) -> bool {
        let command = format!("am force-stop {}", shell_quote(package));
        match self.shell(address, &command).await {
            Ok(out) if out.success => true,
            Ok(out) => {
                warn!(address, package, status = out.status, output = %out.combined(), "force-stop failed");
                false
            }
            Err(e) => {
                warn!(address, package, error = %e, "force-stop failed");
                false
            }
        }
    }

    async fn launch(&self, address: &str, package: &str, deep_link: &str) -> bool {
        let command = launch_command(package, deep_link);
        match self.shell(address, &command).await {
            Ok(out) if out.success && !out.combined().contains("Error:") => {
                info!(address, package, "Launch command accepted");
                true
            }
            Ok(out) => {
                warn!(address, package, status = out.status, output = %out.combined(), "Launch failed");
                false
            }
            Err(e) => {
                warn!(address, package, error = %e, "Launch failed");
                false
            }
        }
    }
}

/// `adb connect` exits 0 even on failure; the text is authoritative.
fn is_connect_success(output: &str) -> bool {
    let lower = output.to_ascii_lowercase();
    (lower.contains("connected to") || lower.contains("already connected"))
        && !lower.contains("failed to connect")
        && !lower.contains("unable to connect")
}

/// `pidof` prints one or more numeric pids when the process exists.
fn parse_pidof(stdout: &str) -> bool {
    let mut pids = stdout.split_whitespace().peekable();
    pids.peek().is_some() && pids.all(|p| p.chars().all(|c| c.is_ascii_digit()))
}

/// Single-quote a value for the device shell.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Remote shell command that opens `deep_link` in `package`.
pub fn launch_command(package: &str, deep_link: &str) -> String {
    format!(
        "am start -a android.intent.action.VIEW -d {} {}",
        shell_quote(deep_link),
        shell_quote(package)
    )
}
