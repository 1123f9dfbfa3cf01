//! Infrastructure implementation of the `RemoteExecutor` port.
//!
//! `SshCommandRunner` shells out to the system `ssh` client (through
//! `sshpass` when a password or key passphrase is needed) or, for loopback
//! and `local` hosts, to `sh -c`. The child is killed when the hard timeout
//! fires, regardless of output activity.

use std::io::Write as _;
use std::path::Path;
use std::process::Stdio;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{debug, warn};

use dockhand_common::{Host, StreamKind};

use crate::application::ports::{
    Credentials, ExecOptions, ExecOutput, OutputSink, RemoteExecutor, TRANSPORT_FAILURE_EXIT,
};
use crate::domain::host::runs_locally;

/// Exit status the OpenSSH client reserves for its own failures.
const SSH_TRANSPORT_EXIT: i32 = 255;

/// Production `RemoteExecutor`.
pub struct SshCommandRunner {
    ssh: String,
    sshpass: String,
}

impl Default for SshCommandRunner {
    fn default() -> Self {
        Self {
            ssh: "ssh".to_string(),
            sshpass: "sshpass".to_string(),
        }
    }
}

impl SshCommandRunner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn the command, drain its output and map the exit status.
    async fn run(
        &self,
        host: &Host,
        credentials: &Credentials,
        command: &str,
        options: &ExecOptions,
        sink: Option<&dyn OutputSink>,
    ) -> ExecOutput {
        let local = runs_locally(host);
        // Dropped at the end of this call on every path, deleting the key.
        let key_file = match credentials.private_key.as_deref() {
            Some(key) if !local => match write_key_file(key) {
                Ok(f) => Some(f),
                Err(e) => return ExecOutput::transport_failure(format!("{e:#}")),
            },
            _ => None,
        };

        let mut cmd = if local {
            let mut cmd = tokio::process::Command::new("sh");
            cmd.arg("-c").arg(command);
            cmd
        } else {
            let ssh_args = ssh_args(host, credentials, options, key_file.as_ref().map(|f| f.path()), command);
            if credentials.needs_password_helper() {
                let mut cmd = tokio::process::Command::new(&self.sshpass);
                cmd.arg("-e");
                let secret = if credentials.passphrase.is_some() && credentials.private_key.is_some() {
                    cmd.args(["-P", "passphrase"]);
                    credentials.passphrase.as_deref()
                } else {
                    credentials.password.as_deref().or(credentials.passphrase.as_deref())
                };
                cmd.env("SSHPASS", secret.unwrap_or_default());
                cmd.arg(&self.ssh).args(&ssh_args);
                cmd
            } else {
                let mut cmd = tokio::process::Command::new(&self.ssh);
                cmd.args(&ssh_args);
                cmd
            }
        };
        cmd.stdin(if options.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

        debug!(host_id = %host.id, local, "spawning command");
        let mut child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => {
                return ExecOutput::transport_failure(format!(
                    "failed to spawn command for {}: {e}",
                    host.id
                ));
            }
        };

        let stdin_task = match (child.stdin.take(), options.stdin.clone()) {
            (Some(mut stdin), Some(input)) => Some(tokio::spawn(async move {
                use tokio::io::AsyncWriteExt;
                let _ = stdin.write_all(input.as_bytes()).await;
            })),
            _ => None,
        };
        let stdout_handle = child.stdout.take();
        let stderr_handle = child.stderr.take();

        tokio::select! {
            result = async {
                let (status, stdout, stderr) = tokio::join!(
                    child.wait(),
                    drain(stdout_handle, StreamKind::Stdout, sink),
                    drain(stderr_handle, StreamKind::Stderr, sink),
                );
                if let Some(task) = stdin_task {
                    let _ = task.await;
                }
                (status, stdout, stderr)
            } => {
                let (status, stdout, stderr) = result;
                match status {
                    Ok(status) => finish(host, local, status.code(), stdout, stderr),
                    Err(e) => ExecOutput::transport_failure(format!("waiting for command: {e}")),
                }
            }
            () = tokio::time::sleep(options.kill_after) => {
                let _ = child.kill().await;
                warn!(host_id = %host.id, timeout_secs = options.kill_after.as_secs(), "command killed");
                ExecOutput::transport_failure(format!(
                    "command timed out after {}s",
                    options.kill_after.as_secs()
                ))
            }
        }
    }
}

#[async_trait]
impl RemoteExecutor for SshCommandRunner {
    async fn execute(
        &self,
        host: &Host,
        credentials: &Credentials,
        command: &str,
        options: &ExecOptions,
    ) -> ExecOutput {
        self.run(host, credentials, command, options, None).await
    }

    async fn execute_streaming(
        &self,
        host: &Host,
        credentials: &Credentials,
        command: &str,
        options: &ExecOptions,
        sink: &dyn OutputSink,
    ) -> ExecOutput {
        self.run(host, credentials, command, options, Some(sink)).await
    }
}

/// Map an exit status to a structured result. Non-zero exits are data;
/// signals and the SSH client's own failure status are transport failures.
fn finish(host: &Host, local: bool, code: Option<i32>, stdout: String, stderr: String) -> ExecOutput {
    match code {
        Some(SSH_TRANSPORT_EXIT) if !local => {
            let reason = stderr.trim().lines().last().unwrap_or("ssh failed").to_string();
            ExecOutput {
                exit_code: TRANSPORT_FAILURE_EXIT,
                stdout,
                stderr,
                error: Some(format!("ssh to {} failed: {reason}", host.id)),
            }
        }
        Some(code) => ExecOutput {
            exit_code: code,
            stdout,
            stderr,
            error: None,
        },
        None => ExecOutput {
            exit_code: TRANSPORT_FAILURE_EXIT,
            stdout,
            stderr,
            error: Some("command terminated by signal".to_string()),
        },
    }
}

/// Read a pipe line by line, forwarding each line to `sink` and returning
/// everything read.
async fn drain<R: AsyncRead + Unpin>(
    handle: Option<R>,
    stream: StreamKind,
    sink: Option<&dyn OutputSink>,
) -> String {
    let mut collected = String::new();
    let Some(handle) = handle else {
        return collected;
    };
    let mut reader = BufReader::new(handle);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&buf);
                let line = text.trim_end_matches(['\n', '\r']);
                if let Some(sink) = sink {
                    sink.line(stream, line);
                }
                collected.push_str(line);
                collected.push('\n');
            }
            Err(e) => {
                debug!(error = %e, "output pipe closed");
                break;
            }
        }
    }
    collected
}

/// Arguments for the `ssh` client, ending with the remote command.
#[must_use]
pub fn ssh_args(
    host: &Host,
    credentials: &Credentials,
    options: &ExecOptions,
    key_path: Option<&Path>,
    command: &str,
) -> Vec<String> {
    let mut args = vec![
        "-p".to_string(),
        host.port.to_string(),
        "-o".to_string(),
        format!("ConnectTimeout={}", options.connect_timeout.as_secs().max(1)),
        "-o".to_string(),
        "LogLevel=ERROR".to_string(),
    ];
    if options.strict_host_key {
        args.extend(["-o".to_string(), "StrictHostKeyChecking=yes".to_string()]);
    } else {
        args.extend([
            "-o".to_string(),
            "StrictHostKeyChecking=accept-new".to_string(),
            "-o".to_string(),
            "UserKnownHostsFile=/dev/null".to_string(),
        ]);
    }
    if let Some(path) = key_path {
        args.extend([
            "-i".to_string(),
            path.display().to_string(),
            "-o".to_string(),
            "IdentitiesOnly=yes".to_string(),
        ]);
    }
    if !credentials.needs_password_helper() {
        args.extend(["-o".to_string(), "BatchMode=yes".to_string()]);
    } else if credentials.private_key.is_none() {
        args.extend([
            "-o".to_string(),
            "PreferredAuthentications=password,keyboard-interactive".to_string(),
        ]);
    }
    args.push(format!("{}@{}", host.user, host.address));
    args.push("--".to_string());
    args.push(command.to_string());
    args
}

/// Write a private key to a `0600` temporary file removed on drop.
fn write_key_file(key: &str) -> Result<tempfile::NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("dockhand-key-")
        .tempfile()
        .context("cannot create temporary key file")?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o600))
            .context("cannot restrict key file permissions")?;
    }
    file.write_all(key.as_bytes())
        .context("cannot write key file")?;
    if !key.ends_with('\n') {
        file.write_all(b"\n").context("cannot write key file")?;
    }
    file.flush().context("cannot write key file")?;
    Ok(file)
}
