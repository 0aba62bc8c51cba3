// deskboot-aio/src/process.rs
use std::io::ErrorKind;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use deskboot_common::error::{BootError, Result};
use deskboot_common::host::{CommandOutput, CommandSpec};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, error, warn};

/// Time an abandoned process group gets between SIGTERM and SIGKILL.
#[cfg(unix)]
const KILL_GRACE: Duration = Duration::from_secs(2);

/// Asynchronously runs an external command described by `command`.
///
/// Output is captured unless the command is interactive. Captured commands
/// run in their own process group; if the returned future is dropped the
/// whole group is terminated, so callers can bound it with a timeout.
pub async fn run_command(command: &CommandSpec) -> Result<CommandOutput> {
    debug!(
        "Running command: {} (cwd: {:?}, envs: {:?})",
        command,
        command.cwd,
        command.envs.iter().map(|(k, _)| k).collect::<Vec<_>>() // Log only keys for envs
    );

    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args);
    cmd.envs(command.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    if let Some(dir) = &command.cwd {
        cmd.current_dir(dir);
    }

    if command.interactive {
        // Stays in the terminal's foreground group so prompts can read the tty.
        cmd.kill_on_drop(true);
        cmd.stdin(Stdio::inherit());
        cmd.stdout(Stdio::inherit());
        cmd.stderr(Stdio::inherit());
        let status = cmd.status().await.map_err(|e| spawn_error(command, e))?;
        debug!("Interactive command finished with status: {}", status);
        return Ok(CommandOutput {
            code: status.code(),
            ..Default::default()
        });
    }

    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.stdin(if command.stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null() // Prevent hanging on stdin
    });

    #[cfg(unix)]
    cmd.process_group(0);
    #[cfg(not(unix))]
    cmd.kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|e| spawn_error(command, e))?;
    #[cfg(unix)]
    let mut group = ProcessGroupGuard::new(child.id());

    // Feed stdin concurrently so a chatty child cannot deadlock on a full pipe.
    let writer = match (child.stdin.take(), &command.stdin) {
        (Some(mut stdin), Some(data)) => {
            let data = data.clone();
            Some(tokio::spawn(async move { stdin.write_all(&data).await }))
        }
        _ => None,
    };

    let output = child.wait_with_output().await;
    #[cfg(unix)]
    group.disarm();
    let output = output.map_err(|e| spawn_error(command, e))?;

    if let Some(writer) = writer {
        match writer.await {
            Ok(Err(e)) if e.kind() != ErrorKind::BrokenPipe => {
                warn!("Failed writing stdin for `{}`: {}", command, e);
            }
            Err(e) => warn!("stdin writer task for `{}` failed: {}", command, e),
            _ => {}
        }
    }

    let result = CommandOutput {
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };

    if !result.success() {
        debug!("Command failed with status: {}", output.status);
        if !result.stdout.trim().is_empty() {
            debug!("Stdout:\n{}", result.stdout.trim());
        }
        if !result.stderr.trim().is_empty() {
            debug!("Stderr:\n{}", result.stderr.trim());
        }
    } else {
        debug!("Command finished successfully.");
    }
    Ok(result)
}

fn spawn_error(command: &CommandSpec, e: std::io::Error) -> BootError {
    error!("Failed to execute `{}`: {}", command, e);
    BootError::Io(Arc::new(e))
}

/// Terminates a child's process group when its command is abandoned.
///
/// SIGTERM goes first so `sudo` relays it to the privileged command it runs
/// (sudo cannot relay SIGKILL). Whatever survives the grace period gets
/// SIGKILL.
#[cfg(unix)]
struct ProcessGroupGuard {
    pgid: Option<libc::pid_t>,
}

#[cfg(unix)]
impl ProcessGroupGuard {
    fn new(pid: Option<u32>) -> Self {
        Self {
            pgid: pid.and_then(|pid| libc::pid_t::try_from(pid).ok()),
        }
    }

    fn disarm(&mut self) {
        self.pgid = None;
    }
}

#[cfg(unix)]
impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        let Some(pgid) = self.pgid.take() else {
            return;
        };
        debug!("Terminating abandoned process group {}", pgid);
        // SAFETY: killpg has no memory-safety preconditions; a stale group id
        // only yields ESRCH.
        unsafe { libc::killpg(pgid, libc::SIGTERM) };
        std::thread::spawn(move || {
            std::thread::sleep(KILL_GRACE);
            // SAFETY: as above.
            unsafe { libc::killpg(pgid, libc::SIGKILL) };
        });
    }
}

/// True when the process runs with effective uid 0.
pub fn effective_uid_is_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() == 0 }
}
