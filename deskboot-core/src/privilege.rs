// deskboot-core/src/privilege.rs
//! Stage 1: privilege acquisition and the sudo keep-alive.
use std::sync::Arc;
use std::time::Duration;

use deskboot_common::error::{BootError, Result};
use deskboot_common::host::{CommandSpec, Host, Privilege};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::ui;

/// Requests elevated privileges once. A refusal is fatal.
pub async fn acquire<H: Host>(host: &H, running_as_root: bool) -> Result<Privilege> {
    if running_as_root {
        info!("Running as root, privileged commands run directly");
        return Ok(Privilege::Root);
    }

    ui::notice("deskboot needs sudo to install packages and register the login session.");
    let validate = CommandSpec::new("sudo").arg("-v").interactive();
    match host.run(&validate).await {
        Ok(output) if output.success() => {
            debug!("sudo credentials validated");
            Ok(Privilege::Sudo)
        }
        Ok(output) => Err(BootError::PrivilegeDenied(format!(
            "sudo authentication was refused ({})",
            output
                .code
                .map(|c| format!("exit status {c}"))
                .unwrap_or_else(|| "terminated by signal".to_string())
        ))),
        Err(e) => Err(BootError::PrivilegeDenied(format!("could not run sudo: {e}"))),
    }
}

/// Background task re-validating the sudo timestamp every `interval`.
///
/// The task lives exactly as long as this guard: [`SudoKeepAlive::stop`] ends it
/// cleanly, and dropping the guard on any other path aborts it.
pub struct SudoKeepAlive {
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl SudoKeepAlive {
    pub fn spawn<H: Host>(host: Arc<H>, interval: Duration) -> Self {
        let (shutdown, mut stop_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let refresh = CommandSpec::new("sudo").args(["-n", "-v"]);

            loop {
                tokio::select! {
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        match host.run(&refresh).await {
                            Ok(output) if output.success() => debug!("sudo credentials refreshed"),
                            Ok(output) => warn!(
                                "sudo keep-alive refresh failed: {}",
                                output.stderr.trim()
                            ),
                            Err(e) => warn!("sudo keep-alive refresh could not run: {}", e),
                        }
                    }
                }
            }
            debug!("sudo keep-alive stopped");
        });

        debug!("sudo keep-alive started (every {:?})", interval);
        Self {
            shutdown,
            task: Some(task),
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Signals the task to finish and waits for it.
    pub async fn stop(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!("sudo keep-alive task ended abnormally: {}", e);
                }
            }
        }
    }
}

impl Drop for SudoKeepAlive {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            debug!("Aborting sudo keep-alive");
            task.abort();
        }
    }
}
