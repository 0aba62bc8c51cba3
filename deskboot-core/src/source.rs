// deskboot-core/src/source.rs
//! Stage 5: the shell's source tree.
use deskboot_aio::SyncOutcome;
use deskboot_common::config::Config;
use deskboot_common::error::{BootError, Result};
use tracing::{info, warn};

use crate::ui;

/// Clones the shell repository, or forces an existing working copy onto the
/// remote branch tip. Local changes in the working copy are lost.
pub async fn synchronize(config: &Config) -> Result<SyncOutcome> {
    let path = config.working_copy.clone();
    let url = config.repo_url.clone();
    let branch = config.branch.clone();

    if path.exists() {
        warn!(
            "Resetting {} to origin/{}; local modifications are discarded",
            path.display(),
            branch
        );
        ui::notice(&format!(
            "Existing checkout at {} will be reset to origin/{branch}",
            path.display()
        ));
    } else {
        ui::step(&format!("Cloning {url} into {}", path.display()));
    }

    let outcome = tokio::task::spawn_blocking(move || {
        deskboot_aio::sync_working_copy(&path, &url, &branch)
    })
    .await
    .map_err(|e| BootError::Generic(format!("Source sync task failed: {e}")))??;

    let entry = config.entry_point_path();
    if !entry.is_file() {
        return Err(BootError::Sync(format!(
            "{} does not contain the entry point {}",
            config.working_copy.display(),
            config.entry_point
        )));
    }

    info!("Working copy at {} is at {}", config.working_copy.display(), outcome.head());
    Ok(outcome)
}
