// deskboot-core/src/packages.rs
//! Stages 2 and 3: package index refresh and native package installation.
use std::time::Duration;

use deskboot_common::error::Result;
use deskboot_common::host::{CommandSpec, Host, Privilege};
use tracing::{debug, error, info, warn};

use crate::ui;

const FRONTEND_KEY: &str = "DEBIAN_FRONTEND";
const FRONTEND_VALUE: &str = "noninteractive";
const INSTALLED_STATUS: &str = "install ok installed";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Refreshed,
    TimedOut(Duration),
    Failed(String),
}

impl RefreshOutcome {
    /// The warning to surface in the report, if the refresh did not complete.
    pub fn warning(&self) -> Option<String> {
        match self {
            Self::Refreshed => None,
            Self::TimedOut(limit) => Some(format!(
                "Package index refresh did not finish within {}; continuing with the existing index",
                humantime::format_duration(*limit)
            )),
            Self::Failed(reason) => Some(format!(
                "Package index refresh failed ({reason}); continuing with the existing index"
            )),
        }
    }
}

fn apt_get<I, S>(args: I) -> CommandSpec
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    CommandSpec::new("apt-get")
        .args(args)
        .env(FRONTEND_KEY, FRONTEND_VALUE)
}

/// Runs `apt-get update` bounded by `limit`. Never fails the pipeline.
pub async fn refresh_index<H: Host>(
    host: &H,
    privilege: Privilege,
    limit: Duration,
) -> RefreshOutcome {
    let update = apt_get(["update"]).elevated(privilege);
    ui::step(&format!(
        "Refreshing package index (up to {})",
        humantime::format_duration(limit)
    ));

    let outcome = match tokio::time::timeout(limit, host.run(&update)).await {
        Err(_) => RefreshOutcome::TimedOut(limit),
        Ok(Ok(output)) if output.success() => RefreshOutcome::Refreshed,
        Ok(Ok(output)) => RefreshOutcome::Failed(match output.code {
            Some(code) => format!("exit status {code}: {}", output.stderr.trim()),
            None => "terminated by signal".to_string(),
        }),
        Ok(Err(e)) => RefreshOutcome::Failed(e.to_string()),
    };

    match outcome.warning() {
        Some(warning) => warn!("{}", warning),
        None => info!("Package index refreshed"),
    }
    outcome
}

/// True when dpkg reports `package` as fully installed.
pub async fn is_installed<H: Host>(host: &H, package: &str) -> Result<bool> {
    let query = CommandSpec::new("dpkg-query").args(["-W", "-f=${Status}", package]);
    let output = host.run(&query).await?;
    Ok(output.success() && output.stdout.contains(INSTALLED_STATUS))
}

/// Installs every package of `packages` that is not installed yet.
///
/// Returns the names that were installed by this call. The first failing
/// install aborts with the installer's own error.
pub async fn install_missing<H: Host>(
    host: &H,
    privilege: Privilege,
    packages: &[String],
) -> Result<Vec<String>> {
    let mut installed = Vec::new();

    for package in packages {
        if is_installed(host, package).await? {
            debug!("{} already installed, skipping", package);
            continue;
        }

        ui::step(&format!("Installing {package}"));
        let install = apt_get(["install", "-y", package.as_str()]).elevated(privilege);
        host.run(&install)
            .await?
            .check(&install)
            .inspect_err(|e| error!("Failed to install {}: {}", package, e))?;
        installed.push(package.clone());
    }

    if installed.is_empty() {
        info!("All {} required packages already installed", packages.len());
    } else {
        info!("Installed {} package(s): {}", installed.len(), installed.join(", "));
    }
    Ok(installed)
}
