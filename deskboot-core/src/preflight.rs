// deskboot-core/src/preflight.rs
use deskboot_common::error::{BootError, Result};
use tracing::debug;

/// Fails fast when the host lacks the tools the stages shell out to.
pub fn check_required_tools(running_as_root: bool) -> Result<()> {
    let mut required = vec!["apt-get", "dpkg-query", "bash"];
    if !running_as_root {
        required.push("sudo");
    }
    let missing = missing_tools(&required);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(BootError::Config(format!(
            "Required tool(s) not found on PATH: {}. deskboot supports Debian-family hosts only.",
            missing.join(", ")
        )))
    }
}

pub fn missing_tools<'a>(tools: &[&'a str]) -> Vec<&'a str> {
    tools
        .iter()
        .copied()
        .filter(|tool| match which::which(tool) {
            Ok(path) => {
                debug!("Found {} at {}", tool, path.display());
                false
            }
            Err(_) => true,
        })
        .collect()
}
