// deskboot-core/src/report.rs
//! Stage 7: the completion summary.
use colored::Colorize;
use deskboot_aio::SyncOutcome;
use deskboot_common::config::{Config, APP_NAME};
use deskboot_common::host::Privilege;

use crate::launcher::{DescriptorOutcome, LauncherOutcome};
use crate::packages::RefreshOutcome;
use crate::runtime::RuntimeOutcome;

#[derive(Debug, Clone)]
pub struct BootstrapReport {
    pub privilege: Privilege,
    pub refresh: RefreshOutcome,
    pub installed_packages: Vec<String>,
    pub runtime: RuntimeOutcome,
    pub source: SyncOutcome,
    pub launchers: LauncherOutcome,
    pub warnings: Vec<String>,
}

impl BootstrapReport {
    pub fn summary_lines(&self, config: &Config) -> Vec<String> {
        let interpreter = &self.runtime.interpreter;
        let mut lines = vec![format!("{APP_NAME} environment is ready.")];

        lines.push(format!(
            "Python {} at {}",
            interpreter.version,
            interpreter.path.display()
        ));

        if self.installed_packages.is_empty() {
            lines.push("Packages: all required packages were already installed".to_string());
        } else {
            lines.push(format!(
                "Packages installed: {}",
                self.installed_packages.join(", ")
            ));
        }

        let source = match &self.source {
            SyncOutcome::Cloned { head } => format!("cloned at {}", short(head)),
            SyncOutcome::Reset {
                previous: Some(previous),
                head,
            } if previous != head => {
                format!("reset from {} to {}", short(previous), short(head))
            }
            SyncOutcome::Reset { head, .. } => format!("reset, already at {}", short(head)),
        };
        lines.push(format!(
            "Source: {} ({}, branch {})",
            config.working_copy.display(),
            source,
            config.branch
        ));

        lines.push(format!(
            "Session descriptor: {} ({})",
            self.launchers.session_path.display(),
            describe(self.launchers.session)
        ));
        lines.push(format!(
            "User launcher: {} ({})",
            self.launchers.user_path.display(),
            describe(self.launchers.user)
        ));

        lines.push(format!("Run manually: {}", self.launchers.exec));
        lines.push(format!(
            "Or log out and choose the \"{APP_NAME}\" session in your login manager."
        ));
        if !self.runtime.profiles_updated.is_empty() {
            lines.push("Open a new shell to pick up the pyenv initialization.".to_string());
        }
        lines
    }

    pub fn print(&self, config: &Config) {
        println!();
        for (i, line) in self.summary_lines(config).iter().enumerate() {
            if i == 0 {
                println!("{}", line.green().bold());
            } else {
                println!("  {line}");
            }
        }
        for warning in &self.warnings {
            println!("  {} {}", "Warning:".yellow().bold(), warning);
        }
    }
}

fn describe(outcome: DescriptorOutcome) -> &'static str {
    match outcome {
        DescriptorOutcome::Written => "written",
        DescriptorOutcome::Kept => "kept existing",
    }
}

fn short(commit: &str) -> &str {
    commit.get(..8).unwrap_or(commit)
}
