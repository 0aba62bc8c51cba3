// deskboot-core/src/launcher.rs
//! Stage 6: login-manager session descriptor and per-user launcher.
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use deskboot_common::config::{Config, APP_NAME};
use deskboot_common::error::{BootError, Result};
use deskboot_common::host::{CommandSpec, Host, Privilege};
use tracing::{debug, error, info};

use crate::ui;

const DESCRIPTOR_MODE: u32 = 0o755;
const COMMENT: &str = "GTK and WebKit desktop shell";

/// A freedesktop `.desktop` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesktopEntry {
    pub name: String,
    pub comment: String,
    pub exec: String,
    pub categories: Option<String>,
    pub terminal: Option<bool>,
}

impl DesktopEntry {
    /// Entry offered by display managers as a login session.
    pub fn session(exec: String) -> Self {
        Self {
            name: APP_NAME.to_string(),
            comment: COMMENT.to_string(),
            exec,
            categories: None,
            terminal: None,
        }
    }

    /// Entry shown in the user's application menu.
    pub fn application(exec: String) -> Self {
        Self {
            categories: Some("System;Utility;".to_string()),
            terminal: Some(false),
            ..Self::session(exec)
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::from("[Desktop Entry]\n");
        let _ = writeln!(out, "Name={}", self.name);
        let _ = writeln!(out, "Comment={}", self.comment);
        let _ = writeln!(out, "Exec={}", self.exec);
        out.push_str("Type=Application\n");
        out.push_str("SingleMainWindow=true\n");
        if let Some(categories) = &self.categories {
            let _ = writeln!(out, "Categories={categories}");
        }
        if let Some(terminal) = self.terminal {
            let _ = writeln!(out, "Terminal={terminal}");
        }
        out
    }
}

/// Builds the `Exec` value, quoting arguments the way the desktop entry
/// specification requires.
pub fn exec_line(interpreter: &Path, entry_point: &Path) -> String {
    [interpreter, entry_point]
        .iter()
        .map(|p| quote_exec_arg(&p.display().to_string()))
        .collect::<Vec<_>>()
        .join(" ")
}

fn quote_exec_arg(arg: &str) -> String {
    const RESERVED: &[char] = &[
        ' ', '\t', '\n', '"', '\'', '\\', '>', '<', '~', '|', '&', ';', '$', '*', '?', '#', '(',
        ')', '`',
    ];
    let arg = arg.replace('%', "%%");
    if !arg.contains(RESERVED) {
        return arg;
    }
    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');
    for c in arg.chars() {
        if matches!(c, '"' | '`' | '$' | '\\') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    // String values are unescaped before Exec quoting is interpreted.
    quoted.replace('\\', "\\\\")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorOutcome {
    Written,
    /// Already present and left untouched.
    Kept,
}

#[derive(Debug, Clone)]
pub struct LauncherOutcome {
    pub exec: String,
    pub session: DescriptorOutcome,
    pub session_path: PathBuf,
    pub user: DescriptorOutcome,
    pub user_path: PathBuf,
}

pub async fn register<H: Host>(
    host: &H,
    privilege: Privilege,
    config: &Config,
    interpreter: &Path,
) -> Result<LauncherOutcome> {
    let entry_point = absolute(&config.entry_point_path())?;
    let interpreter = absolute(interpreter)?;
    let exec = exec_line(&interpreter, &entry_point);
    debug!("Launcher Exec line: {}", exec);

    let session = if config.session_descriptor.exists() {
        info!(
            "Session descriptor {} already exists, leaving it untouched",
            config.session_descriptor.display()
        );
        ui::step(&format!(
            "Keeping existing session {}",
            config.session_descriptor.display()
        ));
        DescriptorOutcome::Kept
    } else {
        ui::step(&format!(
            "Registering login session {}",
            config.session_descriptor.display()
        ));
        let content = DesktopEntry::session(exec.clone()).render();
        write_system_file(host, privilege, &config.session_descriptor, &content).await?;
        DescriptorOutcome::Written
    };

    ui::step(&format!("Writing launcher {}", config.user_launcher.display()));
    let content = DesktopEntry::application(exec.clone()).render();
    deskboot_aio::fs::atomic_write_file(&config.user_launcher, content.as_bytes(), DESCRIPTOR_MODE)
        .map_err(|e| {
            BootError::Launcher(format!(
                "Failed to write {}: {e}",
                config.user_launcher.display()
            ))
        })?;
    info!("User launcher written to {}", config.user_launcher.display());

    Ok(LauncherOutcome {
        exec,
        session,
        session_path: config.session_descriptor.clone(),
        user: DescriptorOutcome::Written,
        user_path: config.user_launcher.clone(),
    })
}

async fn write_system_file<H: Host>(
    host: &H,
    privilege: Privilege,
    path: &Path,
    content: &str,
) -> Result<()> {
    let failed = |e: BootError| {
        error!("Failed to write {}: {}", path.display(), e);
        BootError::Launcher(format!("Failed to write {}: {e}", path.display()))
    };

    match privilege {
        Privilege::Root => {
            deskboot_aio::fs::atomic_write_file(path, content.as_bytes(), DESCRIPTOR_MODE)
                .map_err(failed)
        }
        Privilege::Sudo => {
            let path_str = path.display().to_string();
            let mut commands = Vec::with_capacity(3);
            if let Some(parent) = path.parent() {
                commands.push(
                    CommandSpec::new("mkdir").args(["-p".to_string(), parent.display().to_string()]),
                );
            }
            commands.push(
                CommandSpec::new("tee")
                    .arg(path_str.clone())
                    .stdin_bytes(content.as_bytes().to_vec()),
            );
            commands.push(CommandSpec::new("chmod").args([format!("{DESCRIPTOR_MODE:o}"), path_str]));

            for command in commands {
                let command = command.elevated(privilege);
                host.run(&command)
                    .await
                    .and_then(|output| output.check(&command))
                    .map_err(&failed)?;
            }
            Ok(())
        }
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(std::env::current_dir()?.join(path))
}
