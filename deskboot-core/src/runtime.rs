// deskboot-core/src/runtime.rs
//! Stage 4: pyenv, the target Python, pip and the GUI binding.
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use deskboot_common::config::Config;
use deskboot_common::error::{BootError, Result};
use deskboot_common::host::{CommandSpec, Host};
use regex::Regex;
use tracing::{debug, error, info, warn};

use crate::ui;

const BLOCK_START: &str = "# deskboot pyenv start";
const BLOCK_END: &str = "# deskboot pyenv end";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterpreterInfo {
    pub version: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct RuntimeOutcome {
    pub manager_installed: bool,
    pub version_installed: bool,
    pub profiles_updated: Vec<PathBuf>,
    pub interpreter: InterpreterInfo,
    pub warnings: Vec<String>,
}

pub async fn provision<H: Host>(host: &H, config: &Config) -> Result<RuntimeOutcome> {
    let manager_installed = ensure_pyenv(host, config).await?;
    let profiles_updated = ensure_shell_init(config)?;
    let version_installed = ensure_python_version(host, config).await?;

    let global = pyenv(config, ["global", config.python_version.as_str()]);
    host.run(&global).await?.check(&global)?;
    info!("pyenv global set to {}", config.python_version);

    install_python_packages(host, config).await?;

    let interpreter = resolve_interpreter(host, config).await?;
    let mut warnings = Vec::new();
    if interpreter.version != config.python_version {
        let warning = format!(
            "Interpreter reports Python {} but {} was requested",
            interpreter.version, config.python_version
        );
        warn!("{}", warning);
        warnings.push(warning);
    }

    Ok(RuntimeOutcome {
        manager_installed,
        version_installed,
        profiles_updated,
        interpreter,
        warnings,
    })
}

fn pyenv<I, S>(config: &Config, args: I) -> CommandSpec
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    CommandSpec::new(config.pyenv_bin().display().to_string())
        .args(args)
        .env("PYENV_ROOT", config.pyenv_root.display().to_string())
}

fn python<I, S>(config: &Config, args: I) -> CommandSpec
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    CommandSpec::new(config.interpreter_path().display().to_string())
        .args(args)
        .env("PYENV_ROOT", config.pyenv_root.display().to_string())
}

/// Installs pyenv through its installer script when the binary is missing.
/// Returns whether an installation happened.
async fn ensure_pyenv<H: Host>(host: &H, config: &Config) -> Result<bool> {
    let pyenv_bin = config.pyenv_bin();
    if pyenv_bin.is_file() {
        debug!("pyenv found at {}", pyenv_bin.display());
        return Ok(false);
    }
    if config.pyenv_root.exists() {
        return Err(BootError::Install(format!(
            "{} exists but contains no pyenv executable; remove it or point DESKBOOT_PYENV_ROOT elsewhere",
            config.pyenv_root.display()
        )));
    }

    ui::step(&format!("Installing pyenv into {}", config.pyenv_root.display()));
    let script = host.fetch_text(&config.pyenv_installer_url).await?;
    if let Some(expected) = &config.pyenv_installer_sha256 {
        deskboot_aio::verify_sha256(&config.pyenv_installer_url, script.as_bytes(), expected)?;
    }

    let installer = CommandSpec::new("bash")
        .env("PYENV_ROOT", config.pyenv_root.display().to_string())
        .stdin_bytes(script);
    host.run(&installer)
        .await?
        .check(&installer)
        .inspect_err(|e| error!("pyenv installer failed: {}", e))?;

    if !pyenv_bin.is_file() {
        return Err(BootError::Install(format!(
            "pyenv installer finished but {} does not exist",
            pyenv_bin.display()
        )));
    }
    info!("pyenv installed at {}", pyenv_bin.display());
    Ok(true)
}

/// Installs the target version unless pyenv already knows it.
async fn ensure_python_version<H: Host>(host: &H, config: &Config) -> Result<bool> {
    let list = pyenv(config, ["versions", "--bare"]);
    let output = host.run(&list).await?.check(&list)?;
    let known = output
        .stdout
        .lines()
        .map(str::trim)
        .any(|v| v == config.python_version);

    if known {
        debug!("Python {} already installed under pyenv", config.python_version);
        return Ok(false);
    }

    ui::step(&format!(
        "Building Python {} with pyenv (this can take several minutes)",
        config.python_version
    ));
    let install = pyenv(config, ["install", config.python_version.as_str()]);
    host.run(&install)
        .await?
        .check(&install)
        .map_err(|e| BootError::Install(format!("pyenv install {} failed: {e}", config.python_version)))?;
    Ok(true)
}

async fn install_python_packages<H: Host>(host: &H, config: &Config) -> Result<()> {
    ui::step("Upgrading pip");
    let upgrade_pip = python(config, ["-m", "pip", "install", "--upgrade", "pip"]);
    host.run(&upgrade_pip).await?.check(&upgrade_pip)?;

    if config.gui_bindings.is_empty() {
        return Ok(());
    }
    ui::step(&format!("Installing {}", config.gui_bindings.join(", ")));
    let bindings = python(config, ["-m", "pip", "install", "--upgrade"])
        .args(config.gui_bindings.iter().cloned());
    host.run(&bindings)
        .await?
        .check(&bindings)
        .map_err(|e| BootError::Install(format!("Failed to install GUI bindings: {e}")))?;
    Ok(())
}

async fn resolve_interpreter<H: Host>(host: &H, config: &Config) -> Result<InterpreterInfo> {
    let version_cmd = python(config, ["--version"]);
    let output = host.run(&version_cmd).await?.check(&version_cmd)?;
    // Python 2 printed the version on stderr.
    let raw = if output.stdout.trim().is_empty() {
        output.stderr
    } else {
        output.stdout
    };
    let version = raw
        .trim()
        .strip_prefix("Python ")
        .ok_or_else(|| BootError::Install(format!("Unexpected `python --version` output: {}", raw.trim())))?
        .to_string();

    Ok(InterpreterInfo {
        version,
        path: config.interpreter_path(),
    })
}

/// Adds the pyenv initialization block to each shell profile that does not
/// already reference pyenv. Returns the files that were modified.
pub fn ensure_shell_init(config: &Config) -> Result<Vec<PathBuf>> {
    let root = config.pyenv_root.display().to_string();
    let block = format!(
        "\n{BLOCK_START}\nexport PYENV_ROOT=\"{root}\"\n[ -d \"$PYENV_ROOT/bin\" ] && export PATH=\"$PYENV_ROOT/bin:$PATH\"\ncommand -v pyenv >/dev/null 2>&1 && eval \"$(pyenv init -)\"\n{BLOCK_END}\n"
    );

    let mut updated = Vec::new();
    for profile in config.shell_profiles() {
        if references_pyenv(&profile, &root)? {
            debug!(
                "pyenv already configured in {}. Skipping modification.",
                profile.display()
            );
            continue;
        }
        append_block(&profile, &block)?;
        info!("Added pyenv initialization to {}", profile.display());
        updated.push(profile);
    }
    Ok(updated)
}

fn references_pyenv(file_path: &Path, pyenv_root: &str) -> Result<bool> {
    if !file_path.exists() {
        return Ok(false);
    }
    let content = fs::read_to_string(file_path)?;
    let pattern = format!(
        r"(?m)^\s*[^#\n]*(?:PYENV_ROOT|pyenv init|{})",
        regex::escape(pyenv_root)
    );
    let search = Regex::new(&pattern)
        .map_err(|e| BootError::Generic(format!("Failed to compile regex for profile check: {e}")))?;
    Ok(content.contains(BLOCK_START) || search.is_match(&content))
}

fn append_block(file_path: &Path, block: &str) -> Result<()> {
    if let Some(parent) = file_path.parent() {
        deskboot_aio::fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(file_path)
        .map_err(|e| {
            error!("Could not open/create shell config {}: {}", file_path.display(), e);
            BootError::from(e)
        })?;
    file.write_all(block.as_bytes())?;
    Ok(())
}
