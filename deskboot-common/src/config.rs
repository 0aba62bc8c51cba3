// deskboot-common/src/config.rs
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::BaseDirs;
use serde::Deserialize;
use tracing::debug;

use super::error::{BootError, Result};

pub const APP_NAME: &str = "ABOLFAZL-DESKTOP";
pub const APP_ID: &str = "abolfazl-desktop";

const DEFAULT_REPO_URL: &str = "https://github.com/abolfazl-desktop/abolfazl-desktop.git";
const DEFAULT_BRANCH: &str = "main";
const DEFAULT_ENTRY_POINT: &str = "desktop.py";
const DEFAULT_PYTHON_VERSION: &str = "3.12.2";
const DEFAULT_PYENV_INSTALLER_URL: &str = "https://pyenv.run";
const DEFAULT_SESSION_DESCRIPTOR: &str = "/usr/share/xsessions/abolfazl-desktop.desktop";
const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(60);
const CONFIG_FILE_NAME: &str = "config.toml";

/// Native packages the shell and a pyenv source build need on Debian-family hosts.
pub const DEFAULT_PACKAGES: &[&str] = &[
    "build-essential",
    "curl",
    "git",
    "libssl-dev",
    "zlib1g-dev",
    "libbz2-dev",
    "libreadline-dev",
    "libsqlite3-dev",
    "libncursesw5-dev",
    "xz-utils",
    "tk-dev",
    "libxml2-dev",
    "libxmlsec1-dev",
    "libffi-dev",
    "liblzma-dev",
    "pkg-config",
    "libcairo2-dev",
    "libgirepository1.0-dev",
    "gir1.2-gtk-3.0",
    "gir1.2-webkit2-4.1",
    "gir1.2-wnck-3.0",
];

pub const DEFAULT_GUI_BINDINGS: &[&str] = &["PyGObject"];

#[derive(Debug, Clone)]
pub struct Config {
    pub home_dir: PathBuf,
    pub data_dir: PathBuf,
    pub repo_url: String,
    pub branch: String,
    pub working_copy: PathBuf,
    pub entry_point: String,
    pub python_version: String,
    pub pyenv_root: PathBuf,
    pub pyenv_installer_url: String,
    pub pyenv_installer_sha256: Option<String>,
    pub gui_bindings: Vec<String>,
    pub packages: Vec<String>,
    pub session_descriptor: PathBuf,
    pub user_launcher: PathBuf,
    pub refresh_timeout: Duration,
    pub keepalive_interval: Duration,
}

/// Optional overrides read from `config.toml`. Paths may start with `~/`.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub repo_url: Option<String>,
    pub branch: Option<String>,
    pub working_copy: Option<String>,
    pub entry_point: Option<String>,
    pub python_version: Option<String>,
    pub pyenv_root: Option<String>,
    pub pyenv_installer_url: Option<String>,
    pub pyenv_installer_sha256: Option<String>,
    pub gui_bindings: Option<Vec<String>>,
    pub packages: Option<Vec<String>>,
    pub session_descriptor: Option<String>,
    pub user_launcher: Option<String>,
    pub refresh_timeout: Option<String>,
    pub keepalive_interval: Option<String>,
}

impl Config {
    /// Defaults → `<config_dir>/deskboot/config.toml` → `DESKBOOT_*` environment.
    pub fn load() -> Result<Self> {
        debug!("Loading deskboot configuration");

        let base = BaseDirs::new().ok_or_else(|| {
            BootError::Config("Could not determine the home directory of the invoking user".into())
        })?;
        let mut config = Self::for_home(base.home_dir(), base.data_local_dir());

        let config_file = base.config_dir().join("deskboot").join(CONFIG_FILE_NAME);
        if config_file.is_file() {
            debug!("Reading config file {}", config_file.display());
            let raw = fs::read_to_string(&config_file)?;
            let file: FileConfig = toml::from_str(&raw)?;
            config.apply_file(file)?;
        } else {
            debug!("No config file at {}, using defaults", config_file.display());
        }

        config.apply_env(|key| env::var(key).ok().filter(|v| !v.is_empty()))?;
        config.validate()?;

        debug!("Configuration loaded successfully.");
        Ok(config)
    }

    /// Built-in defaults relative to a home and a local data directory.
    pub fn for_home(home_dir: &Path, data_dir: &Path) -> Self {
        Self {
            home_dir: home_dir.to_path_buf(),
            data_dir: data_dir.to_path_buf(),
            repo_url: DEFAULT_REPO_URL.to_string(),
            branch: DEFAULT_BRANCH.to_string(),
            working_copy: home_dir.join(APP_ID),
            entry_point: DEFAULT_ENTRY_POINT.to_string(),
            python_version: DEFAULT_PYTHON_VERSION.to_string(),
            pyenv_root: home_dir.join(".pyenv"),
            pyenv_installer_url: DEFAULT_PYENV_INSTALLER_URL.to_string(),
            pyenv_installer_sha256: None,
            gui_bindings: DEFAULT_GUI_BINDINGS.iter().map(|s| s.to_string()).collect(),
            packages: DEFAULT_PACKAGES.iter().map(|s| s.to_string()).collect(),
            session_descriptor: PathBuf::from(DEFAULT_SESSION_DESCRIPTOR),
            user_launcher: data_dir
                .join("applications")
                .join(format!("{APP_ID}.desktop")),
            refresh_timeout: DEFAULT_REFRESH_TIMEOUT,
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
        }
    }

    pub fn apply_file(&mut self, file: FileConfig) -> Result<()> {
        if let Some(v) = file.repo_url {
            self.repo_url = v;
        }
        if let Some(v) = file.branch {
            self.branch = v;
        }
        if let Some(v) = file.working_copy {
            self.working_copy = self.expand_home(&v);
        }
        if let Some(v) = file.entry_point {
            self.entry_point = v;
        }
        if let Some(v) = file.python_version {
            self.python_version = v;
        }
        if let Some(v) = file.pyenv_root {
            self.pyenv_root = self.expand_home(&v);
        }
        if let Some(v) = file.pyenv_installer_url {
            self.pyenv_installer_url = v;
        }
        if file.pyenv_installer_sha256.is_some() {
            self.pyenv_installer_sha256 = file.pyenv_installer_sha256;
        }
        if let Some(v) = file.gui_bindings {
            self.gui_bindings = v;
        }
        if let Some(v) = file.packages {
            self.packages = v;
        }
        if let Some(v) = file.session_descriptor {
            self.session_descriptor = self.expand_home(&v);
        }
        if let Some(v) = file.user_launcher {
            self.user_launcher = self.expand_home(&v);
        }
        if let Some(v) = file.refresh_timeout {
            self.refresh_timeout = parse_duration("refresh_timeout", &v)?;
        }
        if let Some(v) = file.keepalive_interval {
            self.keepalive_interval = parse_duration("keepalive_interval", &v)?;
        }
        Ok(())
    }

    /// Applies `DESKBOOT_*` overrides using `lookup` to read variables.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("DESKBOOT_REPO_URL") {
            self.repo_url = v;
        }
        if let Some(v) = lookup("DESKBOOT_BRANCH") {
            self.branch = v;
        }
        if let Some(v) = lookup("DESKBOOT_WORKING_COPY") {
            self.working_copy = self.expand_home(&v);
        }
        if let Some(v) = lookup("DESKBOOT_PYTHON_VERSION") {
            self.python_version = v;
        }
        if let Some(v) = lookup("DESKBOOT_PYENV_ROOT") {
            self.pyenv_root = self.expand_home(&v);
        }
        if let Some(v) = lookup("DESKBOOT_REFRESH_TIMEOUT") {
            self.refresh_timeout = parse_duration("DESKBOOT_REFRESH_TIMEOUT", &v)?;
        }
        if let Some(v) = lookup("DESKBOOT_KEEPALIVE_INTERVAL") {
            self.keepalive_interval = parse_duration("DESKBOOT_KEEPALIVE_INTERVAL", &v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.repo_url.trim().is_empty() {
            return Err(BootError::Config("repository URL must not be empty".into()));
        }
        if self.branch.trim().is_empty() {
            return Err(BootError::Config("branch must not be empty".into()));
        }
        if self.entry_point.trim().is_empty() {
            return Err(BootError::Config("entry point must not be empty".into()));
        }
        semver::Version::parse(&self.python_version).map_err(|e| {
            BootError::Config(format!(
                "python version '{}' is not a MAJOR.MINOR.PATCH version: {e}",
                self.python_version
            ))
        })?;
        if let Some(bad) = self
            .packages
            .iter()
            .chain(self.gui_bindings.iter())
            .find(|p| p.trim().is_empty() || p.contains(char::is_whitespace))
        {
            return Err(BootError::Config(format!("invalid package name '{bad}'")));
        }
        if self.refresh_timeout.is_zero() || self.keepalive_interval.is_zero() {
            return Err(BootError::Config(
                "refresh timeout and keep-alive interval must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    fn expand_home(&self, raw: &str) -> PathBuf {
        match raw.strip_prefix("~/") {
            Some(rest) => self.home_dir.join(rest),
            None if raw == "~" => self.home_dir.clone(),
            None => PathBuf::from(raw),
        }
    }

    pub fn pyenv_bin(&self) -> PathBuf {
        self.pyenv_root.join("bin").join("pyenv")
    }

    pub fn python_install_dir(&self) -> PathBuf {
        self.pyenv_root.join("versions").join(&self.python_version)
    }

    pub fn interpreter_path(&self) -> PathBuf {
        self.python_install_dir().join("bin").join("python")
    }

    pub fn entry_point_path(&self) -> PathBuf {
        self.working_copy.join(&self.entry_point)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir.join("deskboot").join("logs")
    }

    /// Shell startup files that receive the pyenv initialization block.
    pub fn shell_profiles(&self) -> Vec<PathBuf> {
        let mut profiles = vec![self.home_dir.join(".bashrc"), self.home_dir.join(".profile")];
        let zshrc = self.home_dir.join(".zshrc");
        if zshrc.exists() {
            profiles.push(zshrc);
        }
        profiles
    }
}

fn parse_duration(key: &str, raw: &str) -> Result<Duration> {
    humantime::parse_duration(raw.trim())
        .map_err(|e| BootError::Config(format!("invalid duration for {key} ('{raw}'): {e}")))
}
