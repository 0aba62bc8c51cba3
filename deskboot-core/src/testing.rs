// deskboot-core/src/testing.rs
//! A recording [`Host`] for stage tests.
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use deskboot_common::error::{BootError, Result};
use deskboot_common::host::{CommandOutput, CommandSpec, Host};
use deskboot_common::Config;

type Responder = dyn Fn(&CommandSpec) -> Result<CommandOutput> + Send + Sync;
type Matcher = dyn Fn(&CommandSpec) -> bool + Send + Sync;

pub struct FakeHost {
    calls: Mutex<Vec<CommandSpec>>,
    fetches: Mutex<Vec<String>>,
    responder: Box<Responder>,
    stall: Option<Box<Matcher>>,
    script: Option<String>,
}

impl FakeHost {
    /// Every command succeeds with empty output.
    pub fn new() -> Self {
        Self::with_responder(|_| ok(""))
    }

    pub fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&CommandSpec) -> Result<CommandOutput> + Send + Sync + 'static,
    {
        Self {
            calls: Mutex::new(Vec::new()),
            fetches: Mutex::new(Vec::new()),
            responder: Box::new(responder),
            stall: None,
            script: None,
        }
    }

    /// Commands matching `matcher` never complete (until the future is dropped).
    pub fn stalling_on<F>(mut self, matcher: F) -> Self
    where
        F: Fn(&CommandSpec) -> bool + Send + Sync + 'static,
    {
        self.stall = Some(Box::new(matcher));
        self
    }

    pub fn serving_script(mut self, script: &str) -> Self {
        self.script = Some(script.to_string());
        self
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, program: &str, args: &[&str]) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.matches(program, args))
            .count()
    }

    pub fn fetches(&self) -> Vec<String> {
        self.fetches.lock().unwrap().clone()
    }
}

impl Host for FakeHost {
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput> {
        self.calls.lock().unwrap().push(command.clone());
        if self.stall.as_ref().is_some_and(|m| m(command)) {
            tokio::time::sleep(Duration::from_secs(24 * 60 * 60)).await;
        }
        (self.responder)(command)
    }

    async fn fetch_text(&self, url: &str) -> Result<String> {
        self.fetches.lock().unwrap().push(url.to_string());
        self.script
            .clone()
            .ok_or_else(|| BootError::HttpError(format!("no script served for {url}")))
    }
}

pub fn ok(stdout: &str) -> Result<CommandOutput> {
    Ok(CommandOutput {
        code: Some(0),
        stdout: stdout.to_string(),
        stderr: String::new(),
    })
}

pub fn exit(code: i32, stderr: &str) -> Result<CommandOutput> {
    Ok(CommandOutput {
        code: Some(code),
        stdout: String::new(),
        stderr: stderr.to_string(),
    })
}

/// Program and arguments with any `sudo [env K=V...]` prefix removed.
pub fn unwrapped(command: &CommandSpec) -> (String, Vec<String>) {
    if command.program != "sudo" {
        return (command.program.clone(), command.args.clone());
    }
    let mut rest = command.args.iter().skip_while(|a| a.starts_with('-'));
    let mut first = rest.next().cloned().unwrap_or_default();
    let mut remaining: Vec<String> = rest.cloned().collect();
    if first == "env" {
        let skip = remaining.iter().take_while(|a| a.contains('=')).count();
        first = remaining.get(skip).cloned().unwrap_or_default();
        remaining = remaining.into_iter().skip(skip + 1).collect();
    }
    (first, remaining)
}

#[derive(Debug, Default)]
pub struct HostState {
    pub packages: HashSet<String>,
    pub python_versions: Vec<String>,
}

/// A host that behaves like a Debian machine with apt, pyenv and python.
pub fn simulated_host(config: &Config, state: Arc<Mutex<HostState>>) -> FakeHost {
    let pyenv_bin = config.pyenv_bin().display().to_string();
    let pyenv_bin_path: PathBuf = config.pyenv_bin();
    let python = config.interpreter_path().display().to_string();
    let python_version = config.python_version.clone();

    FakeHost::with_responder(move |command| {
        let (program, args) = unwrapped(command);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let mut state = state.lock().unwrap();
        match (program.as_str(), args.as_slice()) {
            ("dpkg-query", [.., package]) => {
                if state.packages.contains(*package) {
                    ok("install ok installed")
                } else {
                    exit(1, &format!("dpkg-query: no packages found matching {package}"))
                }
            }
            ("apt-get", ["install", "-y", package]) => {
                state.packages.insert(package.to_string());
                ok("")
            }
            ("bash", []) => {
                fs::create_dir_all(pyenv_bin_path.parent().unwrap()).unwrap();
                fs::write(&pyenv_bin_path, "#!/bin/sh\n").unwrap();
                ok("")
            }
            (p, ["versions", "--bare"]) if p == pyenv_bin => ok(&state.python_versions.join("\n")),
            (p, ["install", version]) if p == pyenv_bin => {
                state.python_versions.push(version.to_string());
                ok("")
            }
            (p, ["--version"]) if p == python => ok(&format!("Python {python_version}\n")),
            _ => ok(""),
        }
    })
}

/// Creates a local repository on `main` holding `desktop.py` and returns its
/// path as a clone URL.
pub fn upstream_repo(dir: &std::path::Path) -> String {
    use git2::{RepositoryInitOptions, Signature};

    let mut opts = RepositoryInitOptions::new();
    opts.initial_head("main");
    let repo = git2::Repository::init_opts(dir, &opts).unwrap();
    fs::write(dir.join("desktop.py"), "print('desktop')\n").unwrap();

    let mut index = repo.index().unwrap();
    index.add_path(std::path::Path::new("desktop.py")).unwrap();
    index.write().unwrap();
    let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
    let sig = Signature::now("deskboot", "deskboot@example.invalid").unwrap();
    repo.commit(Some("HEAD"), &sig, &sig, "initial", &tree, &[])
        .unwrap();
    dir.to_str().unwrap().to_string()
}
