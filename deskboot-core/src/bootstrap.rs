// deskboot-core/src/bootstrap.rs
//! The seven-stage provisioning pipeline.
use std::sync::Arc;

use deskboot_common::config::Config;
use deskboot_common::error::Result;
use deskboot_common::host::{Host, Privilege};
use tracing::{debug, info};

use crate::privilege::{self, SudoKeepAlive};
use crate::report::BootstrapReport;
use crate::{launcher, packages, runtime, source, ui};

pub struct Bootstrapper<H: Host> {
    host: Arc<H>,
    config: Config,
    running_as_root: bool,
}

impl<H: Host> Bootstrapper<H> {
    pub fn new(host: Arc<H>, config: Config, running_as_root: bool) -> Self {
        Self {
            host,
            config,
            running_as_root,
        }
    }

    /// Runs every stage in order and prints the completion report.
    ///
    /// The sudo keep-alive lives for the duration of this future. If the
    /// future is dropped early (interrupt) the guard aborts the task.
    pub async fn run(&self) -> Result<BootstrapReport> {
        ui::stage(1, "Acquiring privileges");
        let privilege = privilege::acquire(&*self.host, self.running_as_root).await?;
        let keepalive = match privilege {
            Privilege::Sudo => Some(SudoKeepAlive::spawn(
                Arc::clone(&self.host),
                self.config.keepalive_interval,
            )),
            Privilege::Root => None,
        };

        let result = self.run_stages(privilege).await;

        if let Some(keepalive) = keepalive {
            keepalive.stop().await;
        }
        let report = result?;

        ui::stage(7, "Done");
        report.print(&self.config);
        info!("Bootstrap finished with {} warning(s)", report.warnings.len());
        Ok(report)
    }

    async fn run_stages(&self, privilege: Privilege) -> Result<BootstrapReport> {
        let host = &*self.host;
        let config = &self.config;
        let mut warnings = Vec::new();

        ui::stage(2, "Refreshing package index");
        let refresh = packages::refresh_index(host, privilege, config.refresh_timeout).await;
        warnings.extend(refresh.warning());

        ui::stage(3, "Installing system packages");
        let installed_packages = packages::install_missing(host, privilege, &config.packages).await?;

        ui::stage(4, "Provisioning Python runtime");
        let runtime = runtime::provision(host, config).await?;
        warnings.extend(runtime.warnings.iter().cloned());

        ui::stage(5, "Synchronizing source");
        let source = source::synchronize(config).await?;

        ui::stage(6, "Registering launchers");
        let launchers =
            launcher::register(host, privilege, config, &runtime.interpreter.path).await?;

        debug!("All provisioning stages completed");
        Ok(BootstrapReport {
            privilege,
            refresh,
            installed_packages,
            runtime,
            source,
            launchers,
            warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;
    use std::sync::Mutex;
    use std::time::Duration;

    use deskboot_aio::SyncOutcome;
    use deskboot_common::error::BootError;
    use tempfile::TempDir;

    use super::*;
    use crate::launcher::DescriptorOutcome;
    use crate::packages::RefreshOutcome;
    use crate::testing::{exit, ok, simulated_host, unwrapped, upstream_repo, FakeHost, HostState};

    fn config_in(root: &Path) -> Config {
        let home = root.join("home");
        let mut config = Config::for_home(&home, &home.join(".local/share"));
        config.repo_url = upstream_repo(&root.join("upstream"));
        config.session_descriptor = root.join("xsessions/abolfazl-desktop.desktop");
        config
    }

    fn installs(host: &FakeHost) -> usize {
        host.calls()
            .iter()
            .map(unwrapped)
            .filter(|(program, args)| program == "apt-get" && args[0] == "install")
            .count()
    }

    #[tokio::test]
    async fn fresh_host_is_fully_provisioned() {
        let root = TempDir::new().unwrap();
        let config = config_in(root.path());
        let state = Arc::new(Mutex::new(HostState::default()));
        let host = Arc::new(simulated_host(&config, Arc::clone(&state)).serving_script("# pyenv"));

        let report = Bootstrapper::new(Arc::clone(&host), config.clone(), true)
            .run()
            .await
            .unwrap();

        assert_eq!(report.privilege, Privilege::Root);
        assert_eq!(report.installed_packages, config.packages);
        assert!(report.runtime.manager_installed);
        assert!(report.runtime.version_installed);
        assert_eq!(report.runtime.interpreter.version, "3.12.2");
        assert!(matches!(report.source, SyncOutcome::Cloned { .. }));
        assert_eq!(report.launchers.session, DescriptorOutcome::Written);
        assert!(report.warnings.is_empty());
        assert!(state.lock().unwrap().python_versions.contains(&"3.12.2".to_string()));
        assert!(config.entry_point_path().is_file());
        assert!(config.session_descriptor.is_file());
        assert!(config.user_launcher.is_file());
    }

    #[tokio::test]
    async fn second_run_converges_without_reinstalling() {
        let root = TempDir::new().unwrap();
        let config = config_in(root.path());
        let state = Arc::new(Mutex::new(HostState::default()));

        let first = Arc::new(simulated_host(&config, Arc::clone(&state)).serving_script("# pyenv"));
        Bootstrapper::new(first, config.clone(), true).run().await.unwrap();
        fs::write(config.entry_point_path(), "local drift").unwrap();

        let second = Arc::new(simulated_host(&config, Arc::clone(&state)));
        let report = Bootstrapper::new(Arc::clone(&second), config.clone(), true)
            .run()
            .await
            .unwrap();

        assert!(report.installed_packages.is_empty());
        assert_eq!(installs(&second), 0);
        assert!(second.fetches().is_empty());
        assert!(!report.runtime.manager_installed);
        assert!(!report.runtime.version_installed);
        let pyenv = config.pyenv_bin().display().to_string();
        assert_eq!(second.count(&pyenv, &["global", "3.12.2"]), 1);
        assert!(matches!(report.source, SyncOutcome::Reset { .. }));
        assert_eq!(
            fs::read_to_string(config.entry_point_path()).unwrap(),
            "print('desktop')\n"
        );
        assert_eq!(report.launchers.session, DescriptorOutcome::Kept);
        assert!(report.runtime.profiles_updated.is_empty());
    }

    #[tokio::test]
    async fn stalled_refresh_still_succeeds_with_a_warning() {
        let root = TempDir::new().unwrap();
        let mut config = config_in(root.path());
        config.refresh_timeout = Duration::from_millis(100);
        let state = Arc::new(Mutex::new(HostState::default()));
        let host = Arc::new(
            simulated_host(&config, state)
                .serving_script("# pyenv")
                .stalling_on(|c| unwrapped(c).1 == ["update"]),
        );

        let report = Bootstrapper::new(host, config, true).run().await.unwrap();

        assert_eq!(report.refresh, RefreshOutcome::TimedOut(Duration::from_millis(100)));
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("within 100ms;"));
    }

    #[tokio::test]
    async fn keepalive_is_stopped_after_a_fatal_stage() {
        let root = TempDir::new().unwrap();
        let config = config_in(root.path());
        let host = Arc::new(FakeHost::with_responder(|c| {
            let (program, args) = unwrapped(c);
            match (program.as_str(), args.first().map(String::as_str)) {
                ("dpkg-query", _) => exit(1, ""),
                ("apt-get", Some("install")) => exit(100, "E: broken mirror"),
                _ => ok(""),
            }
        }));

        let bootstrapper = Bootstrapper::new(Arc::clone(&host), config, false);
        let err = bootstrapper.run().await.unwrap_err();
        drop(bootstrapper);

        assert!(matches!(err, BootError::CommandFailed { .. }));
        assert!(host.calls()[0].matches("sudo", &["-v"]));
        // Only this test still holds the host: the keep-alive task is gone.
        assert_eq!(Arc::strong_count(&host), 1);
    }

    #[tokio::test]
    async fn interrupted_run_releases_the_keepalive() {
        let root = TempDir::new().unwrap();
        let config = config_in(root.path());
        let host = Arc::new(FakeHost::new().stalling_on(|c| unwrapped(c).0 == "dpkg-query"));

        let bootstrapper = Bootstrapper::new(Arc::clone(&host), config, false);
        let interrupted = tokio::select! {
            _ = bootstrapper.run() => false,
            _ = tokio::time::sleep(Duration::from_millis(200)) => true,
        };
        drop(bootstrapper);

        assert!(interrupted);
        assert!(host.calls().iter().any(|c| unwrapped(c).0 == "dpkg-query"));
        // Let the runtime release the aborted keep-alive task.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(Arc::strong_count(&host), 1);
    }

    #[tokio::test]
    async fn refused_sudo_runs_no_stage() {
        let root = TempDir::new().unwrap();
        let config = config_in(root.path());
        let host = Arc::new(FakeHost::with_responder(|_| exit(1, "")));

        let err = Bootstrapper::new(Arc::clone(&host), config, false)
            .run()
            .await
            .unwrap_err();

        assert!(matches!(err, BootError::PrivilegeDenied(_)));
        assert_eq!(host.calls().len(), 1);
    }
}
