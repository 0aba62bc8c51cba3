/*
File: deskboot-aio/src/git2.rs
Purpose: Synchronous working copy synchronization using git2.
*/
use std::fs;
use std::path::Path;

use deskboot_common::error::{BootError, Result};
use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{FetchOptions, Repository, ResetType, Status, StatusOptions};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The working copy did not exist and was cloned.
    Cloned { head: String },
    /// The working copy existed and was forced onto the remote branch tip.
    Reset {
        previous: Option<String>,
        head: String,
    },
}

impl SyncOutcome {
    pub fn head(&self) -> &str {
        match self {
            Self::Cloned { head } | Self::Reset { head, .. } => head,
        }
    }
}

/// Makes `path` an exact copy of `branch` on `url`.
///
/// An existing working copy is reset destructively: local edits, local commits,
/// untracked files and ignored files are discarded. Contains blocking network and filesystem I/O.
pub fn sync_working_copy(path: &Path, url: &str, branch: &str) -> Result<SyncOutcome> {
    if path.exists() {
        reset_to_remote(path, url, branch)
    } else {
        clone_fresh(path, url, branch)
    }
}

fn clone_fresh(path: &Path, url: &str, branch: &str) -> Result<SyncOutcome> {
    debug!("Cloning {} ({}) into {}", url, branch, path.display());
    if let Some(parent) = path.parent() {
        crate::fs::create_dir_all(parent)?;
    }

    let repo = RepoBuilder::new()
        .branch(branch)
        .clone(url, path)
        .map_err(|e| {
            error!("Failed clone {} into {}: {}", url, path.display(), e);
            BootError::Sync(format!("Failed to clone {url} (branch {branch}): {e}"))
        })?;

    let head = head_commit_id(&repo)?;
    debug!("Clone of {} complete at {}", url, head);
    Ok(SyncOutcome::Cloned { head })
}

fn reset_to_remote(path: &Path, url: &str, branch: &str) -> Result<SyncOutcome> {
    debug!("Resetting working copy at {} to origin/{}", path.display(), branch);

    let repo = Repository::open(path).map_err(|e| {
        error!("Failed open repo {}: {}", path.display(), e);
        BootError::Sync(format!(
            "{} exists but is not a git repository: {e}",
            path.display()
        ))
    })?;
    let previous = head_commit_id(&repo).ok();

    ensure_origin_url(&repo, url)?;

    let mut remote = repo.find_remote("origin").map_err(|e| {
        error!("Failed find remote 'origin' in {}: {}", path.display(), e);
        BootError::Sync(format!("Failed to find remote 'origin': {e}"))
    })?;
    let mut fetch_options = FetchOptions::new();
    debug!("Fetching all branches for {}", path.display());
    remote
        .fetch(
            &["+refs/heads/*:refs/remotes/origin/*"], // Forced: remote history may be rewritten
            Some(&mut fetch_options),
            None,
        )
        .map_err(|e| {
            error!("Failed fetch repo {}: {}", path.display(), e);
            BootError::Sync(format!("Failed to fetch from {url}: {e}"))
        })?;
    drop(remote);

    let remote_branch_name = format!("refs/remotes/origin/{branch}");
    let target = repo
        .find_reference(&remote_branch_name)
        .and_then(|r| r.peel_to_commit())
        .map_err(|e| {
            error!("Failed find ref '{}': {}", remote_branch_name, e);
            BootError::Sync(format!(
                "Remote has no branch '{branch}' ({remote_branch_name}): {e}"
            ))
        })?;

    let local_branch_name = format!("refs/heads/{branch}");
    repo.reference(
        &local_branch_name,
        target.id(),
        true,
        &format!("deskboot: reset {branch} to origin/{branch}"),
    )?;
    repo.set_head(&local_branch_name).map_err(|e| {
        error!("Failed set HEAD to '{}': {}", local_branch_name, e);
        BootError::Sync(format!("Failed to set HEAD: {e}"))
    })?;

    let mut checkout = CheckoutBuilder::new();
    checkout.force();
    repo.reset(target.as_object(), ResetType::Hard, Some(&mut checkout))
        .map_err(|e| {
            error!("Failed hard reset of {}: {}", path.display(), e);
            BootError::Sync(format!("Failed to reset to origin/{branch}: {e}"))
        })?;

    remove_untracked(&repo)?;

    let head = target.id().to_string();
    if previous.as_deref() != Some(head.as_str()) {
        info!(
            "Working copy {} moved from {} to {}",
            path.display(),
            previous.as_deref().unwrap_or("<none>"),
            head
        );
    }
    Ok(SyncOutcome::Reset { previous, head })
}

fn ensure_origin_url(repo: &Repository, url: &str) -> Result<()> {
    let current = repo
        .find_remote("origin")
        .ok()
        .map(|remote| remote.url().map(str::to_string));

    match current {
        Some(Some(existing)) if existing == url => Ok(()),
        Some(existing) => {
            warn!(
                "Remote 'origin' pointed at {}, re-pointing it to {}",
                existing.as_deref().unwrap_or("<invalid utf-8>"),
                url
            );
            repo.remote_set_url("origin", url)?;
            Ok(())
        }
        None => {
            warn!("Remote 'origin' missing, adding it as {}", url);
            repo.remote("origin", url)?;
            Ok(())
        }
    }
}

/// Deletes untracked and ignored files and directories from the working tree.
fn remove_untracked(repo: &Repository) -> Result<()> {
    let workdir = repo
        .workdir()
        .ok_or_else(|| BootError::Sync("Repository has no working directory".into()))?
        .to_path_buf();

    let mut options = StatusOptions::new();
    options.include_untracked(true).include_ignored(true);

    let untracked: Vec<String> = repo
        .statuses(Some(&mut options))?
        .iter()
        .filter(|entry| entry.status().intersects(Status::WT_NEW | Status::IGNORED))
        .filter_map(|entry| entry.path().map(str::to_string))
        .collect();

    for relative in untracked {
        let full = workdir.join(relative.trim_end_matches('/'));
        debug!("Removing untracked path {}", full.display());
        let removed = if full.is_dir() {
            fs::remove_dir_all(&full)
        } else {
            fs::remove_file(&full)
        };
        removed.map_err(|e| {
            error!("Failed remove untracked {}: {}", full.display(), e);
            BootError::from(e)
        })?;
    }
    Ok(())
}

fn head_commit_id(repo: &Repository) -> Result<String> {
    Ok(repo.head()?.peel_to_commit()?.id().to_string())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use git2::{Commit, Oid, RepositoryInitOptions, Signature};
    use tempfile::TempDir;

    use super::*;

    fn init_upstream(dir: &Path) -> Repository {
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head("main");
        Repository::init_opts(dir, &opts).unwrap()
    }

    fn commit_file(repo: &Repository, name: &str, content: &str) -> Oid {
        let workdir = repo.workdir().unwrap().to_path_buf();
        let file = workdir.join(name);
        fs::create_dir_all(file.parent().unwrap()).unwrap();
        fs::write(&file, content).unwrap();

        let mut index = repo.index().unwrap();
        index.add_path(Path::new(name)).unwrap();
        index.write().unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
        let sig = Signature::now("deskboot", "deskboot@example.invalid").unwrap();
        let parents: Vec<Commit> = repo
            .head()
            .ok()
            .map(|h| h.peel_to_commit().unwrap())
            .into_iter()
            .collect();
        let parent_refs: Vec<&Commit> = parents.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, &format!("add {name}"), &tree, &parent_refs)
            .unwrap()
    }

    fn url_of(path: &Path) -> String {
        path.to_str().unwrap().to_string()
    }

    struct Fixture {
        _root: TempDir,
        upstream: Repository,
        upstream_path: PathBuf,
        working_copy: PathBuf,
    }

    fn fixture() -> Fixture {
        let root = TempDir::new().unwrap();
        let upstream_path = root.path().join("upstream");
        let upstream = init_upstream(&upstream_path);
        commit_file(&upstream, "desktop.py", "print('v1')\n");
        let working_copy = root.path().join("home/abolfazl-desktop");
        Fixture {
            _root: root,
            upstream,
            upstream_path,
            working_copy,
        }
    }

    #[test]
    fn clones_when_missing() {
        let fx = fixture();
        let tip = fx.upstream.head().unwrap().target().unwrap();

        let outcome =
            sync_working_copy(&fx.working_copy, &url_of(&fx.upstream_path), "main").unwrap();

        assert_eq!(outcome, SyncOutcome::Cloned { head: tip.to_string() });
        assert_eq!(
            fs::read_to_string(fx.working_copy.join("desktop.py")).unwrap(),
            "print('v1')\n"
        );
    }

    #[test]
    fn reset_discards_local_drift_and_converges_on_remote_tip() {
        let fx = fixture();
        let url = url_of(&fx.upstream_path);
        sync_working_copy(&fx.working_copy, &url, "main").unwrap();

        // Local drift: edited tracked file, local commit, untracked file and dir.
        let local = Repository::open(&fx.working_copy).unwrap();
        commit_file(&local, "local-only.txt", "mine\n");
        fs::write(fx.working_copy.join("desktop.py"), "print('hacked')\n").unwrap();
        fs::write(fx.working_copy.join("scratch.txt"), "junk").unwrap();
        fs::create_dir_all(fx.working_copy.join("notes/deep")).unwrap();
        fs::write(fx.working_copy.join("notes/deep/todo.md"), "x").unwrap();

        commit_file(&fx.upstream, "desktop.py", "print('v2')\n");
        let tip = fx.upstream.head().unwrap().target().unwrap().to_string();

        let outcome = sync_working_copy(&fx.working_copy, &url, "main").unwrap();

        match outcome {
            SyncOutcome::Reset { previous, head } => {
                assert_eq!(head, tip);
                assert_ne!(previous.as_deref(), Some(tip.as_str()));
            }
            other => panic!("expected reset, got {other:?}"),
        }
        assert_eq!(
            fs::read_to_string(fx.working_copy.join("desktop.py")).unwrap(),
            "print('v2')\n"
        );
        assert!(!fx.working_copy.join("local-only.txt").exists());
        assert!(!fx.working_copy.join("scratch.txt").exists());
        assert!(!fx.working_copy.join("notes").exists());

        let local = Repository::open(&fx.working_copy).unwrap();
        assert_eq!(local.head().unwrap().shorthand(), Some("main"));
        assert_eq!(local.head().unwrap().target().unwrap().to_string(), tip);
        let mut opts = StatusOptions::new();
        opts.include_untracked(true);
        assert!(local.statuses(Some(&mut opts)).unwrap().is_empty());
    }

    #[test]
    fn reset_removes_ignored_leftovers() {
        let fx = fixture();
        commit_file(&fx.upstream, ".gitignore", "__pycache__/\n*.local.toml\n");
        let url = url_of(&fx.upstream_path);
        sync_working_copy(&fx.working_copy, &url, "main").unwrap();

        fs::create_dir_all(fx.working_copy.join("__pycache__")).unwrap();
        fs::write(fx.working_copy.join("__pycache__/desktop.cpython-312.pyc"), "bytecode").unwrap();
        fs::write(fx.working_copy.join("settings.local.toml"), "theme = 'dark'").unwrap();

        sync_working_copy(&fx.working_copy, &url, "main").unwrap();

        assert!(!fx.working_copy.join("__pycache__").exists());
        assert!(!fx.working_copy.join("settings.local.toml").exists());
        assert!(fx.working_copy.join(".gitignore").is_file());
        assert!(fx.working_copy.join("desktop.py").is_file());
    }

    #[test]
    fn rerun_without_changes_is_a_no_op_reset() {
        let fx = fixture();
        let url = url_of(&fx.upstream_path);
        let first = sync_working_copy(&fx.working_copy, &url, "main").unwrap();

        let second = sync_working_copy(&fx.working_copy, &url, "main").unwrap();

        assert_eq!(
            second,
            SyncOutcome::Reset {
                previous: Some(first.head().to_string()),
                head: first.head().to_string(),
            }
        );
    }

    #[test]
    fn repoints_origin_to_configured_url() {
        let fx = fixture();
        sync_working_copy(&fx.working_copy, &url_of(&fx.upstream_path), "main").unwrap();

        let other_path = fx.upstream_path.with_file_name("fork");
        let other = init_upstream(&other_path);
        commit_file(&other, "desktop.py", "print('fork')\n");
        let other_tip = other.head().unwrap().target().unwrap().to_string();

        let outcome = sync_working_copy(&fx.working_copy, &url_of(&other_path), "main").unwrap();

        assert_eq!(outcome.head(), other_tip);
        let local = Repository::open(&fx.working_copy).unwrap();
        let origin = local.find_remote("origin").unwrap();
        assert_eq!(origin.url(), Some(url_of(&other_path).as_str()));
    }

    #[test]
    fn existing_non_repository_is_rejected() {
        let fx = fixture();
        fs::create_dir_all(&fx.working_copy).unwrap();
        fs::write(fx.working_copy.join("keep.txt"), "precious").unwrap();

        let err =
            sync_working_copy(&fx.working_copy, &url_of(&fx.upstream_path), "main").unwrap_err();

        assert!(matches!(err, BootError::Sync(msg) if msg.contains("not a git repository")));
        assert!(fx.working_copy.join("keep.txt").exists());
    }

    #[test]
    fn missing_remote_branch_is_an_error() {
        let fx = fixture();
        let url = url_of(&fx.upstream_path);
        sync_working_copy(&fx.working_copy, &url, "main").unwrap();

        let err = sync_working_copy(&fx.working_copy, &url, "release").unwrap_err();

        assert!(matches!(err, BootError::Sync(msg) if msg.contains("release")));
    }
}
