// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scoped per-request workspaces.
//
// Every request that reaches a capability gets its own directory under the
// configured workspace root, named after the request id plus a random suffix:
//
//   <root>/wandelwerk-<request-id>-XXXXXX/
//       in/       uploaded inputs (input_1.pdf, input_2.pdf, ...)
//       out/      capability output
//       profile/  office-suite user profile (created on demand)
//
// The directory is removed when the `Workspace` is dropped, whatever the
// outcome of the request. A failed removal is logged and otherwise ignored.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tempfile::TempDir;
use tracing::{debug, info, instrument, warn};
use wandelwerk_core::error::{REDACTED_PATH, Result, WandelwerkError};
use wandelwerk_core::types::RequestId;

/// Directory-name prefix shared by every workspace.
pub const WORKSPACE_PREFIX: &str = "wandelwerk-";

/// Allocates workspaces below one root directory.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    /// Relative roots are resolved against the current directory once, here,
    /// so later path redaction sees the same text the tools see.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = std::path::absolute(&root).unwrap_or(root);
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a fresh workspace for `request_id`.
    ///
    /// Any failure to create the directories (disk full, quota,
    /// permissions) is reported as `ResourceExhausted`.
    #[instrument(skip(self), fields(%request_id))]
    pub fn acquire(&self, request_id: RequestId) -> Result<Workspace> {
        let exhausted = |err: std::io::Error| {
            WandelwerkError::ResourceExhausted(
                err.to_string()
                    .replace(&self.root.display().to_string(), REDACTED_PATH),
            )
        };

        fs::create_dir_all(&self.root).map_err(exhausted)?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("{WORKSPACE_PREFIX}{request_id}-"))
            .tempdir_in(&self.root)
            .map_err(exhausted)?;

        let path = dir.path().to_path_buf();
        fs::create_dir(path.join("in")).map_err(exhausted)?;
        fs::create_dir(path.join("out")).map_err(exhausted)?;

        debug!(workspace = %path.display(), "Workspace acquired");
        Ok(Workspace {
            dir: Some(dir),
            path,
            request_id,
        })
    }

    /// Remove workspace directories older than `max_age`, left behind by a
    /// process that died before its guards ran.
    ///
    /// Best effort: entries that cannot be inspected or removed are logged
    /// and skipped. Returns the number of directories removed.
    #[instrument(skip(self), fields(root = %self.root.display()))]
    pub fn sweep_orphans(&self, max_age: Duration) -> Result<usize> {
        if !self.root.is_dir() {
            return Ok(0);
        }

        let now = SystemTime::now();
        let mut removed = 0;

        for entry in fs::read_dir(&self.root)? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(%err, "Cannot read workspace root entry");
                    continue;
                }
            };

            let name = entry.file_name();
            if !name.to_string_lossy().starts_with(WORKSPACE_PREFIX) {
                continue;
            }

            let path = entry.path();
            let age = entry
                .metadata()
                .and_then(|meta| meta.modified())
                .ok()
                .and_then(|modified| now.duration_since(modified).ok());
            match age {
                Some(age) if age > max_age && path.is_dir() => match fs::remove_dir_all(&path) {
                    Ok(()) => removed += 1,
                    Err(err) => warn!(path = %path.display(), %err, "Cannot remove orphaned workspace"),
                },
                _ => {}
            }
        }

        if removed > 0 {
            info!(removed, "Orphaned workspaces removed");
        }
        Ok(removed)
    }
}

/// An exclusively owned request directory, deleted on drop.
#[derive(Debug)]
pub struct Workspace {
    dir: Option<TempDir>,
    path: PathBuf,
    request_id: RequestId,
}

impl Workspace {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Where inputs are staged.
    pub fn input_dir(&self) -> PathBuf {
        self.path.join("in")
    }

    /// Where capabilities write their results.
    pub fn output_dir(&self) -> PathBuf {
        self.path.join("out")
    }

    /// Replace this workspace's path in `text` with a placeholder.
    pub fn redact(&self, text: &str) -> String {
        text.replace(&self.path.display().to_string(), REDACTED_PATH)
    }

    /// Scrub this workspace's path from an error's diagnostics.
    pub fn redact_error(&self, err: WandelwerkError) -> WandelwerkError {
        err.redact(&self.path)
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };
        match dir.close() {
            Ok(()) => debug!(request_id = %self.request_id, "Workspace released"),
            Err(err) => warn!(
                request_id = %self.request_id,
                workspace = %self.path.display(),
                %err,
                "Workspace cleanup failed"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(root: &Path) -> Vec<PathBuf> {
        fs::read_dir(root)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect()
    }

    #[test]
    fn acquire_creates_layout_and_drop_removes_it() {
        let root = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(root.path());
        let id = RequestId::new();

        let workspace = manager.acquire(id).unwrap();
        assert!(workspace.input_dir().is_dir());
        assert!(workspace.output_dir().is_dir());
        let name = workspace.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(&format!("wandelwerk-{id}-")));

        fs::write(workspace.output_dir().join("page_1.png"), b"x").unwrap();
        drop(workspace);
        assert!(entries(root.path()).is_empty());
    }

    #[test]
    fn concurrent_requests_get_distinct_directories() {
        let root = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(root.path());
        let id = RequestId::new();
        let first = manager.acquire(id).unwrap();
        let second = manager.acquire(id).unwrap();
        assert_ne!(first.path(), second.path());
    }

    #[test]
    fn creates_missing_root() {
        let root = tempfile::tempdir().unwrap();
        let nested = root.path().join("a").join("b");
        let workspace = WorkspaceManager::new(&nested).acquire(RequestId::new()).unwrap();
        assert!(workspace.path().starts_with(&nested));
    }

    #[cfg(unix)]
    #[test]
    fn unwritable_root_is_resource_exhausted() {
        use std::os::unix::fs::PermissionsExt;

        let root = tempfile::tempdir().unwrap();
        let locked = root.path().join("locked");
        fs::create_dir(&locked).unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o500)).unwrap();

        // Root ignores permission bits, so only assert when a plain write fails too.
        if fs::write(locked.join("sentinel"), b"").is_err() {
            let err = WorkspaceManager::new(&locked)
                .acquire(RequestId::new())
                .unwrap_err();
            assert!(matches!(err, WandelwerkError::ResourceExhausted(_)));
            assert!(!err.to_string().contains(&locked.display().to_string()));
        }
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o700)).unwrap();
    }

    #[test]
    fn redaction_hides_workspace_path() {
        let root = tempfile::tempdir().unwrap();
        let workspace = WorkspaceManager::new(root.path())
            .acquire(RequestId::new())
            .unwrap();
        let text = format!("cannot open {}/in/input_1.pdf", workspace.path().display());
        assert_eq!(workspace.redact(&text), "cannot open <workspace>/in/input_1.pdf");
    }

    #[test]
    fn sweep_removes_only_old_workspace_directories() {
        let root = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(root.path());
        let stale = root.path().join("wandelwerk-stale-abc123");
        fs::create_dir_all(stale.join("out")).unwrap();
        let unrelated = root.path().join("keep-me");
        fs::create_dir(&unrelated).unwrap();

        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(manager.sweep_orphans(Duration::from_secs(3600)).unwrap(), 0);
        assert_eq!(manager.sweep_orphans(Duration::from_millis(10)).unwrap(), 1);
        assert!(!stale.exists());
        assert!(unrelated.exists());
    }

    #[test]
    fn sweep_of_missing_root_is_a_no_op() {
        let root = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(root.path().join("missing"));
        assert_eq!(manager.sweep_orphans(Duration::ZERO).unwrap(), 0);
    }
}
