//! File watching for the kubeconfig files behind a generation

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{ClusterError, Result};

/// A change to one or more watched kubeconfig files
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReloadEvent {
    pub paths: Vec<PathBuf>,
}

/// Owns the file-system subscriptions for one kubeconfig file set.
///
/// Dropping the handle closes it; closing twice is a no-op.
pub struct WatchHandle {
    watcher: Mutex<Option<RecommendedWatcher>>,
    paths: Vec<PathBuf>,
}

impl WatchHandle {
    /// A handle that watches nothing (in-cluster mode)
    pub fn inactive() -> Self {
        Self {
            watcher: Mutex::new(None),
            paths: Vec::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.watcher.lock().is_some()
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Release the subscriptions
    pub fn close(&self) {
        if self.watcher.lock().take().is_some() {
            debug!(paths = ?self.paths, "Closed kubeconfig watch");
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// Subscribe to changes of `paths`, sending a [`ReloadEvent`] per change.
///
/// Parent directories are watched so that editors replacing the file by
/// rename are still seen. Returns an inactive handle when `paths` is empty.
pub fn watch_kubeconfig(paths: &[PathBuf], events: mpsc::Sender<ReloadEvent>) -> Result<WatchHandle> {
    if paths.is_empty() {
        return Ok(WatchHandle::inactive());
    }

    let mut targets = HashSet::new();
    let mut directories = BTreeSet::new();
    for path in paths {
        let Some((directory, target)) = watch_target(path) else {
            warn!(path = %path.display(), "Cannot watch kubeconfig, parent directory missing");
            continue;
        };
        directories.insert(directory);
        targets.insert(target);
    }
    if directories.is_empty() {
        return Ok(WatchHandle::inactive());
    }

    let mut watcher = RecommendedWatcher::new(
        move |result: notify::Result<Event>| {
            let Ok(event) = result else {
                return;
            };
            match event.kind {
                EventKind::Create(_) => {}
                EventKind::Modify(ModifyKind::Metadata(_)) => return,
                EventKind::Modify(_) => {}
                _ => return,
            }

            let changed: Vec<PathBuf> = event
                .paths
                .into_iter()
                .filter(|p| targets.contains(p))
                .collect();
            if changed.is_empty() {
                return;
            }

            // A full channel already holds a pending reload
            let _ = events.try_send(ReloadEvent { paths: changed });
        },
        notify::Config::default(),
    )
    .map_err(|e| ClusterError::Watch {
        path: paths[0].clone(),
        message: e.to_string(),
    })?;

    for directory in &directories {
        watcher
            .watch(directory, RecursiveMode::NonRecursive)
            .map_err(|e| ClusterError::Watch {
                path: directory.clone(),
                message: e.to_string(),
            })?;
    }

    debug!(paths = ?paths, "Watching kubeconfig files");
    Ok(WatchHandle {
        watcher: Mutex::new(Some(watcher)),
        paths: paths.to_vec(),
    })
}

/// Canonical parent directory and the path events will report for `path`
fn watch_target(path: &Path) -> Option<(PathBuf, PathBuf)> {
    let absolute = std::path::absolute(path).ok()?;
    let file_name = absolute.file_name()?.to_owned();
    let directory = absolute.parent()?.canonicalize().ok()?;
    let target = directory.join(file_name);
    Some((directory, target))
}
