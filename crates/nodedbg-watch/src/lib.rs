//! File-system change notifications used to trigger test re-discovery.
//!
//! Two kinds of registrations are supported:
//!
//! - [`TestFilesWatcher::watch`]: a single file. Only content/metadata changes of that file are
//!   reported ([`FileChangeReason::Changed`]).
//! - [`TestFilesWatcher::watch_tree`]: a directory and everything below it. Both changes and
//!   renames are reported.
//!
//! Notifications are delivered on a `crossbeam_channel` receiver owned by the watcher. Backends
//! may report one logical change several times; consumers must tolerate duplicates.
//!
//! Registrations are keyed by path. On Windows and macOS, whose default file systems ignore
//! case, `A.js` and `a.js` name the same registration.

use std::{
    collections::HashMap,
    ffi::OsString,
    path::{Path, PathBuf},
};

use crossbeam_channel as channel;
use notify::{
    event::{ModifyKind, RenameMode},
    EventKind, RecommendedWatcher, RecursiveMode, Watcher,
};

const TRACE_TARGET: &str = "nodedbg.watch";

const CASE_INSENSITIVE_PATHS: bool = cfg!(any(windows, target_os = "macos"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileChangeReason {
    Changed,
    Renamed,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileChange {
    pub path: PathBuf,
    pub reason: FileChangeReason,
}

/// What a single registration reports.
#[derive(Debug, Clone, PartialEq, Eq)]
enum WatchScope {
    /// One file, watched through its parent directory.
    File { file_name: OsString },
    /// A directory tree.
    Tree,
}

/// Owns every registration; dropping the watcher stops all of them.
pub struct TestFilesWatcher {
    watches: HashMap<PathBuf, RecommendedWatcher>,
    tx: channel::Sender<FileChange>,
    rx: channel::Receiver<FileChange>,
}

impl Default for TestFilesWatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl TestFilesWatcher {
    pub fn new() -> Self {
        let (tx, rx) = channel::unbounded();
        Self {
            watches: HashMap::new(),
            tx,
            rx,
        }
    }

    /// Watch a single file for changes.
    ///
    /// Returns `false` when `path` is empty, already watched, or its parent directory does not
    /// exist.
    pub fn watch(&mut self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        if path.as_os_str().is_empty() || self.is_watching(path) {
            return false;
        }
        let (Some(dir), Some(file_name)) = (path.parent(), path.file_name()) else {
            return false;
        };
        // `foo.js` has an empty parent: watch the current directory.
        let dir = if dir.as_os_str().is_empty() {
            Path::new(".")
        } else {
            dir
        };
        if !dir.is_dir() {
            return false;
        }

        let scope = WatchScope::File {
            file_name: file_name.to_os_string(),
        };
        self.register(path, dir, scope, RecursiveMode::NonRecursive)
    }

    /// Watch a directory recursively for changes and renames.
    ///
    /// Returns `false` when `path` is empty, already watched, or not an existing directory.
    pub fn watch_tree(&mut self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        if path.as_os_str().is_empty() || self.is_watching(path) || !path.is_dir() {
            return false;
        }
        self.register(path, path, WatchScope::Tree, RecursiveMode::Recursive)
    }

    /// Stop watching `path`. Unknown paths are ignored.
    pub fn unwatch(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        if self.watches.remove(&watch_key(path, CASE_INSENSITIVE_PATHS)).is_some() {
            tracing::debug!(target: TRACE_TARGET, path = %path.display(), "stopped watching");
        }
    }

    pub fn is_watching(&self, path: impl AsRef<Path>) -> bool {
        self.watches
            .contains_key(&watch_key(path.as_ref(), CASE_INSENSITIVE_PATHS))
    }

    pub fn receiver(&self) -> &channel::Receiver<FileChange> {
        &self.rx
    }

    fn register(
        &mut self,
        requested: &Path,
        target: &Path,
        scope: WatchScope,
        mode: RecursiveMode,
    ) -> bool {
        let tx = self.tx.clone();
        let callback_scope = scope.clone();
        let watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) => {
                    for change in classify(&callback_scope, event) {
                        // The receiver lives as long as the watcher that owns this callback.
                        let _ = tx.send(change);
                    }
                }
                Err(err) => {
                    tracing::warn!(target: TRACE_TARGET, error = %err, "file watcher error");
                }
            }
        });

        let mut watcher = match watcher {
            Ok(watcher) => watcher,
            Err(err) => {
                tracing::warn!(target: TRACE_TARGET, error = %err, "failed to create file watcher");
                return false;
            }
        };
        if let Err(err) = watcher.watch(target, mode) {
            tracing::warn!(
                target: TRACE_TARGET,
                path = %target.display(),
                error = %err,
                "failed to register watch"
            );
            return false;
        }

        tracing::debug!(
            target: TRACE_TARGET,
            path = %requested.display(),
            scope = ?scope,
            "watching"
        );
        self.watches
            .insert(watch_key(requested, CASE_INSENSITIVE_PATHS), watcher);
        true
    }
}

fn watch_key(path: &Path, fold_case: bool) -> PathBuf {
    if fold_case {
        PathBuf::from(path.to_string_lossy().to_lowercase())
    } else {
        path.to_path_buf()
    }
}

/// Map one backend event onto the changes a registration reports.
fn classify(scope: &WatchScope, event: notify::Event) -> Vec<FileChange> {
    let reason = match event.kind {
        EventKind::Modify(ModifyKind::Name(_)) => FileChangeReason::Renamed,
        EventKind::Modify(_) | EventKind::Any => FileChangeReason::Changed,
        _ => return Vec::new(),
    };

    match scope {
        WatchScope::File { file_name } => {
            if reason != FileChangeReason::Changed {
                return Vec::new();
            }
            event
                .paths
                .into_iter()
                .filter(|path| {
                    path.file_name().is_some_and(|name| {
                        watch_key(Path::new(name), CASE_INSENSITIVE_PATHS)
                            == watch_key(Path::new(file_name), CASE_INSENSITIVE_PATHS)
                    })
                })
                .map(|path| FileChange {
                    path,
                    reason: FileChangeReason::Changed,
                })
                .collect()
        }
        WatchScope::Tree => {
            let paths = match event.kind {
                // Report the new name only.
                EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Vec::new(),
                EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                    event.paths.into_iter().skip(1).collect()
                }
                _ => event.paths,
            };
            paths
                .into_iter()
                .map(|path| FileChange { path, reason })
                .collect()
        }
    }
}
