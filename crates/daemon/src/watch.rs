// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Filesystem watching for configuration sources.
//!
//! Wraps the platform watcher behind a filter predicate and a channel
//! into the main loop. When a watcher cannot be created the caller
//! falls back to a one-shot directory walk; [`walk_files`] provides it.

use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

/// Predicate deciding whether a path is interesting to the source.
pub type WatchFilter = Arc<dyn Fn(&Path, bool) -> bool + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchKind {
    Create,
    Modify,
    Delete,
}

/// One qualifying filesystem change, tagged with its source index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub source: usize,
    pub kind: WatchKind,
    pub path: PathBuf,
}

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("watch failed: {0}")]
    Notify(#[from] notify::Error),
}

/// A live watch on one source's root.
pub struct DirWatcher {
    // Held so the watch stays registered; dropped to stop watching.
    _watcher: notify::RecommendedWatcher,
    root: PathBuf,
}

impl DirWatcher {
    /// Watch `root`, delivering filtered events tagged with `source`
    /// into `tx`. Recursive for job directories, non-recursive for the
    /// parent-directory watch of a single-file source.
    pub fn new(
        root: &Path,
        recursive: bool,
        filter: WatchFilter,
        tx: UnboundedSender<WatchEvent>,
        source: usize,
    ) -> Result<Self, WatchError> {
        let mut watcher =
            notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
                let Ok(event) = res else { return };
                let Some(kind) = map_kind(&event) else { return };
                for path in event.paths {
                    let kind = resolve_rename(kind, &path);
                    let is_dir = path.is_dir();
                    if filter(&path, is_dir) {
                        let _ = tx.send(WatchEvent { source, kind, path });
                    }
                }
            })?;
        let mode = if recursive { RecursiveMode::Recursive } else { RecursiveMode::NonRecursive };
        watcher.watch(root, mode)?;
        Ok(Self { _watcher: watcher, root: root.to_path_buf() })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn map_kind(event: &notify::Event) -> Option<WatchKind> {
    match event.kind {
        EventKind::Create(_) => Some(WatchKind::Create),
        EventKind::Remove(_) => Some(WatchKind::Delete),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Some(WatchKind::Delete),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => Some(WatchKind::Create),
        // Ambiguous rename halves are resolved per path against the
        // filesystem in resolve_rename.
        EventKind::Modify(ModifyKind::Name(_)) => Some(WatchKind::Modify),
        EventKind::Modify(_) => Some(WatchKind::Modify),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => None,
    }
}

fn resolve_rename(kind: WatchKind, path: &Path) -> WatchKind {
    match kind {
        WatchKind::Modify if !path.exists() => WatchKind::Delete,
        other => other,
    }
}

/// Walk a directory for existing files passing `filter`, sorted for
/// deterministic loading. Used for the initial scan and as the fallback
/// when no watcher is available.
pub fn walk_files(root: &Path, recursive: bool, filter: &WatchFilter) -> Vec<PathBuf> {
    let mut files = Vec::new();
    walk_into(root, recursive, filter, &mut files);
    files.sort();
    files
}

fn walk_into(dir: &Path, recursive: bool, filter: &WatchFilter, files: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else { return };
    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else { continue };
        if file_type.is_dir() {
            if recursive && filter(&path, true) {
                walk_into(&path, recursive, filter, files);
            }
        } else if file_type.is_file() && filter(&path, false) {
            files.push(path);
        }
    }
}

#[cfg(test)]
#[path = "watch_tests.rs"]
mod tests;
