// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Configuration management.
//!
//! Translates the filesystem state of a priority-ordered list of
//! sources into the in-memory set of job classes, transactionally per
//! source, and keeps it up to date from watch events. A reload toggles
//! the source's epoch flag; files still carrying the old flag after the
//! pass did not survive the scan and are dropped.

use crate::watch::{walk_files, DirWatcher, WatchEvent, WatchFilter, WatchKind};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tend_core::JobClass;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, warn};

/// Canonical job/config file extension.
pub const EXT_STD: &str = "conf";

/// Extension of override files that mutate an already-loaded definition.
pub const EXT_OVERRIDE: &str = "override";

/// What a source's path points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// A single configuration file; the watch is on its parent.
    File,
    /// A directory of plain configuration files (no job payloads).
    Dir,
    /// A directory tree of job definitions.
    JobDir,
}

/// Receives ownership changes of job classes as sources reload.
///
/// Implemented by the lifecycle engine; a dropped class with a live
/// instance becomes a tombstone there.
pub trait ClassLifecycle {
    fn class_removed(&mut self, class: &Arc<JobClass>);
}

#[derive(Debug, Error)]
pub enum ConfError {
    #[error("{path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
}

impl ConfError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io { path: path.to_path_buf(), source }
    }

    pub fn is_not_found(&self) -> bool {
        let ConfError::Io { source, .. } = self;
        source.kind() == std::io::ErrorKind::NotFound
    }
}

/// A file known to a source; carries a job class when the source is a
/// job directory and the file currently parses.
#[derive(Debug)]
pub struct ConfFile {
    pub path: PathBuf,
    flag: bool,
    pub job: Option<Arc<JobClass>>,
}

/// A priority-ranked filesystem location supplying configuration.
pub struct ConfSource {
    pub path: PathBuf,
    pub kind: SourceKind,
    flag: bool,
    files: HashMap<PathBuf, ConfFile>,
    watch: Option<DirWatcher>,
}

impl ConfSource {
    fn new(path: PathBuf, kind: SourceKind) -> Self {
        Self { path, kind, flag: false, files: HashMap::new(), watch: None }
    }

    /// Directory the watcher is (or would be) registered on.
    fn watch_root(&self) -> PathBuf {
        match self.kind {
            SourceKind::File => {
                self.path.parent().map(Path::to_path_buf).unwrap_or_else(|| self.path.clone())
            }
            SourceKind::Dir | SourceKind::JobDir => self.path.clone(),
        }
    }

    fn filter(&self) -> WatchFilter {
        match self.kind {
            SourceKind::File => {
                let source_path = self.path.clone();
                let root = self.watch_root();
                Arc::new(move |path: &Path, _is_dir| path == source_path || path == root)
            }
            SourceKind::Dir | SourceKind::JobDir => Arc::new(|path: &Path, is_dir| {
                if is_ignored(path) {
                    return false;
                }
                is_dir || is_conf_file(path)
            }),
        }
    }

    pub fn file(&self, path: &Path) -> Option<&ConfFile> {
        self.files.get(path)
    }

    pub fn files(&self) -> impl Iterator<Item = &ConfFile> {
        self.files.values()
    }

    #[cfg(test)]
    pub(crate) fn flag(&self) -> bool {
        self.flag
    }
}

/// The priority-ordered list of configuration sources. The first
/// source holding a class of a given name is authoritative for it.
pub struct ConfManager {
    sources: Vec<ConfSource>,
    watch_tx: UnboundedSender<WatchEvent>,
}

impl ConfManager {
    pub fn new(watch_tx: UnboundedSender<WatchEvent>) -> Self {
        Self { sources: Vec::new(), watch_tx }
    }

    /// Append a source; order of addition defines priority.
    pub fn add_source(&mut self, path: impl Into<PathBuf>, kind: SourceKind) {
        self.sources.push(ConfSource::new(path.into(), kind));
    }

    pub fn sources(&self) -> &[ConfSource] {
        &self.sources
    }

    /// Reload every source. Errors are logged, not returned: partial
    /// configuration is better than none.
    pub fn reload(&mut self, sink: &mut dyn ClassLifecycle) {
        for idx in 0..self.sources.len() {
            if let Err(err) = self.reload_source(idx, sink) {
                if !err.is_not_found() {
                    error!(source = %self.sources[idx].path.display(), %err,
                        "unable to load configuration");
                }
            }
        }
    }

    /// Reload one source: toggle the epoch flag, rescan, then drop
    /// every file that did not survive the scan.
    pub fn reload_source(
        &mut self,
        idx: usize,
        sink: &mut dyn ClassLifecycle,
    ) -> Result<(), ConfError> {
        info!(source = %self.sources[idx].path.display(), "loading configuration");
        self.sources[idx].flag = !self.sources[idx].flag;

        let result = match self.sources[idx].kind {
            SourceKind::File => self.reload_file_source(idx, sink),
            SourceKind::Dir | SourceKind::JobDir => self.reload_dir_source(idx, sink),
        };

        // Sweep: anything still carrying the previous epoch is gone.
        let source = &mut self.sources[idx];
        let flag = source.flag;
        let stale: Vec<PathBuf> = source
            .files
            .values()
            .filter(|file| file.flag != flag)
            .map(|file| file.path.clone())
            .collect();
        for path in stale {
            info!(path = %path.display(), "handling deletion");
            self.unlink_file(idx, &path, sink);
        }

        result
    }

    fn reload_file_source(
        &mut self,
        idx: usize,
        sink: &mut dyn ClassLifecycle,
    ) -> Result<(), ConfError> {
        self.ensure_watch(idx, false);

        let path = self.sources[idx].path.clone();
        self.reload_path(idx, &path, None, sink)?;

        if is_conf_file_std(&path) {
            if let Some(override_path) = toggle_conf_name(&path) {
                if override_path.is_file() {
                    debug!(path = %path.display(), from = %override_path.display(),
                        "updating configuration from override");
                    self.reload_path(idx, &path, Some(&override_path), sink)?;
                }
            }
        }
        Ok(())
    }

    fn reload_dir_source(
        &mut self,
        idx: usize,
        sink: &mut dyn ClassLifecycle,
    ) -> Result<(), ConfError> {
        self.ensure_watch(idx, true);

        let root = self.sources[idx].path.clone();
        if !root.is_dir() {
            return Err(ConfError::io(
                &root,
                std::io::Error::new(std::io::ErrorKind::NotFound, "no such directory"),
            ));
        }

        // Two passes so override application never depends on directory
        // enumeration order: all base files first, then all overrides.
        let filter = self.sources[idx].filter();
        let files = walk_files(&root, true, &filter);

        for path in files.iter().filter(|p| is_conf_file_std(p)) {
            if let Err(err) = self.reload_path(idx, path, None, sink) {
                error!(path = %path.display(), %err, "error while loading configuration file");
            }
        }
        for path in files.iter().filter(|p| is_conf_file_override(p)) {
            let Some(base) = toggle_conf_name(path) else { continue };
            if self.sources[idx].files.contains_key(&base) {
                if let Err(err) = self.reload_path(idx, &base, Some(path), sink) {
                    error!(path = %base.display(), %err, "error while reloading configuration file");
                }
            } else {
                debug!(path = %path.display(), "ignoring orphan override file");
            }
        }
        Ok(())
    }

    fn ensure_watch(&mut self, idx: usize, recursive: bool) {
        if self.sources[idx].watch.is_some() {
            return;
        }
        let root = self.sources[idx].watch_root();
        let filter = self.sources[idx].filter();
        match DirWatcher::new(&root, recursive, filter, self.watch_tx.clone(), idx) {
            Ok(watch) => self.sources[idx].watch = Some(watch),
            Err(err) => {
                // Not fatal: the one-shot walk substitutes, further
                // reloads for this source need an explicit reload.
                warn!(source = %self.sources[idx].path.display(), %err,
                    "unable to watch configuration source");
            }
        }
    }

    /// Handle one watch notification.
    pub fn handle_watch_event(&mut self, event: WatchEvent, sink: &mut dyn ClassLifecycle) {
        if event.source >= self.sources.len() {
            return;
        }
        match event.kind {
            WatchKind::Create | WatchKind::Modify => {
                self.handle_create_modify(event.source, &event.path, sink);
            }
            WatchKind::Delete => self.handle_delete(event.source, &event.path, sink),
        }
    }

    /// A file appeared or changed. Partial writes are expected: parse
    /// failures keep the file in memory without a payload.
    fn handle_create_modify(&mut self, idx: usize, path: &Path, sink: &mut dyn ClassLifecycle) {
        // Symbolic links and special files are ignored.
        if !path.is_file() {
            return;
        }

        if is_conf_file_override(path) {
            let Some(base) = toggle_conf_name(path) else { return };
            if !self.sources[idx].files.contains_key(&base) {
                debug!(path = %path.display(), "ignoring orphan override file");
                return;
            }
            // Reload the base first to discard previous override
            // effects, then layer the override.
            debug!(path = %base.display(), "loading configuration file");
            if let Err(err) = self.reload_path(idx, &base, None, sink) {
                error!(path = %base.display(), %err, "error while loading configuration file");
                self.unlink_file(idx, &base, sink);
                return;
            }
            debug!(path = %path.display(), base = %base.display(), "loading override file");
            if let Err(err) = self.reload_path(idx, &base, Some(path), sink) {
                error!(path = %path.display(), %err, "error while loading configuration file");
                self.unlink_file(idx, &base, sink);
            }
        } else {
            debug!(path = %path.display(), "loading configuration file");
            if let Err(err) = self.reload_path(idx, path, None, sink) {
                error!(path = %path.display(), %err, "error while loading configuration file");
                self.unlink_file(idx, path, sink);
                return;
            }
            if is_conf_file_std(path) {
                if let Some(override_path) = toggle_conf_name(path) {
                    if override_path.is_file() {
                        debug!(path = %override_path.display(), base = %path.display(),
                            "loading override file");
                        if let Err(err) = self.reload_path(idx, path, Some(&override_path), sink) {
                            error!(path = %override_path.display(), %err,
                                "error while loading configuration file");
                            self.unlink_file(idx, path, sink);
                        }
                    }
                }
            }
        }
    }

    /// A file went away (or the watch root itself did).
    fn handle_delete(&mut self, idx: usize, path: &Path, sink: &mut dyn ClassLifecycle) {
        let known = self.sources[idx].files.contains_key(path);

        if !known && !is_conf_file_override(path) {
            // Unparsed path: the top-level directory itself may be
            // gone, in which case the watch is dropped for good.
            if path == self.sources[idx].watch_root() || path == self.sources[idx].path {
                warn!(source = %self.sources[idx].path.display(), "configuration directory deleted");
                self.sources[idx].watch = None;
            }
            return;
        }

        if !is_conf_file_override(path) {
            self.unlink_file(idx, path, sink);
            return;
        }

        // An override went away: reload the sibling base file to revert
        // the merged state.
        let Some(base) = toggle_conf_name(path) else { return };
        if self.sources[idx].files.contains_key(&base) {
            debug!(base = %base.display(), path = %path.display(),
                "reloading configuration on deletion of override");
            if let Err(err) = self.reload_path(idx, &base, None, sink) {
                warn!(path = %base.display(), %err,
                    "unable to reload configuration after override deletion");
            }
        }
    }

    /// Parse the file at `path` in the context of source `idx`,
    /// layering `override_path` on top when given.
    ///
    /// Physical I/O errors are returned; parse errors are logged with
    /// path and line and leave the file payload-less.
    fn reload_path(
        &mut self,
        idx: usize,
        path: &Path,
        override_path: Option<&Path>,
        sink: &mut dyn ClassLifecycle,
    ) -> Result<(), ConfError> {
        // Without an override in play the old entry is discarded
        // outright; with one, the existing entry is updated.
        if override_path.is_none() && self.sources[idx].files.contains_key(path) {
            self.unlink_file(idx, path, sink);
        }

        let content =
            std::fs::read_to_string(path).map_err(|err| ConfError::io(path, err))?;
        let override_content = match override_path {
            Some(ov) => {
                Some(std::fs::read_to_string(ov).map_err(|err| ConfError::io(ov, err))?)
            }
            None => None,
        };

        let source = &mut self.sources[idx];
        let flag = source.flag;
        let kind = source.kind;
        let name = job_name(&source.path, path);
        let file = source
            .files
            .entry(path.to_path_buf())
            .or_insert_with(|| ConfFile { path: path.to_path_buf(), flag, job: None });
        file.flag = flag;

        if kind != SourceKind::JobDir {
            // Plain configuration carries no payload.
            return Ok(());
        }
        let parsed = match &override_content {
            Some(over) => {
                debug!(job = %name, path = %path.display(), "updating job definition");
                tend_jobdef::parse_job_with_override(&name, path, &content, over)
            }
            None => {
                debug!(job = %name, path = %path.display(), "loading job definition");
                tend_jobdef::parse_job(&name, path, &content)
            }
        };

        match parsed {
            Ok(class) => {
                let old = file.job.replace(Arc::new(class));
                if let Some(old) = old {
                    old.mark_deleted();
                    sink.class_removed(&old);
                }
            }
            Err(err) => {
                let loaded = override_path.unwrap_or(path);
                match err.line() {
                    Some(line) => {
                        error!("{}:{}: {}", loaded.display(), line, err);
                    }
                    None => error!("{}: {}", loaded.display(), err),
                }
                if let Some(old) = file.job.take() {
                    old.mark_deleted();
                    sink.class_removed(&old);
                }
            }
        }
        Ok(())
    }

    /// Remove a file from its source, handing any payload to the sink.
    fn unlink_file(&mut self, idx: usize, path: &Path, sink: &mut dyn ClassLifecycle) {
        if let Some(file) = self.sources[idx].files.remove(path) {
            if let Some(class) = file.job {
                // Marked for deletion in case a live instance keeps it
                // alive as a tombstone.
                class.mark_deleted();
                sink.class_removed(&class);
            }
        }
    }

    /// Select the authoritative class for `name`: the first source in
    /// priority order currently holding a parsed class of that name.
    pub fn select_job(&self, name: &str) -> Option<Arc<JobClass>> {
        for source in &self.sources {
            if source.kind != SourceKind::JobDir {
                continue;
            }
            for file in source.files.values() {
                if let Some(job) = &file.job {
                    if job.name == name {
                        return Some(Arc::clone(job));
                    }
                }
            }
        }
        None
    }

    /// All job names currently known to any source.
    pub fn job_names(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        for source in &self.sources {
            for file in source.files.values() {
                if let Some(job) = &file.job {
                    names.insert(job.name.clone());
                }
            }
        }
        names
    }
}

/// Derive a job name from its path: relative to the source root, minus
/// the extension, directory separators preserved.
fn job_name(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let mut name = relative.to_string_lossy().into_owned();
    if let Some(stripped) = name
        .strip_suffix(&format!(".{EXT_STD}"))
        .or_else(|| name.strip_suffix(&format!(".{EXT_OVERRIDE}")))
    {
        name = stripped.to_string();
    }
    name.trim_start_matches('/').to_string()
}

fn extension(path: &Path) -> Option<&str> {
    path.extension().and_then(|ext| ext.to_str())
}

pub(crate) fn is_conf_file_std(path: &Path) -> bool {
    extension(path) == Some(EXT_STD)
}

pub(crate) fn is_conf_file_override(path: &Path) -> bool {
    extension(path) == Some(EXT_OVERRIDE)
}

/// A recognized configuration file: `.conf` or `.override` with a
/// non-empty stem.
pub(crate) fn is_conf_file(path: &Path) -> bool {
    (is_conf_file_std(path) || is_conf_file_override(path))
        && path.file_stem().is_some_and(|stem| !stem.is_empty())
}

/// Convert a configuration file name to its override sibling and vice
/// versa: `foo.conf` ↔ `foo.override`.
pub(crate) fn toggle_conf_name(path: &Path) -> Option<PathBuf> {
    if is_conf_file_std(path) {
        Some(path.with_extension(EXT_OVERRIDE))
    } else if is_conf_file_override(path) {
        Some(path.with_extension(EXT_STD))
    } else {
        None
    }
}

/// Editor leavings and hidden files are never configuration.
pub(crate) fn is_ignored(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else { return true };
    name.starts_with('.') || name.ends_with('~') || name.ends_with(".swp") || name.ends_with(".swx")
}

#[cfg(test)]
#[path = "conf_tests.rs"]
mod tests;
