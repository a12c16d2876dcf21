// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Raw stanza structures deserialized from job files.
//!
//! Every field is optional so that an override file can be parsed with
//! the same types and merged stanza-by-stanza onto a base definition.

use serde::Deserialize;
use std::collections::BTreeMap;

/// The raw stanzas of a job file before validation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobStanzas {
    pub description: Option<String>,
    pub start_on: Option<Vec<String>>,
    pub stop_on: Option<Vec<String>>,
    pub emits: Option<Vec<String>>,

    /// Main process as a single command line.
    pub exec: Option<String>,
    /// Main process as a verbatim shell script.
    pub script: Option<String>,

    #[serde(rename = "pre-start")]
    pub pre_start: Option<ProcessStanza>,
    #[serde(rename = "post-stop")]
    pub post_stop: Option<ProcessStanza>,

    pub respawn: Option<RespawnStanza>,
    pub normal_exit: Option<Vec<i32>>,
    pub kill_timeout: Option<u64>,

    pub daemon: Option<bool>,
    pub pidfile: Option<String>,
    pub pid_timeout: Option<u64>,

    pub console: Option<String>,
    /// Octal string, e.g. `"022"`.
    pub umask: Option<String>,
    pub nice: Option<i64>,
    pub chdir: Option<String>,
    pub env: Option<BTreeMap<String, String>>,
    pub limits: Option<BTreeMap<String, [LimitValue; 2]>>,
}

/// An auxiliary process descriptor (`[pre-start]`, `[post-stop]`, or
/// the action half of a `[respawn]` table).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProcessStanza {
    pub exec: Option<String>,
    pub script: Option<String>,
}

/// `respawn = true` or a detailed `[respawn]` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RespawnStanza {
    Enabled(bool),
    Detailed(RespawnTable),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RespawnTable {
    pub enabled: Option<bool>,
    /// Respawns allowed within `interval` seconds.
    pub limit: Option<u32>,
    pub interval: Option<u64>,
    pub exec: Option<String>,
    pub script: Option<String>,
}

/// A limit value: a number or the word `"unlimited"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LimitValue {
    Num(u64),
    Word(String),
}

impl JobStanzas {
    /// Layer an override's stanzas on top of this definition.
    ///
    /// Each stanza present in the override replaces the base stanza
    /// wholesale; absent stanzas leave the base untouched. A main
    /// process given in one form clears the other form so an override
    /// can switch between `exec` and `script`.
    pub fn merge(&mut self, over: JobStanzas) {
        if over.exec.is_some() {
            self.exec = over.exec;
            self.script = None;
        }
        if over.script.is_some() {
            self.script = over.script;
            self.exec = None;
        }

        merge_field(&mut self.description, over.description);
        merge_field(&mut self.start_on, over.start_on);
        merge_field(&mut self.stop_on, over.stop_on);
        merge_field(&mut self.emits, over.emits);
        merge_field(&mut self.pre_start, over.pre_start);
        merge_field(&mut self.post_stop, over.post_stop);
        merge_field(&mut self.respawn, over.respawn);
        merge_field(&mut self.normal_exit, over.normal_exit);
        merge_field(&mut self.kill_timeout, over.kill_timeout);
        merge_field(&mut self.daemon, over.daemon);
        merge_field(&mut self.pidfile, over.pidfile);
        merge_field(&mut self.pid_timeout, over.pid_timeout);
        merge_field(&mut self.console, over.console);
        merge_field(&mut self.umask, over.umask);
        merge_field(&mut self.nice, over.nice);
        merge_field(&mut self.chdir, over.chdir);
        merge_field(&mut self.env, over.env);
        merge_field(&mut self.limits, over.limits);
    }
}

fn merge_field<T>(base: &mut Option<T>, over: Option<T>) {
    if over.is_some() {
        *base = over;
    }
}
