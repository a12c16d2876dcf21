// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Validation of raw stanzas into a [`JobClass`].

use crate::stanza::{JobStanzas, LimitValue, ProcessStanza, RespawnStanza};
use std::path::Path;
use std::time::Duration;
use tend_core::{
    ConsoleMode, JobClass, ProcessAction, ProcessKind, ResourceKind, ResourceLimit, RespawnPolicy,
};
use thiserror::Error;

/// Errors that can occur while parsing a job file.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("{message}")]
    Toml { line: Option<usize>, message: String },

    #[error("{stanza} defines both exec and script")]
    AmbiguousProcess { stanza: &'static str },

    #[error("illegal umask: {value}")]
    IllegalUmask { value: String },

    #[error("illegal nice value: {value}")]
    IllegalNice { value: i64 },

    #[error("illegal limit for {resource}: {message}")]
    IllegalLimit { resource: String, message: String },

    #[error("illegal console mode: {value}")]
    IllegalConsole { value: String },

    #[error("illegal respawn interval: {value}")]
    IllegalInterval { value: u64 },
}

impl ParseError {
    /// Line number of the failure when the underlying parser knows it.
    pub fn line(&self) -> Option<usize> {
        match self {
            ParseError::Toml { line, .. } => *line,
            _ => None,
        }
    }
}

/// Parse a job file into a [`JobClass`] named `name`.
pub fn parse_job(name: &str, path: &Path, content: &str) -> Result<JobClass, ParseError> {
    build(name, path, parse_stanzas(content)?)
}

/// Parse a job file and layer an override file on top.
///
/// The base file defines identity and provides defaults; override
/// stanzas mutate fields only.
pub fn parse_job_with_override(
    name: &str,
    path: &Path,
    content: &str,
    override_content: &str,
) -> Result<JobClass, ParseError> {
    let mut stanzas = parse_stanzas(content)?;
    stanzas.merge(parse_stanzas(override_content)?);
    build(name, path, stanzas)
}

fn parse_stanzas(content: &str) -> Result<JobStanzas, ParseError> {
    toml::from_str(content).map_err(|err| ParseError::Toml {
        line: err.span().map(|span| line_of(content, span.start)),
        message: err.message().to_string(),
    })
}

fn line_of(content: &str, byte: usize) -> usize {
    let upto = byte.min(content.len());
    content[..upto].bytes().filter(|b| *b == b'\n').count() + 1
}

fn build(name: &str, path: &Path, stanzas: JobStanzas) -> Result<JobClass, ParseError> {
    let mut class = JobClass::new(name, path);

    class.description = stanzas.description;
    class.start_on = stanzas.start_on.unwrap_or_default();
    class.stop_on = stanzas.stop_on.unwrap_or_default();
    class.emits = stanzas.emits.unwrap_or_default();

    class.set_process(
        ProcessKind::Main,
        main_action("job", stanzas.exec, stanzas.script)?,
    );
    class.set_process(ProcessKind::PreStart, aux_action("pre-start", stanzas.pre_start)?);
    class.set_process(ProcessKind::PostStop, aux_action("post-stop", stanzas.post_stop)?);

    let mut respawn = RespawnPolicy::default();
    match stanzas.respawn {
        Some(RespawnStanza::Enabled(enabled)) => respawn.respawn = enabled,
        Some(RespawnStanza::Detailed(table)) => {
            respawn.respawn = table.enabled.unwrap_or(true);
            if let Some(limit) = table.limit {
                respawn.limit = limit;
            }
            if let Some(interval) = table.interval {
                if interval == 0 {
                    return Err(ParseError::IllegalInterval { value: interval });
                }
                respawn.interval = Duration::from_secs(interval);
            }
            class.set_process(
                ProcessKind::Respawn,
                main_action("respawn", table.exec, table.script)?,
            );
        }
        None => {}
    }
    if let Some(statuses) = stanzas.normal_exit {
        respawn.normal_exit = statuses.into_iter().collect();
    }
    class.respawn = respawn;

    if let Some(secs) = stanzas.kill_timeout {
        class.kill_timeout = Duration::from_secs(secs);
    }
    class.daemon = stanzas.daemon.unwrap_or(false);
    class.pidfile = stanzas.pidfile.map(Into::into);
    if let Some(secs) = stanzas.pid_timeout {
        class.pid_timeout = Duration::from_secs(secs);
    }

    if let Some(mode) = stanzas.console {
        class.exec.console = parse_console(&mode)?;
    }
    if let Some(umask) = stanzas.umask {
        class.exec.umask = parse_umask(&umask)?;
    }
    if let Some(nice) = stanzas.nice {
        if !(-20..=19).contains(&nice) {
            return Err(ParseError::IllegalNice { value: nice });
        }
        class.exec.nice = Some(nice as i8);
    }
    class.exec.working_dir = stanzas.chdir.map(Into::into);
    if let Some(env) = stanzas.env {
        class.exec.env = env.into_iter().collect();
    }
    if let Some(limits) = stanzas.limits {
        let mut parsed = Vec::with_capacity(limits.len());
        for (resource, [soft, hard]) in limits {
            let kind = parse_resource(&resource)?;
            parsed.push(ResourceLimit {
                resource: kind,
                soft: parse_limit_value(&resource, soft)?,
                hard: parse_limit_value(&resource, hard)?,
            });
        }
        class.exec.limits = parsed;
    }

    Ok(class)
}

fn main_action(
    stanza: &'static str,
    exec: Option<String>,
    script: Option<String>,
) -> Result<Option<ProcessAction>, ParseError> {
    match (exec, script) {
        (Some(_), Some(_)) => Err(ParseError::AmbiguousProcess { stanza }),
        (Some(command), None) => Ok(Some(ProcessAction::Command(command))),
        (None, Some(script)) => Ok(Some(ProcessAction::Script(script))),
        (None, None) => Ok(None),
    }
}

fn aux_action(
    stanza: &'static str,
    raw: Option<ProcessStanza>,
) -> Result<Option<ProcessAction>, ParseError> {
    match raw {
        Some(p) => main_action(stanza, p.exec, p.script),
        None => Ok(None),
    }
}

fn parse_console(value: &str) -> Result<ConsoleMode, ParseError> {
    match value {
        "none" => Ok(ConsoleMode::None),
        "output" => Ok(ConsoleMode::Output),
        "owner" => Ok(ConsoleMode::Owner),
        other => Err(ParseError::IllegalConsole { value: other.to_string() }),
    }
}

fn parse_umask(value: &str) -> Result<u32, ParseError> {
    let mask = u32::from_str_radix(value, 8)
        .map_err(|_| ParseError::IllegalUmask { value: value.to_string() })?;
    if mask > 0o777 {
        return Err(ParseError::IllegalUmask { value: value.to_string() });
    }
    Ok(mask)
}

fn parse_resource(name: &str) -> Result<ResourceKind, ParseError> {
    match name {
        "as" => Ok(ResourceKind::As),
        "core" => Ok(ResourceKind::Core),
        "cpu" => Ok(ResourceKind::Cpu),
        "data" => Ok(ResourceKind::Data),
        "fsize" => Ok(ResourceKind::Fsize),
        "memlock" => Ok(ResourceKind::Memlock),
        "nofile" => Ok(ResourceKind::Nofile),
        "nproc" => Ok(ResourceKind::Nproc),
        "rss" => Ok(ResourceKind::Rss),
        "stack" => Ok(ResourceKind::Stack),
        other => Err(ParseError::IllegalLimit {
            resource: other.to_string(),
            message: "unknown resource".to_string(),
        }),
    }
}

fn parse_limit_value(resource: &str, value: LimitValue) -> Result<Option<u64>, ParseError> {
    match value {
        LimitValue::Num(n) => Ok(Some(n)),
        LimitValue::Word(word) if word == "unlimited" => Ok(None),
        LimitValue::Word(word) => Err(ParseError::IllegalLimit {
            resource: resource.to_string(),
            message: format!("expected a number or \"unlimited\", got \"{word}\""),
        }),
    }
}

#[cfg(test)]
#[path = "parser_tests.rs"]
mod tests;
