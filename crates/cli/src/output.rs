// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plain-text rendering of daemon responses.

use tend_daemon::JobSummary;

/// One line per job: `name goal/state [pid]`, aligned on the name.
pub fn render_jobs(jobs: &[JobSummary]) -> String {
    let width = jobs.iter().map(|job| job.name.len()).max().unwrap_or(0);
    let mut out = String::new();
    for job in jobs {
        out.push_str(&format!("{:width$}  {}\n", job.name, describe(job), width = width));
    }
    out
}

pub fn render_job(job: &JobSummary) -> String {
    format!("{} {}", job.name, describe(job))
}

fn describe(job: &JobSummary) -> String {
    match job.pid {
        Some(pid) => format!("{}/{}, process {}", job.goal, job.state, pid),
        None => format!("{}/{}", job.goal, job.state),
    }
}

/// Split `tend emit` arguments into positional args and KEY=VALUE
/// environment pairs.
pub fn split_event_args(raw: Vec<String>) -> (Vec<String>, Vec<(String, String)>) {
    let mut args = Vec::new();
    let mut env = Vec::new();
    for arg in raw {
        match arg.split_once('=') {
            Some((key, value)) if !key.is_empty() => {
                env.push((key.to_string(), value.to_string()));
            }
            _ => args.push(arg),
        }
    }
    (args, env)
}

#[cfg(test)]
#[path = "output_tests.rs"]
mod tests;
