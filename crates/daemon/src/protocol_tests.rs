// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    ping = { Request::Ping },
    list = { Request::List },
    start = { Request::Start { name: "svc".into() } },
    stop = { Request::Stop { name: "net/dns".into() } },
    status = { Request::Status { name: "svc".into() } },
    reload = { Request::Reload },
)]
fn request_round_trips(request: Request) {
    let json = serde_json::to_string(&request).unwrap();
    let back: Request = serde_json::from_str(&json).unwrap();
    assert_eq!(request, back);
}

#[test]
fn emit_round_trips_with_args_and_env() {
    let request = Request::Emit {
        name: "runlevel".into(),
        args: vec!["2".into()],
        env: vec![("PREVLEVEL".into(), "N".into())],
    };
    let json = serde_json::to_string(&request).unwrap();
    let back: Request = serde_json::from_str(&json).unwrap();
    assert_eq!(request, back);
}

#[test]
fn emit_defaults_empty_args() {
    let request: Request = serde_json::from_str(r#"{"type":"emit","name":"startup"}"#).unwrap();
    assert_eq!(request, Request::Emit { name: "startup".into(), args: vec![], env: vec![] });
}

#[test]
fn request_tag_is_snake_case() {
    let json = serde_json::to_string(&Request::Start { name: "svc".into() }).unwrap();
    assert!(json.contains(r#""type":"start""#));
}

#[test]
fn job_summary_round_trips() {
    let response = Response::Job {
        job: JobSummary {
            name: "svc".into(),
            goal: tend_core::Goal::Start,
            state: tend_core::JobState::Running,
            pid: Some(4242),
        },
    };
    let json = serde_json::to_string(&response).unwrap();
    assert!(json.contains(r#""state":"running""#));
    let back: Response = serde_json::from_str(&json).unwrap();
    assert_eq!(response, back);
}

#[test]
fn absent_pid_is_omitted() {
    let summary = JobSummary {
        name: "svc".into(),
        goal: tend_core::Goal::Stop,
        state: tend_core::JobState::Waiting,
        pid: None,
    };
    let json = serde_json::to_string(&summary).unwrap();
    assert!(!json.contains("pid"));
}

#[test]
fn unknown_request_type_is_an_error() {
    let result: Result<Request, _> = serde_json::from_str(r#"{"type":"frobnicate"}"#);
    assert!(result.is_err());
}
