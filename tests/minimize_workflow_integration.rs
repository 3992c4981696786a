//! Integration tests for the minimize workflow
//!
//! The scripted source process announces itself, acknowledges the wrapped
//! document and answers the minimization query.

mod common;

use common::builders::TestEnvironment;
use common::fake_toolchain::{envelope_from, Reply, ScriptedLauncher};
use common::{teardown_timeout, test_timeout};
use serde_json::{json, Value};
use std::sync::Arc;
use wide_toolchain::protocol::{AddressHop, Direction, Envelope, MessageKind, ProcessRole};
use wide_toolchain::types::MinimizeRequest;
use wide_toolchain::Orchestrator;

fn announce() -> Reply {
    Reply::Send(envelope_from("code", MessageKind::AddressSingle, json!("code")))
}

/// Source process answering the query with `infix`
fn minimizing_source(infix: Value) -> ScriptedLauncher {
    ScriptedLauncher::new()
        .greet(ProcessRole::Source, vec![announce()])
        .on(ProcessRole::Source, move |envelope| match envelope.message_type {
            MessageKind::FileLoadContent => vec![Reply::Send(envelope_from(
                "code.document",
                MessageKind::FileNewAck,
                Value::Null,
            ))],
            MessageKind::TextSelectionQuery => vec![Reply::Send(envelope_from(
                "code.document",
                MessageKind::MinimizedEquation,
                json!({ "infixRep": infix.clone() }),
            ))],
            _ => Vec::new(),
        })
}

fn orchestrator(env: &TestEnvironment, launcher: &ScriptedLauncher) -> Orchestrator {
    Orchestrator::with_launcher(env.config.clone(), Arc::new(launcher.clone()))
}

fn request(content: &str, session_id: &str) -> MinimizeRequest {
    MinimizeRequest {
        content: content.to_string(),
        session_id: Some(session_id.to_string()),
    }
}

#[test]
fn test_minimize_happy_path() {
    let env = TestEnvironment::new();
    let launcher = minimizing_source(json!([[0, "a"]]));
    let orchestrator = orchestrator(&env, &launcher);

    let response = orchestrator
        .submit_minimize(request("y = a & b + a & !b; // simplify", "min-1"))
        .unwrap()
        .wait_timeout(test_timeout())
        .unwrap();

    assert!(response.success, "unexpected failure: {}", response.output);
    assert_eq!(response.session_id, "min-1");
    assert_eq!(response.output, "y = a; // simplify");
    assert!(orchestrator.registry().wait_until_empty(teardown_timeout()));

    assert_eq!(
        launcher.launched(),
        vec![ProcessRole::Source, ProcessRole::Persistence]
    );

    let received = launcher.received();
    let (_, document) = received
        .iter()
        .find(|(_, e)| e.message_type == MessageKind::FileLoadContent)
        .unwrap();
    assert_eq!(
        document.payload["text"],
        json!("input a;\ninput b;\ny = a & b + a & !b; ")
    );

    let (_, query) = received
        .iter()
        .find(|(_, e)| e.message_type == MessageKind::TextSelectionQuery)
        .unwrap();
    assert_eq!(query.payload["lineStart"], json!(2));
    assert_eq!(query.payload["queryType"], json!(1));
}

#[test]
fn test_define_operator_is_preserved() {
    let env = TestEnvironment::new();
    let launcher = minimizing_source(json!([[0, "a"], [1, "+"], [0, "b"]]));
    let orchestrator = orchestrator(&env, &launcher);

    let response = orchestrator.minimize(request("q := a + b + a & b;", "min-define")).unwrap();

    assert!(response.success);
    assert_eq!(response.output, "q := a + b;");
    assert!(orchestrator.registry().wait_until_empty(teardown_timeout()));
}

#[test]
fn test_source_crash_reports_backend_error() {
    let env = TestEnvironment::new();
    let launcher = ScriptedLauncher::new()
        .greet(ProcessRole::Source, vec![announce()])
        .on(ProcessRole::Source, |envelope| match envelope.message_type {
            MessageKind::FileLoadContent => vec![Reply::Exit(Some(2))],
            _ => Vec::new(),
        });
    let orchestrator = orchestrator(&env, &launcher);

    let response = orchestrator.minimize(request("y = a & a;", "min-crash")).unwrap();

    assert!(!response.success);
    assert_eq!(
        response.output,
        "An error occurred in the backend, please check your equation and try again (error code: 2)"
    );
    assert!(orchestrator.registry().wait_until_empty(teardown_timeout()));
}

#[test]
fn test_clean_persistence_exit_is_tolerated() {
    let env = TestEnvironment::new();
    let launcher = minimizing_source(json!([[0, "a"]]))
        .greet(ProcessRole::Persistence, vec![Reply::Exit(Some(0))]);
    let orchestrator = orchestrator(&env, &launcher);

    let response = orchestrator.minimize(request("y = a + a;", "min-save")).unwrap();

    assert!(response.success, "unexpected failure: {}", response.output);
    assert!(orchestrator.registry().wait_until_empty(teardown_timeout()));
}

#[test]
fn test_equation_waits_for_source_announcement() {
    let mut env = TestEnvironment::new();
    env.config.timeouts.progress_timeout_secs = 1;
    // Only the persistence module announces itself
    let launcher = ScriptedLauncher::new().greet(
        ProcessRole::Persistence,
        vec![Reply::Send(envelope_from(
            "utils",
            MessageKind::AddressSingle,
            json!("utils"),
        ))],
    );
    let orchestrator = orchestrator(&env, &launcher);

    let response = orchestrator.minimize(request("y = a;", "min-quiet")).unwrap();

    assert!(!response.success);
    assert_eq!(response.output, "No progress from the toolchain within 1 s");
    assert!(launcher.kinds_sent_to(ProcessRole::Source).is_empty());
    assert!(orchestrator.registry().wait_until_empty(teardown_timeout()));
}

#[test]
fn test_addressed_envelopes_reach_persistence() {
    let env = TestEnvironment::new();
    let save_request = Envelope::new(
        vec![
            AddressHop::new("code.document", 0),
            AddressHop::new("utils.settings", 0),
        ],
        MessageKind::Unrecognized("utils_get_settings".to_string()),
        "none",
        Direction::Request,
        Value::Null,
    );
    let launcher = minimizing_source(json!([[0, "a"]]))
        .greet(ProcessRole::Source, vec![Reply::Send(save_request), announce()]);
    let orchestrator = orchestrator(&env, &launcher);

    let response = orchestrator.minimize(request("y = a;", "min-route")).unwrap();
    assert!(response.success);
    assert!(orchestrator.registry().wait_until_empty(teardown_timeout()));

    assert_eq!(
        launcher.kinds_sent_to(ProcessRole::Persistence).first(),
        Some(&MessageKind::Unrecognized("utils_get_settings".to_string()))
    );
}

#[test]
fn test_malformed_result_is_failure() {
    let env = TestEnvironment::new();
    let launcher = minimizing_source(json!("not a token list"));
    let orchestrator = orchestrator(&env, &launcher);

    let response = orchestrator.minimize(request("y = a & b;", "min-bad")).unwrap();

    assert!(!response.success);
    assert!(response.output.contains("infixRep"));
    assert!(orchestrator.registry().wait_until_empty(teardown_timeout()));
}

#[test]
fn test_invalid_equations_answer_immediately() {
    let env = TestEnvironment::new();
    let launcher = ScriptedLauncher::new();
    let orchestrator = orchestrator(&env, &launcher);

    let response = orchestrator.minimize(MinimizeRequest::new("y = a & b")).unwrap();
    assert!(!response.success);
    assert_eq!(
        response.output,
        "Could not find a semicolon (\";\") at the end of the equation"
    );
    assert!(launcher.launched().is_empty());
}

#[test]
fn test_session_is_released_before_teardown_finishes() {
    let env = TestEnvironment::new();
    // Persistence ignores kills, so teardown runs into the grace period
    let launcher = minimizing_source(json!([[0, "a"]])).hang_on_exit(ProcessRole::Persistence);
    let orchestrator = orchestrator(&env, &launcher);

    let response = orchestrator
        .submit_minimize(request("y = a & b + a & !b;", "min-again"))
        .unwrap()
        .wait_timeout(test_timeout())
        .unwrap();
    assert!(response.success, "unexpected failure: {}", response.output);
    assert!(!orchestrator.registry().is_active("min-again"));

    let retry = orchestrator
        .submit_minimize(request("y = a & b + a & !b;", "min-again"))
        .unwrap();
    let response = retry.wait_timeout(test_timeout()).unwrap();
    assert!(response.success, "unexpected failure: {}", response.output);

    assert!(orchestrator.registry().wait_until_empty(teardown_timeout()));
}
