mod support;

use std::time::Duration;

use serde_json::json;

use dbsadmin::envelope::CODE_ALREADY_RUNNING;
use dbsadmin::orchestrator::{DRAIN_POLL_ATTEMPTS, Orchestrator};
use dbsadmin::session::{self, LoginOptions};
use support::{FakeTransport, ScriptedPrompt};

const ENDPOINT: &str = "http://127.0.0.1:16001";

fn login(transport: &FakeTransport) -> dbsadmin::session::Session<'_> {
    let mut prompt = ScriptedPrompt::default();
    let options = LoginOptions::new(Some("admin".into()), Some("pw".into()), None);
    session::login(transport, ENDPOINT, &mut prompt, &options).unwrap()
}

fn two_normal_databases() -> serde_json::Value {
    json!({
        "totalDBCount": 2,
        "databases": [
            support::database_json(1, "Sales.fmp12", "NORMAL"),
            support::database_json(2, "HR.fmp12", "NORMAL"),
        ],
    })
}

/// Full stop sequence with two hosted databases and no clients:
/// disconnect pass, one close per database, drain poll, status flip.
#[test]
fn stop_closes_everything_then_flips_the_status() {
    let transport = FakeTransport::new(|call, _| {
        if support::is_login(call) {
            return support::login_ok();
        }
        if call.method == "GET" && call.url.ends_with("/clients") {
            return support::ok_envelope(json!({"clients": []}));
        }
        if call.method == "GET" && call.url.ends_with("/databases") {
            // The server reports both files CLOSED promptly, so the drain
            // poll converges on its first probe.
            return support::ok_envelope(json!({
                "totalDBCount": 2,
                "databases": [
                    support::database_json(1, "Sales.fmp12", "NORMAL"),
                    support::database_json(2, "HR.fmp12", "NORMAL"),
                ],
            }));
        }
        support::ok_envelope(json!({}))
    });
    let session = login(&transport);
    let mut out = Vec::new();
    let code = Orchestrator::new(&session, &mut out)
        .with_poll_interval(Duration::ZERO)
        .stop_server("Stopping the database engine...", 90);

    assert_eq!(code, 0);
    assert_eq!(transport.count("PATCH", "/databases/1"), 1);
    assert_eq!(transport.count("PATCH", "/databases/2"), 1);
    assert_eq!(transport.count("PATCH", "/server/status"), 1);

    let calls = transport.calls.borrow();
    let status_call = calls
        .iter()
        .find(|call| call.method == "PATCH" && call.url.ends_with("/server/status"))
        .unwrap();
    assert_eq!(status_call.body.clone().unwrap(), json!({"status": "STOPPED"}));

    // The closes all happened before the status flip.
    let last_close = calls
        .iter()
        .rposition(|call| call.method == "PATCH" && call.url.contains("/databases/"))
        .unwrap();
    let flip = calls
        .iter()
        .position(|call| call.method == "PATCH" && call.url.ends_with("/server/status"))
        .unwrap();
    assert!(last_close < flip);
}

/// A failed close aborts the sequence; the status flip is never issued.
#[test]
fn stop_short_circuits_when_a_close_fails() {
    let transport = FakeTransport::new(|call, _| {
        if support::is_login(call) {
            return support::login_ok();
        }
        if call.method == "GET" && call.url.ends_with("/clients") {
            return support::ok_envelope(json!({"clients": []}));
        }
        if call.method == "GET" && call.url.ends_with("/databases") {
            return support::ok_envelope(two_normal_databases());
        }
        if call.method == "PATCH" && call.url.contains("/databases/") {
            return support::envelope(802, json!({}));
        }
        support::ok_envelope(json!({}))
    });
    let session = login(&transport);
    let mut out = Vec::new();
    let code = Orchestrator::new(&session, &mut out)
        .with_poll_interval(Duration::ZERO)
        .stop_server("Stopping the database engine...", 90);

    assert_eq!(code, 802);
    assert_eq!(transport.count("PATCH", "/databases/1"), 1);
    // The first failure stops the loop and the flip never happens.
    assert_eq!(transport.count("PATCH", "/databases/2"), 0);
    assert_eq!(transport.count("PATCH", "/server/status"), 0);
}

/// A drain poll that never converges stops at its attempt ceiling
/// instead of hanging.
#[test]
fn drain_poll_terminates_at_its_ceiling() {
    let transport = FakeTransport::new(|call, _| {
        if support::is_login(call) {
            return support::login_ok();
        }
        if call.method == "GET" && call.url.ends_with("/clients") {
            return support::ok_envelope(json!({"clients": []}));
        }
        if call.method == "GET" && call.url.ends_with("/databases") {
            // One database stays CLOSING forever.
            return support::ok_envelope(json!({
                "totalDBCount": 1,
                "databases": [support::database_json(1, "Sales.fmp12", "CLOSING")],
            }));
        }
        support::ok_envelope(json!({}))
    });
    let session = login(&transport);
    let mut out = Vec::new();
    let code = Orchestrator::new(&session, &mut out)
        .with_poll_interval(Duration::ZERO)
        .stop_server("Stopping the database engine...", 0);

    assert_eq!(code, 0);
    // One resolve fetch plus exactly the poll ceiling.
    assert_eq!(
        transport.count("GET", "/databases") as u32,
        1 + DRAIN_POLL_ATTEMPTS
    );
    // Still pending is not an error; the status flip proceeds.
    assert_eq!(transport.count("PATCH", "/server/status"), 1);
}

#[test]
fn forced_stop_closes_with_force() {
    let transport = FakeTransport::new(|call, _| {
        if support::is_login(call) {
            return support::login_ok();
        }
        if call.method == "GET" && call.url.ends_with("/clients") {
            return support::ok_envelope(json!({"clients": []}));
        }
        if call.method == "GET" && call.url.ends_with("/databases") {
            return support::ok_envelope(json!({
                "totalDBCount": 1,
                "databases": [support::database_json(1, "Sales.fmp12", "NORMAL")],
            }));
        }
        support::ok_envelope(json!({}))
    });
    let session = login(&transport);
    let mut out = Vec::new();
    // Grace time zero means forced close.
    let code = Orchestrator::new(&session, &mut out)
        .with_poll_interval(Duration::ZERO)
        .stop_server("Stopping the database engine...", 0);
    assert_eq!(code, 0);

    let calls = transport.calls.borrow();
    let close_call = calls
        .iter()
        .find(|call| call.method == "PATCH" && call.url.contains("/databases/"))
        .unwrap();
    assert_eq!(
        close_call.body.clone().unwrap()["force"],
        serde_json::Value::Bool(true)
    );
}

#[test]
fn start_reports_already_running() {
    let transport = FakeTransport::new(|call, _| {
        if support::is_login(call) {
            return support::login_ok();
        }
        if call.method == "GET" && call.url.ends_with("/server/status") {
            return support::ok_envelope(json!({"status": "RUNNING"}));
        }
        support::ok_envelope(json!({}))
    });
    let session = login(&transport);
    let mut out = Vec::new();
    let code = Orchestrator::new(&session, &mut out).start_server();
    assert_eq!(code, CODE_ALREADY_RUNNING);
    assert_eq!(transport.count("PATCH", "/server/status"), 0);
}

#[test]
fn restart_waits_for_stopped_before_starting() {
    let transport = FakeTransport::new(|call, _| {
        if support::is_login(call) {
            return support::login_ok();
        }
        if call.method == "GET" && call.url.ends_with("/clients") {
            return support::ok_envelope(json!({"clients": []}));
        }
        if call.method == "GET" && call.url.ends_with("/databases") {
            return support::ok_envelope(json!({"totalDBCount": 0, "databases": []}));
        }
        if call.method == "GET" && call.url.ends_with("/server/status") {
            return support::ok_envelope(json!({"status": "STOPPED"}));
        }
        support::ok_envelope(json!({}))
    });
    let session = login(&transport);
    let mut out = Vec::new();
    let code = Orchestrator::new(&session, &mut out)
        .with_poll_interval(Duration::ZERO)
        .restart_server("", 90);
    assert_eq!(code, 0);

    let calls = transport.calls.borrow();
    let flips: Vec<_> = calls
        .iter()
        .filter(|call| call.method == "PATCH" && call.url.ends_with("/server/status"))
        .collect();
    assert_eq!(flips.len(), 2);
    assert_eq!(flips[0].body.clone().unwrap(), json!({"status": "STOPPED"}));
    assert_eq!(flips[1].body.clone().unwrap(), json!({"status": "RUNNING"}));

    let stopped_probe = calls
        .iter()
        .position(|call| call.method == "GET" && call.url.ends_with("/server/status"))
        .unwrap();
    let start_flip = calls
        .iter()
        .rposition(|call| call.method == "PATCH" && call.url.ends_with("/server/status"))
        .unwrap();
    assert!(stopped_probe < start_flip);
}

/// The status poll itself is bounded as well.
#[test]
fn wait_until_stopped_respects_the_ceiling() {
    let transport = FakeTransport::new(|call, _| {
        if support::is_login(call) {
            return support::login_ok();
        }
        if call.method == "GET" && call.url.ends_with("/server/status") {
            return support::ok_envelope(json!({"status": "RUNNING"}));
        }
        support::ok_envelope(json!({}))
    });
    let session = login(&transport);
    let mut out = Vec::new();
    let code = Orchestrator::new(&session, &mut out)
        .with_poll_interval(Duration::ZERO)
        .wait_until_stopped();
    assert_eq!(code, 0);
    assert_eq!(
        transport.count("GET", "/server/status") as u32,
        DRAIN_POLL_ATTEMPTS
    );
}
