mod support;

use serde_json::json;

use dbsadmin::envelope::{CODE_ACCESS_DENIED, CODE_HOST_UNREACHABLE, CODE_SESSION_LIMIT};
use dbsadmin::session::{self, AuthMethod, LoginOptions};
use support::{FakeTransport, ScriptedPrompt};

const ENDPOINT: &str = "http://127.0.0.1:16001";

#[test]
fn login_sends_basic_credentials_and_logout_fires_on_drop() {
    let transport = FakeTransport::new(|call, _| {
        if support::is_login(call) {
            support::login_ok()
        } else {
            support::ok_envelope(json!({}))
        }
    });
    let mut prompt = ScriptedPrompt::default();
    let options = LoginOptions::new(Some("admin".into()), Some("pw".into()), None);

    {
        let session = session::login(&transport, ENDPOINT, &mut prompt, &options).unwrap();
        assert_eq!(session.token(), "test-token");
        assert_eq!(session.auth_method(), AuthMethod::Basic);
        assert_eq!(transport.total_calls(), 1);

        let login_call = transport.call_at(0);
        // base64("admin:pw")
        assert_eq!(login_call.authorization, "Basic YWRtaW46cHc=");
        assert!(login_call.body.is_none());
    }

    // Drop released the session exactly once, result unchecked.
    assert_eq!(transport.total_calls(), 2);
    let logout_call = transport.call_at(1);
    assert!(support::is_logout(&logout_call));
    assert!(logout_call.url.ends_with("/user/auth/test-token"));
    assert_eq!(logout_call.authorization, "Bearer test-token");
}

#[test]
fn rejected_login_retries_until_the_budget_is_spent() {
    let transport = FakeTransport::new(|call, _| {
        assert!(support::is_login(call));
        support::envelope(212, json!({}))
    });
    // Username given, password prompted: the full retry budget applies.
    let mut prompt = ScriptedPrompt::new(&[], &["wrong1", "wrong2", "wrong3", "wrong4"]);
    let options = LoginOptions::new(Some("admin".into()), None, None);

    let err = session::login(&transport, ENDPOINT, &mut prompt, &options).unwrap_err();
    assert_eq!(err.code, CODE_ACCESS_DENIED);
    // retries = 3 means exactly 4 attempts.
    assert_eq!(transport.total_calls(), 4);
    assert_eq!(prompt.seen.borrow().len(), 4);
}

#[test]
fn explicit_credentials_fail_after_a_single_attempt() {
    let transport = FakeTransport::new(|_, _| support::envelope(212, json!({})));
    let mut prompt = ScriptedPrompt::default();
    let options = LoginOptions::new(Some("admin".into()), Some("bad".into()), None);

    let err = session::login(&transport, ENDPOINT, &mut prompt, &options).unwrap_err();
    assert_eq!(err.code, CODE_ACCESS_DENIED);
    assert_eq!(transport.total_calls(), 1);
    assert!(prompt.seen.borrow().is_empty());
}

#[test]
fn session_limit_is_terminal_and_never_retried() {
    let transport = FakeTransport::new(|_, _| support::envelope(CODE_SESSION_LIMIT, json!({})));
    let mut prompt = ScriptedPrompt::new(&["admin"], &["pw", "pw", "pw"]);
    let options = LoginOptions::new(None, None, None);

    let err = session::login(&transport, ENDPOINT, &mut prompt, &options).unwrap_err();
    assert_eq!(err.code, CODE_SESSION_LIMIT);
    assert_eq!(transport.total_calls(), 1);
}

#[test]
fn transport_failure_short_circuits_to_host_unreachable() {
    let transport = FakeTransport::new(|_, _| support::unreachable());
    let mut prompt = ScriptedPrompt::new(&["admin"], &["pw"]);
    let options = LoginOptions::new(None, None, None);

    let err = session::login(&transport, ENDPOINT, &mut prompt, &options).unwrap_err();
    assert_eq!(err.code, CODE_HOST_UNREACHABLE);
    assert_eq!(transport.total_calls(), 1);
}

#[test]
fn non_json_login_reply_counts_as_unreachable() {
    let transport = FakeTransport::new(|_, _| {
        Ok(dbsadmin::transport::HttpReply {
            status: 502,
            body: b"<html>bad gateway</html>".to_vec(),
        })
    });
    let mut prompt = ScriptedPrompt::new(&["admin"], &["pw"]);
    let options = LoginOptions::new(None, None, None);

    let err = session::login(&transport, ENDPOINT, &mut prompt, &options).unwrap_err();
    assert_eq!(err.code, CODE_HOST_UNREACHABLE);
}

#[test]
fn interactive_login_prompts_for_both_fields() {
    let transport = FakeTransport::new(|call, _| {
        if support::is_login(call) {
            support::login_ok()
        } else {
            support::ok_envelope(json!({}))
        }
    });
    let mut prompt = ScriptedPrompt::new(&["operator"], &["hunter2"]);
    let options = LoginOptions::new(None, None, None);

    let session = session::login(&transport, ENDPOINT, &mut prompt, &options).unwrap();
    assert_eq!(session.token(), "test-token");
    let seen = prompt.seen.borrow();
    assert_eq!(seen.as_slice(), ["username: ", "password: "]);
}
