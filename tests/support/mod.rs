#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;

use serde_json::{Value as JsonValue, json};

use dbsadmin::request::Method;
use dbsadmin::session::Prompt;
use dbsadmin::transport::{HttpReply, Transport, TransportError};

/// One observed HTTP call.
#[derive(Clone, Debug)]
pub struct Recorded {
    pub method: String,
    pub url: String,
    pub authorization: String,
    pub body: Option<JsonValue>,
}

/// Scripted transport: a handler closure decides each reply and every
/// call is recorded for assertions.
pub struct FakeTransport {
    pub calls: RefCell<Vec<Recorded>>,
    #[allow(clippy::type_complexity)]
    handler: Box<dyn Fn(&Recorded, usize) -> Result<HttpReply, TransportError>>,
}

impl FakeTransport {
    pub fn new(
        handler: impl Fn(&Recorded, usize) -> Result<HttpReply, TransportError> + 'static,
    ) -> Self {
        FakeTransport {
            calls: RefCell::new(Vec::new()),
            handler: Box::new(handler),
        }
    }

    /// Number of recorded calls matching method + URL fragment.
    pub fn count(&self, method: &str, fragment: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|call| call.method == method && call.url.contains(fragment))
            .count()
    }

    pub fn call_at(&self, index: usize) -> Recorded {
        self.calls.borrow()[index].clone()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.borrow().len()
    }
}

impl Transport for FakeTransport {
    fn call(
        &self,
        method: Method,
        url: &str,
        authorization: &str,
        body: Option<&JsonValue>,
    ) -> Result<HttpReply, TransportError> {
        let recorded = Recorded {
            method: method.as_str().to_string(),
            url: url.to_string(),
            authorization: authorization.to_string(),
            body: body.cloned(),
        };
        let index = self.calls.borrow().len();
        self.calls.borrow_mut().push(recorded.clone());
        (self.handler)(&recorded, index)
    }
}

pub fn reply(status: u16, body: JsonValue) -> Result<HttpReply, TransportError> {
    Ok(HttpReply {
        status,
        body: body.to_string().into_bytes(),
    })
}

/// Envelope with the given result code and response payload.
pub fn envelope(code: i32, response: JsonValue) -> Result<HttpReply, TransportError> {
    reply(
        200,
        json!({
            "response": response,
            "messages": [{"code": code.to_string(), "text": ""}]
        }),
    )
}

pub fn ok_envelope(response: JsonValue) -> Result<HttpReply, TransportError> {
    envelope(0, response)
}

pub fn login_ok() -> Result<HttpReply, TransportError> {
    ok_envelope(json!({"token": "test-token"}))
}

pub fn unreachable() -> Result<HttpReply, TransportError> {
    Err(TransportError::Unreachable("connection refused".into()))
}

pub fn is_login(call: &Recorded) -> bool {
    call.method == "POST" && call.url.ends_with("/user/auth")
}

pub fn is_logout(call: &Recorded) -> bool {
    call.method == "DELETE" && call.url.contains("/user/auth/")
}

/// Scripted interactive input; pops one canned answer per prompt.
#[derive(Default)]
pub struct ScriptedPrompt {
    pub lines: RefCell<VecDeque<String>>,
    pub passwords: RefCell<VecDeque<String>>,
    pub seen: RefCell<Vec<String>>,
}

impl ScriptedPrompt {
    pub fn new(lines: &[&str], passwords: &[&str]) -> Self {
        ScriptedPrompt {
            lines: RefCell::new(lines.iter().map(|s| s.to_string()).collect()),
            passwords: RefCell::new(passwords.iter().map(|s| s.to_string()).collect()),
            seen: RefCell::new(Vec::new()),
        }
    }
}

impl Prompt for ScriptedPrompt {
    fn read_line(&mut self, label: &str) -> io::Result<String> {
        self.seen.borrow_mut().push(label.to_string());
        Ok(self.lines.borrow_mut().pop_front().unwrap_or_default())
    }

    fn read_password(&mut self, label: &str) -> io::Result<String> {
        self.seen.borrow_mut().push(label.to_string());
        Ok(self.passwords.borrow_mut().pop_front().unwrap_or_default())
    }
}

/// Database row payload in the server's wire shape.
pub fn database_json(id: u64, filename: &str, status: &str) -> JsonValue {
    json!({
        "id": id.to_string(),
        "filename": filename,
        "folder": "filelinux:/srv/databases/",
        "status": status,
        "decryptHint": "ask the DBA",
        "clients": 0,
        "size": 1048576,
        "enabledExtPrivileges": ["fmapp"],
        "isEncrypted": false,
    })
}

pub fn client_json(id: u64, user: &str, filename: &str) -> JsonValue {
    json!({
        "id": id.to_string(),
        "userName": user,
        "computerName": "wks-1",
        "extpriv": "fmapp",
        "status": "NORMAL",
        "ipaddress": "10.0.0.5",
        "macaddress": "00:11:22:33:44:55",
        "connectTime": "2026-08-07T09:15:00",
        "connectDuration": "00:10:00",
        "appVersion": "21.0.1",
        "appLanguage": "en",
        "guestFiles": [{
            "id": "1",
            "filename": filename,
            "accountName": "admin",
            "privsetName": "[Full Access]",
        }],
    })
}

pub fn schedule_json(id: u64, name: &str, enabled: bool) -> JsonValue {
    json!({
        "id": id.to_string(),
        "name": name,
        "enabled": enabled,
        "status": "IDLE",
        "lastRun": "2026-08-06T02:00:00",
        "nextRun": "2026-08-08T02:00:00",
        "backupType": {"resourceType": "ALL_DB"},
    })
}
