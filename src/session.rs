use std::io::{self, Write as _};
use std::path::PathBuf;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::envelope::{
    self, CODE_ACCESS_DENIED, CODE_HOST_UNREACHABLE, CODE_SESSION_LIMIT, OperationResult,
};
use crate::pki;
use crate::request::{self, API_BASE_PATH, Method, Operation, RequestSpec};
use crate::transport::{HttpReply, Transport, TransportError};

pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:16001";

/// Interactive login attempts beyond the first.
pub const LOGIN_RETRIES: u32 = 3;

pub const ENV_USERNAME: &str = "DBSADMIN_USERNAME";
pub const ENV_PASSWORD: &str = "DBSADMIN_PASSWORD";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthMethod {
    Basic,
    Pki,
}

/// Interactive input seam; tests script it.
pub trait Prompt {
    fn read_line(&mut self, label: &str) -> io::Result<String>;
    fn read_password(&mut self, label: &str) -> io::Result<String>;
}

pub struct TerminalPrompt;

impl Prompt for TerminalPrompt {
    fn read_line(&mut self, label: &str) -> io::Result<String> {
        print!("{label}");
        io::stdout().flush()?;
        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        Ok(input.trim().to_string())
    }

    fn read_password(&mut self, label: &str) -> io::Result<String> {
        rpassword::prompt_password(label)
    }
}

#[derive(Clone, Debug)]
pub struct LoginOptions {
    pub username: Option<String>,
    pub password: Option<String>,
    pub identity_file: Option<PathBuf>,
    pub retries: u32,
}

impl LoginOptions {
    /// An explicit username/password pair disables interactive retry so
    /// non-interactive automation never hangs on a re-prompt.
    pub fn new(
        username: Option<String>,
        password: Option<String>,
        identity_file: Option<PathBuf>,
    ) -> Self {
        let retries = if username.is_some() && password.is_some() {
            0
        } else {
            LOGIN_RETRIES
        };
        LoginOptions {
            username,
            password,
            identity_file,
            retries,
        }
    }
}

/// Terminal login failure carrying the exit code to surface.
#[derive(Debug, thiserror::Error)]
#[error("login failed (result code {code})")]
pub struct LoginError {
    pub code: i32,
}

/// An authenticated admin session. The logout request fires exactly once,
/// on drop, and its result is never consulted; by then the command's exit
/// code is already determined.
pub struct Session<'t> {
    transport: &'t dyn Transport,
    endpoint: String,
    token: String,
    method: AuthMethod,
}

impl std::fmt::Debug for Session<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("endpoint", &self.endpoint)
            .field("token", &self.token)
            .field("method", &self.method)
            .finish_non_exhaustive()
    }
}

/// Authenticate against `{endpoint}/user/auth`, prompting for anything the
/// invocation didn't supply. Rejections are retried up to
/// `options.retries` times with a fresh prompt; the session-limit code and
/// transport failures are terminal immediately.
pub fn login<'t>(
    transport: &'t dyn Transport,
    endpoint: &str,
    prompt: &mut dyn Prompt,
    options: &LoginOptions,
) -> Result<Session<'t>, LoginError> {
    let mut remaining = options.retries;
    loop {
        let (authorization, method) = match &options.identity_file {
            Some(path) => {
                let token = pki::mint_token(path, prompt)
                    .map_err(|err| LoginError { code: err.code() })?;
                (format!("PKI {token}"), AuthMethod::Pki)
            }
            None => {
                let (username, password) = credentials(options, prompt);
                let pair = BASE64.encode(format!("{username}:{password}"));
                (format!("Basic {pair}"), AuthMethod::Basic)
            }
        };

        let url = format!("{endpoint}{API_BASE_PATH}/user/auth");
        let reply = transport
            .call(Method::Post, &url, &authorization, None)
            .map_err(|_| LoginError {
                code: CODE_HOST_UNREACHABLE,
            })?;
        let Some(envelope) = envelope::parse(&reply.body) else {
            return Err(LoginError {
                code: CODE_HOST_UNREACHABLE,
            });
        };

        let code = envelope.result_code();
        if code == 0 {
            tracing::debug!(?method, "login accepted");
            return Ok(Session {
                transport,
                endpoint: endpoint.to_string(),
                token: envelope.response_str("token").to_string(),
                method,
            });
        }
        if code == CODE_SESSION_LIMIT {
            // Each successful login consumes a server-side session slot;
            // retrying an exhausted server only digs the hole deeper.
            return Err(LoginError { code });
        }
        if remaining > 0 {
            remaining -= 1;
            println!("dbsadmin: Permission denied, please try again.");
            continue;
        }
        println!("dbsadmin: Permission denied.");
        return Err(LoginError {
            code: CODE_ACCESS_DENIED,
        });
    }
}

fn credentials(options: &LoginOptions, prompt: &mut dyn Prompt) -> (String, String) {
    let username = match options.username.as_deref().filter(|u| !u.is_empty()) {
        Some(username) => username.to_string(),
        None => match std::env::var(ENV_USERNAME).ok().filter(|u| !u.is_empty()) {
            Some(username) => username,
            None => prompt.read_line("username: ").unwrap_or_default(),
        },
    };
    let password = match options.password.as_deref().filter(|p| !p.is_empty()) {
        Some(password) => password.to_string(),
        None => match std::env::var(ENV_PASSWORD).ok().filter(|p| !p.is_empty()) {
            Some(password) => password,
            None => prompt.read_password("password: ").unwrap_or_default(),
        },
    };
    (username, password)
}

impl<'t> Session<'t> {
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn auth_method(&self) -> AuthMethod {
        self.method
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn authorization(&self) -> String {
        crate::transport::bearer(&self.token)
    }

    /// Raw call for listing fetches; callers decode the envelope.
    pub fn call(&self, spec: &RequestSpec) -> Result<HttpReply, TransportError> {
        self.transport.call(
            spec.method,
            &spec.url(&self.endpoint),
            &self.authorization(),
            spec.body.as_ref(),
        )
    }

    /// Execute one operation and decode the result. A transport failure
    /// short-circuits to the host-unreachable code without touching the
    /// body; an HTTP error status maps to the invalid-parameter code.
    pub fn execute(&self, operation: &Operation) -> OperationResult {
        let spec = request::build(operation);
        match self.call(&spec) {
            Err(_) => OperationResult::unreachable(),
            Ok(reply) if reply.status >= 400 => OperationResult {
                code: envelope::CODE_INVALID_PARAMETER,
                status: String::new(),
            },
            Ok(reply) => envelope::decode(&reply.body),
        }
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        let url = format!("{}{}/user/auth/{}", self.endpoint, API_BASE_PATH, self.token);
        let _ = self
            .transport
            .call(Method::Delete, &url, &self.authorization(), None);
        tracing::debug!("session released");
    }
}

/// Unauthenticated reachability probe used before commands that must
/// distinguish a stopped server from a bad request.
pub fn probe(transport: &dyn Transport, endpoint: &str) -> bool {
    let spec = request::build(&Operation::GetServerMetadata);
    transport
        .call(spec.method, &spec.url(endpoint), "", None)
        .is_ok()
}
