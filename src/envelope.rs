use serde::Deserialize;
use serde_json::Value as JsonValue;

/// Success result code.
pub const CODE_OK: i32 = 0;
/// Malformed or undecodable response body.
pub const CODE_MALFORMED_RESPONSE: i32 = 3;
/// Terminal authentication failure after retries are exhausted.
pub const CODE_ACCESS_DENIED: i32 = 9;
/// Server-side Admin API session slots exhausted; never retried.
pub const CODE_SESSION_LIMIT: i32 = 956;
/// Internal code the server reports while its engine is shutting down.
pub const CODE_SERVER_STOPPING: i32 = 1701;
/// Invalid parameter, also used for HTTP >= 400 replies.
pub const CODE_INVALID_PARAMETER: i32 = 10001;
/// The server status already matches the requested transition.
pub const CODE_ALREADY_RUNNING: i32 = 10006;
/// Transport failure of any kind.
pub const CODE_HOST_UNREACHABLE: i32 = 10502;
/// Schedule id did not resolve to an existing schedule.
pub const CODE_SCHEDULE_MISSING: i32 = 10600;
/// No resource matched the requested argument/status combination.
pub const CODE_NO_APPLICABLE_FILES: i32 = 10904;
/// Client id did not resolve to a connected client.
pub const CODE_INVALID_CLIENT_ID: i32 = 11005;
/// Identity/key file cannot be read.
pub const CODE_FILE_READ_ERROR: i32 = 20408;
pub const CODE_FILE_PERMISSION: i32 = 20402;
pub const CODE_FILE_NOT_FOUND: i32 = 20405;
pub const CODE_DIRECTORY_NOT_EMPTY: i32 = 20501;
pub const CODE_NOT_SUPPORTED: i32 = 21;
pub const CODE_WRONG_PASSPHRASE: i32 = 212;

/// Fixed sentinel exit codes, disjoint from server result codes.
pub const EXIT_INVALID_COMMAND_PARAMETER: i32 = 23;
pub const EXIT_INVALID_COMMAND: i32 = 248;
pub const EXIT_INVALID_OPTION: i32 = 249;

/// Top-level wrapper every Admin API call returns.
#[derive(Debug, Default, Deserialize)]
pub struct ApiEnvelope {
    #[serde(default)]
    pub response: JsonValue,
    #[serde(default)]
    pub messages: Vec<ApiMessage>,
}

/// One entry of the `messages` array. The server reports `code` as a JSON
/// string, but numbers are tolerated as well.
#[derive(Debug, Default, Deserialize)]
pub struct ApiMessage {
    #[serde(default)]
    pub code: JsonValue,
    #[serde(default)]
    pub text: Option<String>,
}

impl ApiMessage {
    pub fn code_number(&self) -> Option<i32> {
        match &self.code {
            JsonValue::String(s) => s.parse().ok(),
            JsonValue::Number(n) => n.as_i64().map(|v| v as i32),
            _ => None,
        }
    }
}

impl ApiEnvelope {
    /// The authoritative result code: the first message that carries one.
    pub fn result_code(&self) -> i32 {
        self.messages
            .iter()
            .find_map(ApiMessage::code_number)
            .unwrap_or(-1)
    }

    pub fn response_str(&self, field: &str) -> &str {
        self.response
            .get(field)
            .and_then(JsonValue::as_str)
            .unwrap_or_default()
    }
}

/// Normalized decode of an Admin API response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperationResult {
    pub code: i32,
    pub status: String,
}

impl OperationResult {
    pub fn ok(&self) -> bool {
        self.code == CODE_OK
    }

    pub fn unreachable() -> Self {
        OperationResult {
            code: CODE_HOST_UNREACHABLE,
            status: String::new(),
        }
    }
}

pub fn parse(body: &[u8]) -> Option<ApiEnvelope> {
    serde_json::from_slice(body).ok()
}

/// Decode a response body into `(code, status)`. A body that is not a valid
/// envelope decodes to `CODE_MALFORMED_RESPONSE`.
pub fn decode(body: &[u8]) -> OperationResult {
    let Some(envelope) = parse(body) else {
        return OperationResult {
            code: CODE_MALFORMED_RESPONSE,
            status: String::new(),
        };
    };
    OperationResult {
        code: envelope.result_code(),
        status: envelope.response_str("status").to_string(),
    }
}

/// The server overloads 1701 for "engine is stopping"; clients treat that
/// exactly like an unreachable host.
pub fn normalize(code: i32) -> i32 {
    if code == CODE_SERVER_STOPPING {
        CODE_HOST_UNREACHABLE
    } else {
        code
    }
}

/// Whether a login failure code indicates the host itself is unreachable
/// rather than a credential or local-file problem.
pub fn indicates_unreachable(code: i32) -> bool {
    !matches!(
        code,
        CODE_ACCESS_DENIED
            | CODE_NOT_SUPPORTED
            | CODE_SESSION_LIMIT
            | CODE_FILE_PERMISSION
            | CODE_FILE_NOT_FOUND
            | CODE_FILE_READ_ERROR
    )
}

/// Human description for a result code. Unknown codes map to the empty
/// string and are printed with the bare numeral.
pub fn describe(code: i32) -> &'static str {
    match code {
        -1 => "Unknown error",
        3 => "Unavailable command",
        4 => "Command is unknown",
        8 => "Empty result",
        9 => "Access denied",
        21 => "Not Supported",
        212 => "Invalid user account and/or password; please try again",
        214 => "Too many login attempts, account locked out",
        802 => "Unable to open the file",
        956 => "Maximum number of Admin API sessions exceeded",
        958 => "Parameter missing",
        960 => "Parameter is invalid",
        1700 => "Resource doesn't exist",
        1702 => {
            "Authentication information wasn't provided in the correct format; \
             verify the value of the Authorization header"
        }
        1708 => "Parameter value is invalid",
        1713 => "The API request is not supported for this operating system",
        10001 => "Invalid parameter",
        10006 => "Service already running",
        10007 => "Requested object does not exist",
        10502 => "Host unreachable",
        10600 => "Schedule at specified index does not exist",
        10601 => "Schedule is misconfigured; invalid taskType or run status",
        10603 => "Schedule can't be created or duplicated",
        10604 => "Cannot enable schedule",
        10610 => "No schedules created in configuration file",
        10611 => "Schedule name is already used",
        10904 => "No applicable files for this operation",
        10906 => "Script is missing",
        10908 => "System script aborted",
        11000 => "Invalid command",
        11002 => "Unable to create command",
        11005 => "Disconnect Client invalid ID",
        20402 => "File permission error",
        20405 => "File not found or not accessible.",
        20406 => "File already exists",
        20408 => "File read error",
        20501 => "Directory not empty",
        20630 => "SSL certificate expired",
        20632 => "SSL certificate verification error",
        25004 => "Parameters are invalid",
        25006 => "Invalid session error",
        _ => "",
    }
}

/// Final `Error: <code> (<description>)` line for a nonzero exit.
pub fn error_line(code: i32) -> String {
    let code = normalize(code);
    format!("Error: {} ({})", code, describe(code))
}
