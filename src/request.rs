use serde_json::{Value as JsonValue, json};

/// Versioned base path of the admin API.
pub const API_BASE_PATH: &str = "/admin/api/v2";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Patch,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Patch => "PATCH",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServerState {
    Running,
    Stopped,
}

impl ServerState {
    pub fn as_str(self) -> &'static str {
        match self {
            ServerState::Running => "RUNNING",
            ServerState::Stopped => "STOPPED",
        }
    }
}

/// General server configuration values. The wire shape depends on the
/// server generation: older servers still expose the startup-restoration
/// toggle inside the general config document and reject bodies without it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GeneralConfig {
    pub cache_size: i64,
    pub max_files: i64,
    pub max_pro_connections: i64,
    pub max_psos: i64,
    pub startup_restoration_enabled: bool,
}

/// One abstract admin operation. Each variant carries everything its wire
/// body needs; dispatch in `build` is exhaustive.
#[derive(Clone, Debug, PartialEq)]
pub enum Operation {
    ListDatabases,
    ListClients,
    ListSchedules,
    GetSchedule { id: u64 },
    OpenDatabase { id: u64, key: String, save_key: bool },
    CloseDatabase { id: u64, message: String, force: bool },
    PauseDatabase { id: u64 },
    ResumeDatabase { id: u64 },
    RemoveDatabase { id: u64 },
    DisconnectClient { id: u64, message: String, grace_time: u32 },
    SendClientMessage { id: u64, message: String },
    EnableSchedule { id: u64 },
    DisableSchedule { id: u64 },
    RunSchedule { id: u64 },
    DeleteSchedule { id: u64 },
    GetServerStatus,
    SetServerStatus { state: ServerState },
    GetServerMetadata,
    GetGeneralConfig,
    SetGeneralConfig { config: GeneralConfig, legacy_startup_restoration: bool },
    GetSecurityConfig,
    SetSecurityConfig { require_secure_db: bool },
    CancelBackup,
}

/// A fully built request: method, path below the versioned base, optional
/// query string, optional JSON body. Building the same operation twice
/// yields byte-identical output.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestSpec {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub body: Option<JsonValue>,
}

impl RequestSpec {
    fn new(method: Method, path: String) -> Self {
        RequestSpec {
            method,
            path,
            query: None,
            body: None,
        }
    }

    fn with_body(mut self, body: JsonValue) -> Self {
        self.body = Some(body);
        self
    }

    fn with_query(mut self, query: String) -> Self {
        self.query = Some(query);
        self
    }

    /// Full URL under `endpoint` (scheme + authority, no trailing slash).
    pub fn url(&self, endpoint: &str) -> String {
        match &self.query {
            Some(query) => format!("{endpoint}{API_BASE_PATH}/{}?{query}", self.path),
            None => format!("{endpoint}{API_BASE_PATH}/{}", self.path),
        }
    }
}

pub fn build(operation: &Operation) -> RequestSpec {
    use Operation::*;
    match operation {
        ListDatabases => RequestSpec::new(Method::Get, "databases".into()),
        ListClients => RequestSpec::new(Method::Get, "clients".into()),
        ListSchedules => RequestSpec::new(Method::Get, "schedules".into()),
        GetSchedule { id } => RequestSpec::new(Method::Get, format!("schedules/{id}")),
        OpenDatabase { id, key, save_key } => {
            RequestSpec::new(Method::Patch, format!("databases/{id}")).with_body(json!({
                "status": "OPENED",
                "key": key,
                "saveKey": save_key,
            }))
        }
        CloseDatabase { id, message, force } => {
            RequestSpec::new(Method::Patch, format!("databases/{id}")).with_body(json!({
                "status": "CLOSED",
                "messageText": message,
                "force": force,
            }))
        }
        PauseDatabase { id } => RequestSpec::new(Method::Patch, format!("databases/{id}"))
            .with_body(json!({"status": "PAUSED"})),
        ResumeDatabase { id } => RequestSpec::new(Method::Patch, format!("databases/{id}"))
            .with_body(json!({"status": "RESUMED"})),
        RemoveDatabase { id } => RequestSpec::new(Method::Delete, format!("databases/{id}")),
        DisconnectClient { id, message, grace_time } => {
            RequestSpec::new(Method::Delete, format!("clients/{id}")).with_query(format!(
                "messageText={}&graceTime={}",
                percent_encode(message),
                grace_time
            ))
        }
        SendClientMessage { id, message } => {
            RequestSpec::new(Method::Post, format!("clients/{id}/message"))
                .with_body(json!({"messageText": message}))
        }
        EnableSchedule { id } => RequestSpec::new(Method::Patch, format!("schedules/{id}"))
            .with_body(json!({"enabled": true})),
        DisableSchedule { id } => RequestSpec::new(Method::Patch, format!("schedules/{id}"))
            .with_body(json!({"enabled": false})),
        RunSchedule { id } => RequestSpec::new(Method::Patch, format!("schedules/{id}"))
            .with_body(json!({"status": "RUNNING"})),
        DeleteSchedule { id } => RequestSpec::new(Method::Delete, format!("schedules/{id}")),
        GetServerStatus => RequestSpec::new(Method::Get, "server/status".into()),
        SetServerStatus { state } => RequestSpec::new(Method::Patch, "server/status".into())
            .with_body(json!({"status": state.as_str()})),
        GetServerMetadata => RequestSpec::new(Method::Get, "server/metadata".into()),
        GetGeneralConfig => RequestSpec::new(Method::Get, "server/config/general".into()),
        SetGeneralConfig { config, legacy_startup_restoration } => {
            let body = if *legacy_startup_restoration {
                json!({
                    "cacheSize": config.cache_size,
                    "maxFiles": config.max_files,
                    "maxProConnections": config.max_pro_connections,
                    "maxPSOS": config.max_psos,
                    "startupRestorationEnabled": config.startup_restoration_enabled,
                })
            } else {
                json!({
                    "cacheSize": config.cache_size,
                    "maxFiles": config.max_files,
                    "maxProConnections": config.max_pro_connections,
                    "maxPSOS": config.max_psos,
                })
            };
            RequestSpec::new(Method::Patch, "server/config/general".into()).with_body(body)
        }
        GetSecurityConfig => RequestSpec::new(Method::Get, "server/config/security".into()),
        SetSecurityConfig { require_secure_db } => {
            RequestSpec::new(Method::Patch, "server/config/security".into())
                .with_body(json!({"requireSecureDB": require_secure_db}))
        }
        CancelBackup => RequestSpec::new(Method::Post, "server/cancelbackup".into()),
    }
}

/// Minimal query-value encoder: unreserved characters pass through,
/// everything else becomes %XX (space included).
pub fn percent_encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            other => {
                out.push_str(&format!("%{other:02X}"));
            }
        }
    }
    out
}
