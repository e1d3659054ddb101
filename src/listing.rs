use serde::{Deserialize, Deserializer};
use serde_json::Value as JsonValue;

use crate::envelope::{self, CODE_HOST_UNREACHABLE, CODE_MALFORMED_RESPONSE, CODE_SERVER_STOPPING};
use crate::request::{self, Operation};
use crate::session::Session;

/// A listing could not be retrieved; `code` is ready for the taxonomy.
#[derive(Debug, thiserror::Error)]
#[error("listing unavailable (result code {code})")]
pub struct ListingError {
    pub code: i32,
}

/// The server reports numeric ids as JSON strings; tolerate both.
fn flexible_id<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = JsonValue::deserialize(deserializer)?;
    match &value {
        JsonValue::String(s) => s.parse().map_err(serde::de::Error::custom),
        JsonValue::Number(n) => n
            .as_u64()
            .ok_or_else(|| serde::de::Error::custom("negative id")),
        _ => Err(serde::de::Error::custom("id is neither string nor number")),
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseRow {
    #[serde(deserialize_with = "flexible_id")]
    pub id: u64,
    pub filename: String,
    pub folder: String,
    pub status: String,
    #[serde(rename = "decryptHint")]
    pub decrypt_hint: String,
    pub clients: i64,
    pub size: i64,
    #[serde(rename = "enabledExtPrivileges")]
    pub enabled_ext_privileges: Vec<String>,
    #[serde(rename = "isEncrypted")]
    pub is_encrypted: bool,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct GuestFile {
    #[serde(deserialize_with = "flexible_id")]
    pub id: u64,
    pub filename: String,
    #[serde(rename = "accountName")]
    pub account_name: String,
    #[serde(rename = "privsetName")]
    pub privset_name: String,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientRow {
    #[serde(deserialize_with = "flexible_id")]
    pub id: u64,
    #[serde(rename = "userName")]
    pub user_name: String,
    #[serde(rename = "computerName")]
    pub computer_name: String,
    #[serde(rename = "extpriv")]
    pub ext_priv: String,
    pub status: String,
    #[serde(rename = "ipaddress")]
    pub ip_address: String,
    #[serde(rename = "macaddress")]
    pub mac_address: String,
    #[serde(rename = "connectTime")]
    pub connect_time: String,
    #[serde(rename = "connectDuration")]
    pub connect_duration: String,
    #[serde(rename = "appVersion")]
    pub app_version: String,
    #[serde(rename = "appLanguage")]
    pub app_language: String,
    #[serde(rename = "guestFiles")]
    pub guest_files: Vec<GuestFile>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScheduleRow {
    #[serde(deserialize_with = "flexible_id")]
    pub id: u64,
    pub name: String,
    pub enabled: bool,
    pub status: String,
    #[serde(rename = "lastRun")]
    pub last_run: String,
    #[serde(rename = "nextRun")]
    pub next_run: String,
    #[serde(rename = "backupType")]
    pub backup_type: Option<JsonValue>,
    #[serde(rename = "filemakerScriptType")]
    pub filemaker_script_type: Option<JsonValue>,
    #[serde(rename = "messageType")]
    pub message_type: Option<JsonValue>,
    #[serde(rename = "scriptSequenceType")]
    pub script_sequence_type: Option<JsonValue>,
    #[serde(rename = "systemScriptType")]
    pub system_script_type: Option<JsonValue>,
    #[serde(rename = "verifyType")]
    pub verify_type: Option<JsonValue>,
}

impl ScheduleRow {
    /// Task type derived from which variant object the server populated.
    pub fn task_type(&self) -> &'static str {
        if self.backup_type.is_some() {
            "Backup"
        } else if self.filemaker_script_type.is_some() {
            "FileMaker Script"
        } else if self.message_type.is_some() {
            "Message"
        } else if self.script_sequence_type.is_some() {
            "Script Sequence"
        } else if self.system_script_type.is_some() {
            "System Script"
        } else if self.verify_type.is_some() {
            "Verify"
        } else {
            ""
        }
    }
}

fn fetch_envelope(
    session: &Session,
    operation: &Operation,
) -> Result<envelope::ApiEnvelope, ListingError> {
    let spec = request::build(operation);
    let reply = session.call(&spec).map_err(|_| ListingError {
        code: CODE_HOST_UNREACHABLE,
    })?;
    let envelope = envelope::parse(&reply.body).ok_or(ListingError {
        code: CODE_MALFORMED_RESPONSE,
    })?;
    if envelope.result_code() == CODE_SERVER_STOPPING {
        // The engine is mid-shutdown; indistinguishable from unreachable.
        return Err(ListingError {
            code: CODE_HOST_UNREACHABLE,
        });
    }
    Ok(envelope)
}

fn rows<T: for<'de> Deserialize<'de>>(envelope: &envelope::ApiEnvelope, field: &str) -> Vec<T> {
    envelope
        .response
        .get(field)
        .and_then(JsonValue::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| serde_json::from_value(item.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

/// Listings are re-fetched on every call; the server is the sole source
/// of truth and nothing is cached between polling iterations.
pub fn fetch_databases(session: &Session) -> Result<Vec<DatabaseRow>, ListingError> {
    let envelope = fetch_envelope(session, &Operation::ListDatabases)?;
    Ok(rows(&envelope, "databases"))
}

pub fn fetch_clients(session: &Session) -> Result<Vec<ClientRow>, ListingError> {
    let envelope = fetch_envelope(session, &Operation::ListClients)?;
    Ok(rows(&envelope, "clients"))
}

pub fn fetch_schedules(session: &Session) -> Result<Vec<ScheduleRow>, ListingError> {
    let envelope = fetch_envelope(session, &Operation::ListSchedules)?;
    Ok(rows(&envelope, "schedules"))
}

/// Single schedule by id, from `response.schedule`.
pub fn fetch_schedule(session: &Session, id: u64) -> Option<ScheduleRow> {
    let envelope = fetch_envelope(session, &Operation::GetSchedule { id }).ok()?;
    envelope
        .response
        .get("schedule")
        .and_then(|value| serde_json::from_value(value.clone()).ok())
}

/// General server configuration as reported by the server. A missing
/// `startupRestorationEnabled` field marks a server generation that no
/// longer carries the legacy toggle.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GeneralConfigReport {
    pub cache_size: i64,
    pub max_files: i64,
    pub max_pro_connections: i64,
    pub max_psos: i64,
    pub startup_restoration: Option<bool>,
}

pub fn fetch_general_config(session: &Session) -> Result<GeneralConfigReport, ListingError> {
    let envelope = fetch_envelope(session, &Operation::GetGeneralConfig)?;
    let field = |name: &str| {
        envelope
            .response
            .get(name)
            .and_then(JsonValue::as_i64)
            .unwrap_or_default()
    };
    Ok(GeneralConfigReport {
        cache_size: field("cacheSize"),
        max_files: field("maxFiles"),
        max_pro_connections: field("maxProConnections"),
        max_psos: field("maxPSOS"),
        startup_restoration: envelope
            .response
            .get("startupRestorationEnabled")
            .and_then(JsonValue::as_bool),
    })
}

pub fn fetch_security_config(session: &Session) -> Result<bool, ListingError> {
    let envelope = fetch_envelope(session, &Operation::GetSecurityConfig)?;
    Ok(envelope
        .response
        .get("requireSecureDB")
        .and_then(JsonValue::as_bool)
        .unwrap_or(true))
}
