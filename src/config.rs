use crate::envelope::CODE_INVALID_PARAMETER;
use crate::listing::GeneralConfigReport;
use crate::request::GeneralConfig;

/// Server configuration names accepted by `get`/`set serverconfig`.
pub const CONFIG_NAMES: [&str; 5] = [
    "cachesize",
    "hostedfiles",
    "proconnections",
    "scriptsessions",
    "securefilesonly",
];

/// Requested configuration changes, parsed from `name=value` arguments.
/// Unset fields keep the server's current value.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServerConfigChanges {
    pub cache_size: Option<i64>,
    pub max_files: Option<i64>,
    pub max_pro_connections: Option<i64>,
    pub max_psos: Option<i64>,
    pub secure_files_only: Option<bool>,
}

impl ServerConfigChanges {
    pub fn touches_general(&self) -> bool {
        self.cache_size.is_some()
            || self.max_files.is_some()
            || self.max_pro_connections.is_some()
            || self.max_psos.is_some()
    }

    pub fn is_empty(&self) -> bool {
        !self.touches_general() && self.secure_files_only.is_none()
    }

    /// Option names touched by this change set, for the post-condition
    /// display.
    pub fn touched_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        if self.cache_size.is_some() {
            names.push("cachesize".to_string());
        }
        if self.max_files.is_some() {
            names.push("hostedfiles".to_string());
        }
        if self.max_pro_connections.is_some() {
            names.push("proconnections".to_string());
        }
        if self.max_psos.is_some() {
            names.push("scriptsessions".to_string());
        }
        if self.secure_files_only.is_some() {
            names.push("securefilesonly".to_string());
        }
        names
    }

    /// Explicit values must sit inside the documented ranges; merged
    /// server values are trusted as-is.
    pub fn validate_ranges(&self) -> Result<(), i32> {
        if self.cache_size.is_some_and(|v| !(64..=1_048_576).contains(&v))
            || self.max_files.is_some_and(|v| !(1..=125).contains(&v))
            || self.max_pro_connections.is_some_and(|v| !(0..=2_000).contains(&v))
            || self.max_psos.is_some_and(|v| !(0..=500).contains(&v))
        {
            return Err(CODE_INVALID_PARAMETER);
        }
        Ok(())
    }

    /// Merge over the server's current report into a full wire config.
    pub fn merged_with(&self, report: &GeneralConfigReport) -> GeneralConfig {
        GeneralConfig {
            cache_size: self.cache_size.unwrap_or(report.cache_size),
            max_files: self.max_files.unwrap_or(report.max_files),
            max_pro_connections: self
                .max_pro_connections
                .unwrap_or(report.max_pro_connections),
            max_psos: self.max_psos.unwrap_or(report.max_psos),
            startup_restoration_enabled: report.startup_restoration.unwrap_or(false),
        }
    }
}

fn parse_bool_value(value: &str) -> Option<bool> {
    let lowered = value.to_lowercase();
    if lowered.is_empty() {
        return None;
    }
    if lowered == "true" {
        return Some(true);
    }
    if let Ok(number) = lowered.trim_start_matches(['+', '-']).parse::<i64>() {
        let negative = lowered.starts_with('-');
        return Some(number != 0 && !negative);
    }
    Some(false)
}

/// Parse `name=value` settings. Unknown names, missing `=`, empty or
/// out-of-type values short-circuit to the invalid-parameter code before
/// any network call is made.
pub fn parse_server_config_args(args: &[String]) -> Result<ServerConfigChanges, i32> {
    if args.is_empty() {
        return Err(CODE_INVALID_PARAMETER);
    }
    let mut changes = ServerConfigChanges::default();
    for arg in args {
        let Some((name, value)) = arg.split_once('=') else {
            return Err(CODE_INVALID_PARAMETER);
        };
        if value.is_empty() {
            return Err(CODE_INVALID_PARAMETER);
        }
        match name.to_lowercase().as_str() {
            "cachesize" => {
                changes.cache_size = Some(value.parse().map_err(|_| CODE_INVALID_PARAMETER)?);
            }
            "hostedfiles" | "maxfiles" => {
                changes.max_files = Some(value.parse().map_err(|_| CODE_INVALID_PARAMETER)?);
            }
            "proconnections" | "maxguests" => {
                changes.max_pro_connections =
                    Some(value.parse().map_err(|_| CODE_INVALID_PARAMETER)?);
            }
            "scriptsessions" | "allowpsos" => {
                changes.max_psos = Some(value.parse().map_err(|_| CODE_INVALID_PARAMETER)?);
            }
            "securefilesonly" | "requiresecuredb" => {
                changes.secure_files_only =
                    Some(parse_bool_value(value).ok_or(CODE_INVALID_PARAMETER)?);
            }
            _ => return Err(CODE_INVALID_PARAMETER),
        }
    }
    Ok(changes)
}

/// Validate the bare option names handed to `get serverconfig`.
pub fn validate_config_names(names: &[String]) -> Result<Vec<String>, i32> {
    if names.is_empty() {
        return Ok(CONFIG_NAMES.iter().map(|name| name.to_string()).collect());
    }
    let mut validated = Vec::new();
    for name in names {
        let lowered = name.to_lowercase();
        if !CONFIG_NAMES.contains(&lowered.as_str()) {
            return Err(CODE_INVALID_PARAMETER);
        }
        validated.push(lowered);
    }
    Ok(validated)
}
