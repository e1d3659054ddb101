use std::path::{Path, PathBuf};

use directories_next::ProjectDirs;
use serde::{Deserialize, Serialize};

/// Per-user defaults so repeat invocations can omit `--fqdn`.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct AdminSettings {
    #[serde(default)]
    pub fqdn: Option<String>,
}

pub fn load_settings() -> anyhow::Result<AdminSettings> {
    let path = settings_path()?;
    if !path.exists() {
        return Ok(AdminSettings::default());
    }
    let contents = std::fs::read_to_string(&path)?;
    let settings: AdminSettings = serde_json::from_str(&contents)?;
    Ok(settings)
}

pub fn save_settings(settings: &AdminSettings) -> anyhow::Result<()> {
    let path = settings_path()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let contents = serde_json::to_string_pretty(settings)?;
    std::fs::write(&path, contents)?;
    Ok(())
}

pub fn settings_path() -> anyhow::Result<PathBuf> {
    if let Ok(value) = std::env::var("DBSADMIN_CONFIG_DIR") {
        return Ok(Path::new(&value).join("settings.json"));
    }
    let dirs = ProjectDirs::from("", "dbsadmin", "dbsadmin")
        .ok_or_else(|| anyhow::anyhow!("unable to determine config directory"))?;
    Ok(dirs.config_dir().join("settings.json"))
}
