use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::downloader::QueuePolicy;
use crate::core::error::{io_at, LauncherResult};
use crate::core::http::build_http_client;
use crate::core::profile::ProfileStore;

pub const APP_DIR_NAME: &str = "LauncherCore";
const SETTINGS_FILE: &str = "launcher_settings.json";
const PROFILES_FILE: &str = "profiles.json";
const ACCOUNT_FILE: &str = "account.json";

/// Public client id used when neither the settings file nor `MSA_CLIENT_ID` provide one.
pub const MSA_CLIENT_ID_FALLBACK: &str = "00000000402B5328";

/// Upstream base URLs. Overridable so the whole pipeline can be pointed at a mirror.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub version_manifest: String,
    pub resources: String,
    pub java_runtime_index: String,
    pub forge_maven: String,
    pub curseforge_api: String,
    pub modrinth_api: String,
    pub msa_authority: String,
    pub xbox_user_auth: String,
    pub xsts_authorize: String,
    pub minecraft_services: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            version_manifest: "https://piston-meta.mojang.com/mc/game/version_manifest_v2.json"
                .into(),
            resources: "https://resources.download.minecraft.net".into(),
            java_runtime_index: "https://launchermeta.mojang.com/v1/products/java-runtime/2ec0cc96c44e5a76b9c8b7c39df7210883d12871/all.json".into(),
            forge_maven: "https://maven.minecraftforge.net".into(),
            curseforge_api: "https://api.curseforge.com".into(),
            modrinth_api: "https://api.modrinth.com/v2".into(),
            msa_authority: "https://login.microsoftonline.com/consumers".into(),
            xbox_user_auth: "https://user.auth.xboxlive.com/user/authenticate".into(),
            xsts_authorize: "https://xsts.auth.xboxlive.com/xsts/authorize".into(),
            minecraft_services: "https://api.minecraftservices.com".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherSettings {
    /// Workers per download queue.
    pub max_workers: usize,
    /// Failed attempts a queue tolerates before giving up.
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub default_memory_mb: u64,
    pub open_browser_on_remediation: bool,
    pub msa_client_id: String,
    pub curseforge_api_key: Option<String>,
    pub endpoints: Endpoints,
}

impl Default for LauncherSettings {
    fn default() -> Self {
        Self {
            max_workers: 8,
            max_retries: 5,
            retry_backoff_ms: 5_000,
            default_memory_mb: 2048,
            open_browser_on_remediation: true,
            msa_client_id: MSA_CLIENT_ID_FALLBACK.into(),
            curseforge_api_key: None,
            endpoints: Endpoints::default(),
        }
    }
}

impl LauncherSettings {
    /// Read `launcher_settings.json` from `data_dir`, falling back to defaults,
    /// then apply `MSA_CLIENT_ID` / `CURSEFORGE_API_KEY` from the environment.
    pub fn load(data_dir: &Path) -> Self {
        let mut settings = load_settings_from_disk(data_dir).unwrap_or_default();
        settings.apply_env();
        settings
    }

    pub fn save(&self, data_dir: &Path) -> LauncherResult<()> {
        std::fs::create_dir_all(data_dir).map_err(io_at(data_dir))?;
        let settings_path = data_dir.join(SETTINGS_FILE);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&settings_path, json).map_err(io_at(&settings_path))
    }

    fn apply_env(&mut self) {
        if let Ok(id) = std::env::var("MSA_CLIENT_ID") {
            if !id.trim().is_empty() {
                self.msa_client_id = id.trim().to_string();
            }
        }
        if let Ok(key) = std::env::var("CURSEFORGE_API_KEY") {
            if !key.trim().is_empty() {
                self.curseforge_api_key = Some(key.trim().to_string());
            }
        }
    }

    pub fn queue_policy(&self) -> QueuePolicy {
        QueuePolicy {
            workers: self.max_workers.max(1),
            max_retries: self.max_retries,
            backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }
}

/// Everything a front end needs to drive the core: paths, HTTP client,
/// settings and the profile list.
pub struct AppState {
    pub data_dir: PathBuf,
    pub http_client: Client,
    pub launcher_settings: LauncherSettings,
    pub profiles: ProfileStore,
}

impl AppState {
    pub fn new() -> LauncherResult<Self> {
        Self::with_data_dir(default_data_dir())
    }

    pub fn with_data_dir(data_dir: PathBuf) -> LauncherResult<Self> {
        std::fs::create_dir_all(&data_dir).map_err(io_at(&data_dir))?;
        let launcher_settings = LauncherSettings::load(&data_dir);
        let http_client = build_http_client()?;
        let profiles = ProfileStore::new(data_dir.clone());
        debug!("Launcher data dir: {:?}", data_dir);

        Ok(Self {
            data_dir,
            http_client,
            launcher_settings,
            profiles,
        })
    }

    pub fn profiles_path(&self) -> PathBuf {
        self.data_dir.join(PROFILES_FILE)
    }

    pub fn account_path(&self) -> PathBuf {
        self.data_dir.join(ACCOUNT_FILE)
    }

    pub fn save_settings(&self) -> LauncherResult<()> {
        self.launcher_settings.save(&self.data_dir)
    }
}

fn load_settings_from_disk(data_dir: &Path) -> Option<LauncherSettings> {
    let path = data_dir.join(SETTINGS_FILE);
    let raw = std::fs::read_to_string(&path).ok()?;
    match serde_json::from_str(&raw) {
        Ok(settings) => Some(settings),
        Err(e) => {
            warn!("Ignoring unreadable {:?}: {}", path, e);
            None
        }
    }
}

pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_settings_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings_from_disk(dir.path()).unwrap_or_default();
        assert_eq!(settings.max_workers, 8);
        assert_eq!(settings.max_retries, 5);
        assert_eq!(settings.retry_backoff_ms, 5_000);
    }

    #[test]
    fn partial_settings_keep_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(SETTINGS_FILE),
            r#"{"max_workers": 2, "endpoints": {"resources": "http://localhost:1"}}"#,
        )
        .unwrap();

        let settings = load_settings_from_disk(dir.path()).unwrap();
        assert_eq!(settings.max_workers, 2);
        assert_eq!(settings.default_memory_mb, 2048);
        assert_eq!(settings.endpoints.resources, "http://localhost:1");
        assert_eq!(
            settings.endpoints.forge_maven,
            "https://maven.minecraftforge.net"
        );
    }

    #[test]
    fn settings_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = LauncherSettings::default();
        settings.curseforge_api_key = Some("key".into());
        settings.save(dir.path()).unwrap();

        let loaded = load_settings_from_disk(dir.path()).unwrap();
        assert_eq!(loaded.curseforge_api_key.as_deref(), Some("key"));
    }

    #[test]
    fn queue_policy_never_has_zero_workers() {
        let settings = LauncherSettings {
            max_workers: 0,
            ..LauncherSettings::default()
        };
        assert_eq!(settings.queue_policy().workers, 1);
    }
}
