use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::core::error::{io_at, LauncherError, LauncherResult};
use crate::core::http::get_json;
use crate::core::loaders::ManifestLoader;

pub const CURRENT_PROFILE_VERSION: u32 = 1;
pub const DEFAULT_MEMORY_MB: u64 = 2048;

/// Profile as published by a profile source or written by the user.
///
/// Records carrying any other `version` than [`CURRENT_PROFILE_VERSION`]
/// are rejected at parse time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawPublicProfile")]
pub struct PublicProfile {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Base64 encoded image.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub icon: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub server_address: String,
    pub manifest: ManifestLoader,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub recommended_memory_mb: u64,
    pub version: u32,
}

fn is_zero(value: &u64) -> bool {
    *value == 0
}

#[derive(Deserialize)]
struct RawPublicProfile {
    name: String,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    icon: String,
    #[serde(default)]
    server_address: String,
    manifest: ManifestLoader,
    #[serde(default)]
    recommended_memory_mb: u64,
    version: u32,
}

impl TryFrom<RawPublicProfile> for PublicProfile {
    type Error = LauncherError;

    fn try_from(raw: RawPublicProfile) -> Result<Self, Self::Error> {
        if raw.version != CURRENT_PROFILE_VERSION {
            return Err(LauncherError::ProfileVersion {
                found: raw.version,
                expected: CURRENT_PROFILE_VERSION,
            });
        }
        Ok(Self {
            name: raw.name,
            display_name: raw.display_name,
            description: raw.description,
            icon: raw.icon,
            server_address: raw.server_address,
            manifest: raw.manifest,
            recommended_memory_mb: raw.recommended_memory_mb,
            version: raw.version,
        })
    }
}

/// A profile known to this launcher. Identity is `(name, source)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    #[serde(flatten)]
    pub public: PublicProfile,
    /// URL of the profile list this profile is kept in sync with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Install directory, derived from the data dir on load.
    #[serde(skip)]
    pub path: PathBuf,
}

impl Profile {
    /// Local profile rooted under `data_dir`.
    pub fn local(public: PublicProfile, data_dir: &Path) -> Self {
        let path = local_path(data_dir, &public.name);
        Self {
            public,
            source: None,
            path,
        }
    }

    /// Profile tracked from `source`; the source must carry a scheme and host.
    pub fn sourced(public: PublicProfile, source: &str, data_dir: &Path) -> LauncherResult<Self> {
        let path = sourced_path(data_dir, source, &public.name)?;
        Ok(Self {
            public,
            source: Some(source.to_string()),
            path,
        })
    }

    pub fn name(&self) -> &str {
        &self.public.name
    }

    pub fn manifest(&self) -> &ManifestLoader {
        &self.public.manifest
    }

    /// Display name, or the name when no display name is set.
    pub fn display(&self) -> &str {
        if self.public.display_name.is_empty() {
            &self.public.name
        } else {
            &self.public.display_name
        }
    }

    pub fn server_address(&self) -> Option<&str> {
        Some(self.public.server_address.as_str()).filter(|s| !s.is_empty())
    }

    pub fn same_identity(&self, other: &Profile) -> bool {
        self.public.name == other.public.name && self.source == other.source
    }

    /// Recompute `path` for `data_dir`.
    pub fn attach(&mut self, data_dir: &Path) -> LauncherResult<()> {
        self.path = match &self.source {
            Some(source) => sourced_path(data_dir, source, &self.public.name)?,
            None => local_path(data_dir, &self.public.name),
        };
        Ok(())
    }

    /// Re-derive this profile from its source. Local fields are overwritten;
    /// `source` is kept. A local profile is left untouched.
    pub async fn fetch(&mut self, client: &reqwest::Client, data_dir: &Path) -> LauncherResult<()> {
        let Some(source) = self.source.clone() else {
            return Ok(());
        };
        let published: Vec<PublicProfile> = get_json(client, &source).await.map_err(|e| {
            error!("Failed to fetch profiles from {}: {}", source, e);
            e
        })?;

        let public = published
            .into_iter()
            .find(|p| p.name == self.public.name)
            .ok_or_else(|| LauncherError::ProfileNotFound {
                name: self.public.name.clone(),
                source_url: source.clone(),
            })?;
        *self = Profile::sourced(public, &source, data_dir)?;
        debug!("Refreshed profile {} from {}", self.public.name, source);
        Ok(())
    }

    /// Drop `<profile>/manifest.json` so the next setup reinstalls every mod.
    pub async fn delete_manifest_cache(&self) -> LauncherResult<()> {
        let path = self.path.join("manifest.json");
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_at(&path)(e)),
        }
    }

    /// True when the host has more than twice the recommended memory.
    pub fn check_memory(&self) -> bool {
        total_memory_mb() > 2 * self.public.recommended_memory_mb
    }

    /// Heap size for `-Xmx`: the recommendation when the host can afford it,
    /// otherwise half of the host memory.
    pub fn actual_memory_mb(&self) -> u64 {
        memory_for(self.public.recommended_memory_mb, total_memory_mb())
    }
}

fn memory_for(recommended_mb: u64, total_mb: u64) -> u64 {
    if recommended_mb == 0 {
        return DEFAULT_MEMORY_MB;
    }
    if total_mb > 2 * recommended_mb {
        recommended_mb
    } else {
        total_mb / 2
    }
}

fn total_memory_mb() -> u64 {
    let mut system = sysinfo::System::new();
    system.refresh_memory();
    system.total_memory() / (1024 * 1024)
}

fn local_path(data_dir: &Path, name: &str) -> PathBuf {
    data_dir.join("profiles").join("local").join(name)
}

fn sourced_path(data_dir: &Path, source: &str, name: &str) -> LauncherResult<PathBuf> {
    let url = url::Url::parse(source)
        .map_err(|e| LauncherError::ProfileSource(format!("{}: {}", source, e)))?;
    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| LauncherError::ProfileSource(format!("{}: missing host", source)))?;
    Ok(data_dir.join("profiles").join(host).join(name))
}
