// ─── Mod Pack ───
// Desired mod set plus optional override / initializer trees shipped in a zip.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::model::ModInstance;
use crate::core::error::{io_at, LauncherError, LauncherResult};
use crate::core::http::ensure_success;

pub const PACK_MANIFEST_FILE: &str = "manifest.json";
/// Zip entries with this suffix delete their target instead of writing it.
pub const DELETE_SUFFIX: &str = ".delete";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ModPack {
    #[serde(default, rename = "override", skip_serializing_if = "Option::is_none")]
    pub overrides: Option<OverridesManifest>,
    #[serde(default, rename = "initialize", skip_serializing_if = "Option::is_none")]
    pub initialize: Option<InitializeManifest>,
    #[serde(default)]
    pub mods: Vec<ModInstance>,
}

/// Files re-applied whenever `updated_at` moves forward.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OverridesManifest {
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Zip path prefix of the tree.
    pub overrides: String,
}

/// Files applied once, on the first sync that sees them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InitializeManifest {
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    pub initializes: String,
}

impl ModPack {
    pub fn manifest_path(profile_path: &Path) -> PathBuf {
        profile_path.join(PACK_MANIFEST_FILE)
    }

    /// Previously applied pack of a profile; empty when nothing was installed yet.
    pub async fn load_installed(profile_path: &Path) -> LauncherResult<Self> {
        let path = Self::manifest_path(profile_path);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(io_at(&path)(e)),
        };
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(&raw)?)
    }

    pub async fn save_installed(&self, profile_path: &Path) -> LauncherResult<()> {
        tokio::fs::create_dir_all(profile_path)
            .await
            .map_err(io_at(profile_path))?;
        let path = Self::manifest_path(profile_path);
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(&path, json).await.map_err(io_at(&path))
    }

    pub fn validate(&self) -> LauncherResult<()> {
        self.mods.iter().try_for_each(ModInstance::validate)
    }

    /// Initializers run only if the previous pack never applied any.
    pub fn initialize_due(&self, previous: &ModPack) -> bool {
        self.initialize.is_some()
            && previous
                .initialize
                .as_ref()
                .map_or(true, |old| old.updated_at.is_none())
    }

    /// Overrides run when the previous pack's timestamp is older.
    pub fn overrides_due(&self, previous: &ModPack) -> bool {
        match (&self.overrides, &previous.overrides) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(new), Some(old)) => old.updated_at < new.updated_at,
        }
    }
}

/// A downloaded pack zip. The file is removed when the bundle is dropped.
#[derive(Debug)]
pub struct PackBundle {
    path: PathBuf,
}

impl PackBundle {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read `manifest.json` at the root of the zip.
    pub async fn read_manifest(self: &Arc<Self>) -> LauncherResult<ModPack> {
        let bundle = Arc::clone(self);
        tokio::task::spawn_blocking(move || read_pack_manifest(&bundle.path))
            .await
            .map_err(|e| LauncherError::Other(format!("Task join error: {}", e)))?
    }

    /// Materialise every file under `prefix` into `profile_path`, stripping
    /// the prefix. `<name>.delete` entries remove `<name>` instead.
    pub async fn apply_tree(
        self: &Arc<Self>,
        prefix: &str,
        profile_path: &Path,
    ) -> LauncherResult<usize> {
        let bundle = Arc::clone(self);
        let prefix = prefix.to_string();
        let profile_path = profile_path.to_path_buf();
        tokio::task::spawn_blocking(move || unpack_tree(&bundle.path, &prefix, &profile_path))
            .await
            .map_err(|e| LauncherError::Other(format!("Task join error: {}", e)))?
    }
}

fn read_pack_manifest(zip_path: &Path) -> LauncherResult<ModPack> {
    let file = std::fs::File::open(zip_path).map_err(io_at(zip_path))?;
    let mut archive = zip::ZipArchive::new(file)?;
    let mut entry = archive.by_name(PACK_MANIFEST_FILE)?;
    let mut raw = String::new();
    entry.read_to_string(&mut raw).map_err(io_at(zip_path))?;
    Ok(serde_json::from_str(&raw)?)
}

fn unpack_tree(zip_path: &Path, prefix: &str, profile_path: &Path) -> LauncherResult<usize> {
    let file = std::fs::File::open(zip_path).map_err(io_at(zip_path))?;
    let mut archive = zip::ZipArchive::new(file)?;
    let mut touched = 0;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        if entry.is_dir() {
            continue;
        }
        let Some(relative) = entry.name().strip_prefix(prefix).map(str::to_owned) else {
            continue;
        };
        let relative = relative.trim_start_matches('/');
        if relative.is_empty() {
            continue;
        }
        // Reject `..` and absolute names.
        if entry.enclosed_name().is_none()
            || Path::new(relative)
                .components()
                .any(|c| !matches!(c, std::path::Component::Normal(_)))
        {
            warn!("Skipping unsafe pack entry {}", entry.name());
            continue;
        }

        if let Some(target) = relative.strip_suffix(DELETE_SUFFIX) {
            let target = profile_path.join(target);
            match std::fs::remove_file(&target) {
                Ok(()) => debug!("Deleted {:?}", target),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(io_at(&target)(e)),
            }
            touched += 1;
            continue;
        }

        let target = profile_path.join(relative);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(io_at(parent))?;
        }
        let mut out = std::fs::File::create(&target).map_err(io_at(&target))?;
        std::io::copy(&mut entry, &mut out).map_err(io_at(&target))?;
        touched += 1;
    }

    info!("Applied {} pack files from {}", touched, prefix);
    Ok(touched)
}

impl Drop for PackBundle {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            debug!("Could not remove pack bundle {:?}: {}", self.path, e);
        }
    }
}

/// Where a profile's desired mod pack comes from.
#[derive(Debug, Clone)]
pub enum PackSource {
    Inline(ModPack),
    /// `.zip` URLs carry `manifest.json` and the file trees; anything else is plain JSON.
    Url(String),
}

impl PackSource {
    /// Resolve the pack, downloading a bundle zip into the temp dir when needed.
    pub async fn resolve(
        &self,
        client: &reqwest::Client,
        temp_name: &str,
    ) -> LauncherResult<(ModPack, Option<Arc<PackBundle>>)> {
        let url = match self {
            PackSource::Inline(pack) => return Ok((pack.clone(), None)),
            PackSource::Url(url) => url,
        };

        let response = ensure_success(client.get(url).send().await?)?;
        if !is_zip_url(url) {
            let pack: ModPack = response.json().await?;
            return Ok((pack, None));
        }

        let path = std::env::temp_dir().join(format!("{}-{}.zip", temp_name, uuid::Uuid::new_v4()));
        let bytes = response.bytes().await?;
        tokio::fs::write(&path, &bytes).await.map_err(io_at(&path))?;
        let bundle = Arc::new(PackBundle::new(path));
        let pack = bundle.read_manifest().await?;
        info!("Loaded pack bundle {} ({} mods)", url, pack.mods.len());
        Ok((pack, Some(bundle)))
    }
}

fn is_zip_url(url: &str) -> bool {
    let path = url::Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| url.to_string());
    path.to_ascii_lowercase().ends_with(".zip")
}

impl std::fmt::Display for PackSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PackSource::Inline(pack) => write!(f, "inline pack ({} mods)", pack.mods.len()),
            PackSource::Url(url) => f.write_str(url),
        }
    }
}

impl PackSource {
    pub fn from_parts(pack: Option<&ModPack>, url: Option<&str>) -> LauncherResult<Option<Self>> {
        match (pack, url.filter(|u| !u.is_empty())) {
            (Some(pack), _) => Ok(Some(PackSource::Inline(pack.clone()))),
            (None, Some(url)) => {
                url::Url::parse(url)
                    .map_err(|e| LauncherError::Loader(format!("invalid packUrl {}: {}", url, e)))?;
                Ok(Some(PackSource::Url(url.to_string())))
            }
            (None, None) => Ok(None),
        }
    }
}
