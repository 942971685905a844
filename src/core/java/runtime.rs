// ─── Java Runtime ───
// Installs the Mojang-published Java runtime a client manifest asks for.
//
// Layout: <data>/runtime/<component>/<os>/...  (os = windows | osx | linux)

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::downloader::{DownloadEntry, Downloader, TaskQueue};
use crate::core::error::{io_at, LauncherError, LauncherResult};
use crate::core::http::get_json;
use crate::core::version::{current_arch, current_os_name};

/// `all.json`: platform key → component → published builds.
pub type RuntimeIndex = HashMap<String, HashMap<String, Vec<RuntimeTarget>>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeTarget {
    #[serde(default)]
    pub availability: Option<RuntimeAvailability>,
    pub manifest: RuntimeDownload,
    #[serde(default)]
    pub version: Option<RuntimeVersion>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeAvailability {
    pub group: u32,
    pub progress: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeDownload {
    #[serde(default)]
    pub sha1: String,
    #[serde(default)]
    pub size: u64,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeVersion {
    pub name: String,
    pub released: String,
}

/// Per-build file listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeManifest {
    pub files: HashMap<String, RuntimeEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RuntimeEntry {
    Directory,
    File {
        #[serde(default)]
        executable: bool,
        downloads: RuntimeFileDownloads,
    },
    Link {
        target: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeFileDownloads {
    pub raw: RuntimeDownload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lzma: Option<RuntimeDownload>,
}

/// `all.json` key for the current host.
pub fn platform_key() -> &'static str {
    platform_key_for(current_os_name(), current_arch())
}

pub fn platform_key_for(os: &str, arch: &str) -> &'static str {
    match (os, arch) {
        ("windows", "x86") => "windows-x86",
        ("windows", "aarch64") => "windows-arm64",
        ("windows", _) => "windows-x64",
        ("osx", "aarch64") => "mac-os-arm64",
        ("osx", _) => "mac-os",
        ("linux", "x86") => "linux-i386",
        _ => "linux",
    }
}

pub fn runtime_dir(data_dir: &Path, component: &str) -> PathBuf {
    data_dir
        .join("runtime")
        .join(component)
        .join(current_os_name())
}

/// `bin/java` (`bin/java.exe` on Windows) inside the installed component.
pub fn java_executable_path(data_dir: &Path, component: &str) -> PathBuf {
    let exe = if cfg!(target_os = "windows") {
        "java.exe"
    } else {
        "java"
    };
    runtime_dir(data_dir, component).join("bin").join(exe)
}

/// Like [`java_executable_path`], but fails when the binary is not installed.
pub fn installed_java(data_dir: &Path, component: &str) -> LauncherResult<PathBuf> {
    let path = java_executable_path(data_dir, component);
    if !path.exists() {
        return Err(LauncherError::JavaExecution(format!(
            "java executable not found: {}",
            path.display()
        )));
    }
    Ok(path)
}

pub struct JavaRuntimeInstaller<'a> {
    pub downloader: &'a Downloader,
    pub index_url: &'a str,
    pub data_dir: &'a Path,
}

impl JavaRuntimeInstaller<'_> {
    /// Resolve the build for `component` on this platform.
    pub async fn resolve(&self, component: &str) -> LauncherResult<RuntimeTarget> {
        let index: RuntimeIndex = get_json(self.downloader.client(), self.index_url).await?;
        select_target(&index, platform_key(), component)
    }

    /// Create directories and links now, and queue every missing or corrupt
    /// file on `queue`. Returns the number of queued files.
    pub async fn enqueue_install(
        &self,
        queue: &TaskQueue,
        component: &str,
    ) -> LauncherResult<usize> {
        let target = self.resolve(component).await?;
        info!(
            "Installing Java runtime {} ({})",
            component,
            target
                .version
                .as_ref()
                .map(|v| v.name.as_str())
                .unwrap_or("unknown")
        );
        let manifest: RuntimeManifest =
            get_json(self.downloader.client(), &target.manifest.url).await?;

        let root = runtime_dir(self.data_dir, component);
        let mut queued = 0;
        let mut links = Vec::new();

        for (name, entry) in &manifest.files {
            let path = root.join(name);
            match entry {
                RuntimeEntry::Directory => {
                    tokio::fs::create_dir_all(&path).await.map_err(io_at(&path))?;
                }
                RuntimeEntry::File {
                    executable,
                    downloads,
                } => {
                    let raw = &downloads.raw;
                    let sha1 = (!raw.sha1.is_empty()).then_some(raw.sha1.as_str());
                    if Downloader::is_cached(&path, sha1).await? {
                        continue;
                    }
                    if path.exists() {
                        warn!("Runtime file {} is corrupt, fetching again", name);
                    }
                    let entry = DownloadEntry::new(&raw.url, path)
                        .with_sha1(&raw.sha1)
                        .with_size(raw.size);
                    enqueue_runtime_file(self.downloader, queue, entry, *executable);
                    queued += 1;
                }
                RuntimeEntry::Link { target } => links.push((path, target.clone())),
            }
        }

        // Links last so their parent directories already exist.
        for (path, target) in links {
            create_link(&path, &target)?;
        }

        debug!("Queued {} runtime files for {}", queued, component);
        Ok(queued)
    }
}

fn select_target(
    index: &RuntimeIndex,
    platform: &str,
    component: &str,
) -> LauncherResult<RuntimeTarget> {
    index
        .get(platform)
        .and_then(|components| components.get(component))
        .and_then(|builds| builds.first())
        .cloned()
        .ok_or_else(|| LauncherError::RuntimeNotFound {
            component: component.to_string(),
            platform: platform.to_string(),
        })
}

fn enqueue_runtime_file(
    downloader: &Downloader,
    queue: &TaskQueue,
    entry: DownloadEntry,
    executable: bool,
) {
    let downloader = downloader.clone();
    queue.add_task(move || {
        let downloader = downloader.clone();
        let entry = entry.clone();
        async move {
            downloader.download_file(&entry).await?;
            if executable {
                mark_executable(&entry.dest)?;
            }
            Ok(())
        }
    });
}

fn mark_executable(path: &Path) -> LauncherResult<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(path).map_err(io_at(path))?.permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(path, perms).map_err(io_at(path))?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

fn create_link(path: &Path, target: &str) -> LauncherResult<()> {
    if path.symlink_metadata().is_ok() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_at(parent))?;
    }
    #[cfg(unix)]
    std::os::unix::fs::symlink(target, path).map_err(io_at(path))?;
    #[cfg(not(unix))]
    debug!("Skipping runtime link {:?} -> {}", path, target);
    Ok(())
}
