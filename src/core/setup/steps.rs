use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::context::{ManifestSlot, SetupContext};
use super::state::{QueueProgress, Step};
use crate::core::assets::AssetManager;
use crate::core::downloader::{DownloadEntry, Downloader, TaskQueue};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::java::JavaRuntimeInstaller;
use crate::core::mods::{ModPack, ModSynchronizer, PackSource};
use crate::core::version::{ClientManifest, Environment};

// ─── java_setup ───

pub struct JavaSetupStep {
    manifest: ManifestSlot,
    progress: QueueProgress,
}

impl JavaSetupStep {
    pub fn new(manifest: ManifestSlot) -> Self {
        Self {
            manifest,
            progress: QueueProgress::default(),
        }
    }
}

#[async_trait]
impl Step for JavaSetupStep {
    fn friendly_name(&self) -> String {
        "Setting up the Java runtime".into()
    }

    fn name(&self) -> String {
        "java_setup".into()
    }

    async fn run(&self, ctx: &SetupContext) -> LauncherResult<()> {
        let manifest = self.manifest.get()?;
        let queue = ctx.new_queue();
        JavaRuntimeInstaller {
            downloader: &ctx.downloader,
            index_url: &ctx.endpoints().java_runtime_index,
            data_dir: &ctx.data_path,
        }
        .enqueue_install(&queue, manifest.java_component())
        .await?;
        self.progress.drain(queue).await
    }

    fn progress(&self) -> f32 {
        self.progress.get()
    }
}

// ─── client_download ───

pub struct ClientDownloadStep {
    manifest: ManifestSlot,
    progress: QueueProgress,
}

impl ClientDownloadStep {
    pub fn new(manifest: ManifestSlot) -> Self {
        Self {
            manifest,
            progress: QueueProgress::default(),
        }
    }
}

#[async_trait]
impl Step for ClientDownloadStep {
    fn friendly_name(&self) -> String {
        "Downloading the game client".into()
    }

    fn name(&self) -> String {
        "client_download".into()
    }

    async fn run(&self, ctx: &SetupContext) -> LauncherResult<()> {
        let manifest = self.manifest.get()?;
        let client = manifest
            .downloads
            .as_ref()
            .and_then(|d| d.client.as_ref())
            .ok_or_else(|| {
                LauncherError::Loader(format!("{} has no client download", manifest.id))
            })?;

        let queue = ctx.new_queue();
        let jar = manifest.jar_path(&ctx.data_path);
        if !Downloader::is_cached(&jar, Some(&client.sha1)).await? {
            ctx.downloader.enqueue(
                &queue,
                DownloadEntry::new(&client.url, jar)
                    .with_sha1(&client.sha1)
                    .with_size(client.size),
            );
        }
        self.progress.drain(queue).await?;

        manifest.save(&ctx.data_path).await?;
        debug!("Saved client manifest for {}", manifest.id);
        Ok(())
    }

    fn progress(&self) -> f32 {
        self.progress.get()
    }
}

// ─── assets_download ───

pub struct AssetsDownloadStep {
    manifest: ManifestSlot,
    progress: QueueProgress,
}

impl AssetsDownloadStep {
    pub fn new(manifest: ManifestSlot) -> Self {
        Self {
            manifest,
            progress: QueueProgress::default(),
        }
    }
}

#[async_trait]
impl Step for AssetsDownloadStep {
    fn friendly_name(&self) -> String {
        "Downloading assets".into()
    }

    fn name(&self) -> String {
        "assets_download".into()
    }

    async fn run(&self, ctx: &SetupContext) -> LauncherResult<()> {
        let manifest = self.manifest.get()?;
        let queue = ctx.new_queue();

        if let Some(index_ref) = &manifest.asset_index {
            let index = AssetManager::fetch_index(&ctx.downloader, &ctx.data_path, index_ref).await?;
            AssetManager::enqueue_objects(
                &ctx.downloader,
                &queue,
                &ctx.data_path,
                &ctx.endpoints().resources,
                &index,
            )
            .await;
        } else {
            warn!("{} has no asset index", manifest.id);
        }
        AssetManager::enqueue_log_config(&ctx.downloader, &queue, &ctx.data_path, &manifest)
            .await?;

        self.progress.drain(queue).await
    }

    fn progress(&self) -> f32 {
        self.progress.get()
    }
}

// ─── library_download ───

pub struct LibraryDownloadStep {
    manifest: ManifestSlot,
    progress: QueueProgress,
}

impl LibraryDownloadStep {
    pub fn new(manifest: ManifestSlot) -> Self {
        Self {
            manifest,
            progress: QueueProgress::default(),
        }
    }
}

#[async_trait]
impl Step for LibraryDownloadStep {
    fn friendly_name(&self) -> String {
        "Downloading libraries".into()
    }

    fn name(&self) -> String {
        "library_download".into()
    }

    async fn run(&self, ctx: &SetupContext) -> LauncherResult<()> {
        let manifest = self.manifest.get()?;
        let queue = ctx.new_queue();
        let queued = enqueue_libraries(
            &ctx.downloader,
            &queue,
            &ctx.data_path,
            &manifest,
            &Environment::current(),
        )
        .await?;
        info!("Queued {} libraries for {}", queued, manifest.id);
        self.progress.drain(queue).await
    }

    fn progress(&self) -> f32 {
        self.progress.get()
    }
}

/// Queue every rule-allowed artifact and host native classifier that is
/// missing from `<data>/libraries` or fails its hash.
pub async fn enqueue_libraries(
    downloader: &Downloader,
    queue: &TaskQueue,
    data_dir: &Path,
    manifest: &ClientManifest,
    env: &Environment,
) -> LauncherResult<usize> {
    let libraries_dir = data_dir.join("libraries");
    let mut seen = HashSet::new();
    let mut queued = 0;

    for library in manifest.libraries.iter().filter(|l| l.is_allowed(env)) {
        let natives = library.native_artifact(env).cloned();
        for artifact in library.artifact().into_iter().chain(natives) {
            if !seen.insert(artifact.path.clone()) {
                continue;
            }
            let dest = libraries_dir.join(&artifact.path);
            if artifact.url.is_empty() {
                // Generated locally by a loader installer.
                if !dest.exists() {
                    warn!("Library {} has no download url and is missing", library.name);
                }
                continue;
            }
            if Downloader::is_cached(&dest, Some(&artifact.sha1)).await? {
                continue;
            }
            downloader.enqueue(
                queue,
                DownloadEntry::new(&artifact.url, dest)
                    .with_sha1(&artifact.sha1)
                    .with_size(artifact.size),
            );
            queued += 1;
        }
    }
    Ok(queued)
}

// ─── mod_download ───

pub struct ModDownloadStep {
    source: PackSource,
    temp_name: String,
    progress: QueueProgress,
}

impl ModDownloadStep {
    /// `temp_name` prefixes the temp file a zip bundle is downloaded into.
    pub fn new(source: PackSource, temp_name: impl Into<String>) -> Self {
        Self {
            source,
            temp_name: temp_name.into(),
            progress: QueueProgress::default(),
        }
    }
}

#[async_trait]
impl Step for ModDownloadStep {
    fn friendly_name(&self) -> String {
        "Downloading mods".into()
    }

    fn name(&self) -> String {
        "mod_download".into()
    }

    async fn run(&self, ctx: &SetupContext) -> LauncherResult<()> {
        info!("Synchronizing mods from {}", self.source);
        let installed = ModPack::load_installed(&ctx.profile_path).await?;
        let (desired, bundle) = self.source.resolve(ctx.client(), &self.temp_name).await?;

        let queue = ctx.new_queue();
        let job = ModSynchronizer::new(ctx.downloader.clone(), &ctx.settings).prepare(
            &queue,
            &installed,
            desired,
            &ctx.profile_path,
            bundle,
        )?;
        self.progress.drain(queue).await?;
        job.commit().await?;
        Ok(())
    }

    fn progress(&self) -> f32 {
        self.progress.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn libraries_skip_disallowed_cached_and_local_entries() {
        let dir = tempfile::tempdir().unwrap();
        let cached = dir.path().join("libraries/a/cached.jar");
        std::fs::create_dir_all(cached.parent().unwrap()).unwrap();
        std::fs::write(&cached, b"hello").unwrap();

        let manifest: ClientManifest = serde_json::from_value(json!({
            "id": "1.20.1",
            "mainClass": "Main",
            "libraries": [
                {"name": "a:cached:1", "downloads": {"artifact": {"path": "a/cached.jar",
                    "sha1": "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d", "size": 5, "url": "http://x/cached.jar"}}},
                {"name": "a:missing:1", "downloads": {"artifact": {"path": "a/missing.jar",
                    "sha1": "", "size": 0, "url": "http://x/missing.jar"}}},
                {"name": "a:missing:1", "downloads": {"artifact": {"path": "a/missing.jar",
                    "sha1": "", "size": 0, "url": "http://x/missing.jar"}}},
                {"name": "a:local:1", "downloads": {"artifact": {"path": "a/local.jar",
                    "sha1": "", "size": 0, "url": ""}}},
                {"name": "a:nowhere:1", "rules": [{"action": "allow", "os": {"name": "no-such-os"}}],
                 "downloads": {"artifact": {"path": "a/nowhere.jar", "sha1": "", "size": 0, "url": "http://x/n.jar"}}}
            ]
        }))
        .unwrap();

        let queue = TaskQueue::default();
        let queued = enqueue_libraries(
            &Downloader::new(reqwest::Client::new()),
            &queue,
            dir.path(),
            &manifest,
            &Environment::current(),
        )
        .await
        .unwrap();
        assert_eq!(queued, 1);
        assert_eq!(queue.remain(), 1);
    }
}
