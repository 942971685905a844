use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::core::downloader::DownloadEntry;
use crate::core::error::{io_at, LauncherError, LauncherResult};
use crate::core::java::installed_java;
use crate::core::setup::{ManifestSlot, QueueProgress, SetupContext, SetupState, Step};
use crate::core::version::ClientManifest;

/// Minecraft + Forge version pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForgeTarget {
    pub version: String,
    pub forge_version: String,
}

impl ForgeTarget {
    pub fn new(version: impl Into<String>, forge_version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            forge_version: forge_version.into(),
        }
    }

    /// `<v>-forge-<f>`, the id the installer writes under `versions/`.
    pub fn version_id(&self) -> String {
        format!("{}-forge-{}", self.version, self.forge_version)
    }

    pub fn installer_url(&self, maven_base: &str) -> String {
        let coord = format!("{}-{}", self.version, self.forge_version);
        format!(
            "{}/net/minecraftforge/forge/{}/forge-{}-installer.jar",
            maven_base.trim_end_matches('/'),
            coord,
            coord
        )
    }

    pub fn manifest_path(&self, data_path: &Path) -> PathBuf {
        ClientManifest::json_path(data_path, &self.version_id())
    }

    pub fn is_installed(&self, data_path: &Path) -> bool {
        self.manifest_path(data_path).exists()
    }
}

/// Installer jar handed from `forge_download` to `forge_install`.
/// `None` means nothing was downloaded and the installer must not run.
#[derive(Clone, Default)]
struct InstallerSlot(Arc<Mutex<Option<PathBuf>>>);

impl InstallerSlot {
    fn set(&self, path: PathBuf) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = Some(path);
    }

    fn take(&self) -> Option<PathBuf> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

/// Nested `forge_setup`: `forge_download` then `forge_install`.
/// The merged manifest is written to `merged`.
pub fn forge_setup_step(target: ForgeTarget, vanilla: ManifestSlot, merged: ManifestSlot) -> SetupState {
    let installer = InstallerSlot::default();
    let mut state = SetupState::new("Setting up Forge", "forge_setup");
    state.add_step(ForgeDownloadStep {
        target: target.clone(),
        installer: installer.clone(),
        progress: QueueProgress::default(),
    });
    state.add_step(ForgeInstallStep {
        target,
        vanilla,
        merged,
        installer,
        finished: AtomicBool::new(false),
    });
    state
}

// ─── forge_download ───

pub struct ForgeDownloadStep {
    target: ForgeTarget,
    installer: InstallerSlot,
    progress: QueueProgress,
}

#[async_trait]
impl Step for ForgeDownloadStep {
    fn friendly_name(&self) -> String {
        "Downloading the Forge installer".into()
    }

    fn name(&self) -> String {
        "forge_download".into()
    }

    async fn run(&self, ctx: &SetupContext) -> LauncherResult<()> {
        if self.target.is_installed(&ctx.data_path) {
            info!("Forge {} already installed", self.target.version_id());
            self.progress.finish();
            return Ok(());
        }

        let url = self.target.installer_url(&ctx.endpoints().forge_maven);
        let path = std::env::temp_dir().join(format!(
            "{}-{}-installer.jar",
            self.target.version_id(),
            uuid::Uuid::new_v4()
        ));
        info!("Downloading Forge installer from {}", url);

        let queue = ctx.new_queue();
        ctx.downloader.enqueue(&queue, DownloadEntry::new(url, path.clone()));
        self.progress.drain(queue).await?;
        self.installer.set(path);
        Ok(())
    }

    fn progress(&self) -> f32 {
        self.progress.get()
    }
}

// ─── forge_install ───

pub struct ForgeInstallStep {
    target: ForgeTarget,
    vanilla: ManifestSlot,
    merged: ManifestSlot,
    installer: InstallerSlot,
    finished: AtomicBool,
}

#[async_trait]
impl Step for ForgeInstallStep {
    fn friendly_name(&self) -> String {
        "Installing Forge".into()
    }

    fn name(&self) -> String {
        "forge_install".into()
    }

    async fn run(&self, ctx: &SetupContext) -> LauncherResult<()> {
        let vanilla = self.vanilla.get()?;

        if let Some(installer) = self.installer.take() {
            let java = installed_java(&ctx.data_path, vanilla.java_component())?;
            let result = run_installer(&java, &installer, &ctx.data_path).await;
            if let Err(e) = tokio::fs::remove_file(&installer).await {
                warn!("Failed to remove installer {:?}: {}", installer, e);
            }
            result?;
        } else {
            debug!("No installer downloaded, skipping install");
        }

        let child = ClientManifest::load(&self.target.manifest_path(&ctx.data_path)).await?;
        let merged = vanilla.inherits_merge(&child)?;
        info!("Merged {} onto {}", child.id, vanilla.id);
        self.merged.set(merged);
        self.finished.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn progress(&self) -> f32 {
        if self.finished.load(Ordering::SeqCst) {
            1.0
        } else {
            0.0
        }
    }
}

/// Run the official installer in client mode against `data_path`.
///
/// The installer refuses to run without a `launcher_profiles.json` in the
/// target directory, so an empty one is written for the duration of the run.
pub async fn run_installer(java: &Path, installer: &Path, data_path: &Path) -> LauncherResult<()> {
    let profiles = data_path.join("launcher_profiles.json");
    tokio::fs::create_dir_all(data_path)
        .await
        .map_err(io_at(data_path))?;
    tokio::fs::write(&profiles, br#"{"profiles":{}}"#)
        .await
        .map_err(io_at(&profiles))?;

    let work_dir = installer.parent().unwrap_or(data_path);
    info!("Running Forge installer {:?}", installer);
    let output = tokio::process::Command::new(java)
        .arg("-jar")
        .arg(installer)
        .arg("--installClient")
        .arg(data_path)
        .current_dir(work_dir)
        .output()
        .await;

    if let Err(e) = tokio::fs::remove_file(&profiles).await {
        warn!("Failed to remove {:?}: {}", profiles, e);
    }

    let output = output.map_err(|e| LauncherError::JavaExecution(e.to_string()))?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    debug!("Forge installer output:\n{}", stdout);

    if !output.status.success() {
        return Err(LauncherError::Loader(format!(
            "Forge installer failed (code {:?})\nSTDOUT:\n{}\nSTDERR:\n{}",
            output.status.code(),
            stdout,
            stderr
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::downloader::Downloader;
    use crate::core::state::LauncherSettings;
    use serde_json::json;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ctx(data: &Path) -> SetupContext {
        ctx_with(data, LauncherSettings::default())
    }

    fn ctx_with(data: &Path, settings: LauncherSettings) -> SetupContext {
        SetupContext::new(
            data.to_path_buf(),
            data.join("profile"),
            Downloader::new(reqwest::Client::new()),
            Arc::new(settings),
        )
    }

    #[test]
    fn installer_url_follows_maven_layout() {
        let target = ForgeTarget::new("1.20.1", "47.2.0");
        assert_eq!(target.version_id(), "1.20.1-forge-47.2.0");
        assert_eq!(
            target.installer_url("https://maven.minecraftforge.net/"),
            "https://maven.minecraftforge.net/net/minecraftforge/forge/1.20.1-47.2.0/forge-1.20.1-47.2.0-installer.jar"
        );
    }

    #[tokio::test]
    async fn existing_forge_json_skips_download_and_still_merges() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        let mut settings = LauncherSettings::default();
        settings.endpoints.forge_maven = server.uri();
        let dir = tempfile::tempdir().unwrap();
        let target = ForgeTarget::new("1.20.1", "47.2.0");
        let forge_json = target.manifest_path(dir.path());
        std::fs::create_dir_all(forge_json.parent().unwrap()).unwrap();
        std::fs::write(
            &forge_json,
            json!({
                "id": "1.20.1-forge-47.2.0",
                "inheritsFrom": "1.20.1",
                "mainClass": "cpw.mods.bootstraplauncher.BootstrapLauncher",
                "libraries": [{"name": "net.minecraftforge:fmlloader:1.20.1-47.2.0"}]
            })
            .to_string(),
        )
        .unwrap();

        let vanilla: ClientManifest = serde_json::from_value(json!({
            "id": "1.20.1",
            "mainClass": "net.minecraft.client.main.Main",
            "libraries": [{"name": "com.mojang:logging:1.1.1"}]
        }))
        .unwrap();

        let merged = ManifestSlot::new();
        let state = forge_setup_step(target, ManifestSlot::with(vanilla), merged.clone());
        state.run(&ctx_with(dir.path(), settings)).await.unwrap();

        assert!(server.received_requests().await.unwrap_or_default().is_empty());
        let merged = merged.get().unwrap();
        assert_eq!(merged.main_class, "cpw.mods.bootstraplauncher.BootstrapLauncher");
        assert_eq!(merged.id, "1.20.1-forge-47.2.0");
        assert_eq!(merged.libraries.len(), 2);
        assert_eq!(state.progress(), 1.0);
    }

    #[tokio::test]
    async fn missing_vanilla_manifest_is_not_ready() {
        let dir = tempfile::tempdir().unwrap();
        let target = ForgeTarget::new("1.20.1", "47.2.0");
        let forge_json = target.manifest_path(dir.path());
        std::fs::create_dir_all(forge_json.parent().unwrap()).unwrap();
        std::fs::write(&forge_json, "{}").unwrap();

        let state = forge_setup_step(target, ManifestSlot::new(), ManifestSlot::new());
        let err = state.run(&ctx(dir.path())).await.unwrap_err();
        assert!(matches!(err, LauncherError::NotReady(_)));
    }
}
