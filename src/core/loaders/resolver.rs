// ─── Manifest Resolver ───
// Turns a profile's loader descriptor into a setup pipeline, runs it in the
// background and boots the game once it has finished.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinHandle;
use tracing::{error, info};

use super::forge::forge_setup_step;
use super::manifest_loader::ManifestLoader;
use crate::core::auth::{AccountClient, MinecraftAccount};
use crate::core::downloader::Downloader;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::java::installed_java;
use crate::core::launch::{extract_natives, LaunchRequest};
use crate::core::profile::Profile;
use crate::core::setup::{
    AssetsDownloadStep, ClientDownloadStep, JavaSetupStep, LibraryDownloadStep, ManifestSlot,
    ModDownloadStep, SetupContext, SetupPhase, SetupState, Step,
};
use crate::core::state::LauncherSettings;
use crate::core::version::{ClientManifest, VersionManifest};

/// Build the ordered steps for `loader`.
///
/// `vanilla` must hold the base game manifest by the time the pipeline runs.
/// For Forge, `boot` receives the merged manifest and the asset and library
/// steps read from it.
pub fn build_setup(
    loader: &ManifestLoader,
    vanilla: &ManifestSlot,
    boot: &ManifestSlot,
) -> LauncherResult<SetupState> {
    let mut setup = SetupState::new(
        format!("Preparing Minecraft {}", loader.version_name()),
        "setup",
    );
    setup.add_step(JavaSetupStep::new(vanilla.clone()));
    setup.add_step(ClientDownloadStep::new(vanilla.clone()));

    match loader.forge_target() {
        None => {
            setup.add_step(AssetsDownloadStep::new(vanilla.clone()));
            setup.add_step(LibraryDownloadStep::new(vanilla.clone()));
        }
        Some(target) => {
            setup.add_step(forge_setup_step(target, vanilla.clone(), boot.clone()));
            setup.add_step(AssetsDownloadStep::new(boot.clone()));
            setup.add_step(LibraryDownloadStep::new(boot.clone()));
            if let Some(source) = loader.pack_source()? {
                setup.add_step(ModDownloadStep::new(source, loader.version_name()));
            }
        }
    }
    Ok(setup)
}

struct ResolverInner {
    loader: ManifestLoader,
    downloader: Downloader,
    settings: Arc<LauncherSettings>,
    vanilla: ManifestSlot,
    merged: ManifestSlot,
    setup: Mutex<Option<Arc<SetupState>>>,
    phase: Mutex<SetupPhase>,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Drives setup and boot for one profile.
#[derive(Clone)]
pub struct ManifestResolver {
    inner: Arc<ResolverInner>,
}

impl ManifestResolver {
    pub fn new(loader: ManifestLoader, downloader: Downloader, settings: Arc<LauncherSettings>) -> Self {
        Self {
            inner: Arc::new(ResolverInner {
                loader,
                downloader,
                settings,
                vanilla: ManifestSlot::new(),
                merged: ManifestSlot::new(),
                setup: Mutex::new(None),
                phase: Mutex::new(SetupPhase::NotStarted),
                task: Mutex::new(None),
            }),
        }
    }

    pub fn loader(&self) -> &ManifestLoader {
        &self.inner.loader
    }

    pub fn version_name(&self) -> String {
        self.inner.loader.version_name()
    }

    /// Start preparing the game in the background. Ignored while a setup is
    /// already running; a finished one is replaced.
    pub fn start_setup(&self, data_path: PathBuf, profile_path: PathBuf) {
        {
            let mut phase = self.inner.phase_guard();
            if *phase == SetupPhase::Running {
                info!("Setup for {} already running", self.version_name());
                return;
            }
            *phase = SetupPhase::Running;
        }
        *self.inner.setup_guard() = None;

        let ctx = SetupContext::new(
            data_path,
            profile_path,
            self.inner.downloader.clone(),
            Arc::clone(&self.inner.settings),
        );
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            let outcome = match inner.run_setup(&ctx).await {
                Ok(()) => SetupPhase::Succeeded,
                Err(e) => {
                    error!("Setup for {} failed: {}", inner.loader.version_name(), e);
                    SetupPhase::Failed(e.to_string())
                }
            };
            *inner.phase_guard() = outcome;
        });
        *self.inner.task_guard() = Some(handle);
    }

    /// Wait for the background setup, if one was started.
    pub async fn wait_setup(&self) {
        let handle = self.inner.task_guard().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                *self.inner.phase_guard() = SetupPhase::Failed(format!("setup task aborted: {}", e));
            }
        }
    }

    // ── Polling ──

    pub fn phase(&self) -> SetupPhase {
        self.inner.phase_guard().clone()
    }

    pub fn is_done(&self) -> bool {
        self.inner.phase_guard().is_done()
    }

    pub fn error(&self) -> Option<String> {
        match &*self.inner.phase_guard() {
            SetupPhase::Failed(message) => Some(message.clone()),
            _ => None,
        }
    }

    pub fn current_status(&self) -> String {
        match self.inner.current_setup() {
            Some(setup) => setup.current_status(),
            None if self.phase() == SetupPhase::Running => "Fetching version information".into(),
            None => String::new(),
        }
    }

    /// Progress of the running step.
    pub fn current_progress(&self) -> f32 {
        self.inner
            .current_setup()
            .map_or(0.0, |setup| setup.current_progress())
    }

    /// Mean progress over all steps.
    pub fn total_progress(&self) -> f32 {
        self.inner
            .current_setup()
            .map_or(0.0, |setup| setup.progress())
    }

    /// Step identifiers of the current pipeline, empty before it is built.
    pub fn step_names(&self) -> Vec<String> {
        self.inner
            .current_setup()
            .map(|setup| setup.step_names())
            .unwrap_or_default()
    }

    /// The manifest the game is launched from once setup has succeeded.
    pub fn boot_manifest(&self) -> Option<Arc<ClientManifest>> {
        self.inner.boot_slot().peek()
    }

    // ── Boot ──

    /// Sign in, unpack natives and run the game until it exits.
    pub async fn boot(
        &self,
        data_path: &Path,
        profile: &Profile,
        account: Option<&mut MinecraftAccount>,
        api: &AccountClient<'_>,
    ) -> LauncherResult<()> {
        if self.phase() != SetupPhase::Succeeded {
            return Err(LauncherError::NotReady("setup has not finished"));
        }
        let manifest = self
            .boot_manifest()
            .ok_or(LauncherError::NotReady("client manifest has not been resolved"))?;
        let account = account.ok_or(LauncherError::NotReady("no account signed in"))?;

        let credential = account
            .authenticate(api)
            .await
            .map_err(|e| LauncherError::ReloginRequired(Box::new(e)))?;
        info!("Booting {} as {}", manifest.id, credential.profile.name);

        let java = installed_java(data_path, manifest.java_component())?;
        let request = LaunchRequest {
            data_dir: data_path,
            profile,
            manifest: &manifest,
            credential: &credential,
            memory_mb: profile.actual_memory_mb(),
        };
        extract_natives(data_path, &manifest, &request.environment()).await?;

        let status = request.command(java).spawn()?.wait().await?;
        if !status.success() {
            return Err(LauncherError::JavaExecution(format!("game exited with {}", status)));
        }
        Ok(())
    }
}

impl ResolverInner {
    async fn run_setup(&self, ctx: &SetupContext) -> LauncherResult<()> {
        if self.vanilla.peek().is_none() {
            let version = self.loader.version();
            let versions =
                VersionManifest::fetch(ctx.client(), &ctx.endpoints().version_manifest).await?;
            let entry = versions.find_version(version)?;
            let manifest = ClientManifest::fetch(ctx.client(), &entry.url).await?;
            self.vanilla.set(manifest);
        }

        let setup = Arc::new(build_setup(&self.loader, &self.vanilla, &self.merged)?);
        *self.setup_guard() = Some(Arc::clone(&setup));
        setup.run(ctx).await
    }

    fn boot_slot(&self) -> &ManifestSlot {
        match self.loader {
            ManifestLoader::Vanilla { .. } => &self.vanilla,
            ManifestLoader::Forge { .. } => &self.merged,
        }
    }

    fn current_setup(&self) -> Option<Arc<SetupState>> {
        self.setup_guard().clone()
    }

    fn setup_guard(&self) -> MutexGuard<'_, Option<Arc<SetupState>>> {
        self.setup.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn phase_guard(&self) -> MutexGuard<'_, SetupPhase> {
        self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn task_guard(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.task.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
