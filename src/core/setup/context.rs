use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use crate::core::downloader::{Downloader, TaskQueue};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::state::{Endpoints, LauncherSettings};
use crate::core::version::ClientManifest;

/// Everything a step needs while it runs.
/// Cloned into the background task that drives a setup.
#[derive(Clone)]
pub struct SetupContext {
    pub data_path: PathBuf,
    pub profile_path: PathBuf,
    pub downloader: Downloader,
    pub settings: Arc<LauncherSettings>,
}

impl SetupContext {
    pub fn new(
        data_path: PathBuf,
        profile_path: PathBuf,
        downloader: Downloader,
        settings: Arc<LauncherSettings>,
    ) -> Self {
        Self {
            data_path,
            profile_path,
            downloader,
            settings,
        }
    }

    /// Fresh queue sized by the launcher settings.
    pub fn new_queue(&self) -> TaskQueue {
        TaskQueue::new(self.settings.queue_policy())
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.settings.endpoints
    }

    pub fn client(&self) -> &reqwest::Client {
        self.downloader.client()
    }
}

/// A manifest handed from one step to the next.
///
/// Forge writes the merged manifest here during `forge_install`, and the
/// asset and library steps read it when they start.
#[derive(Clone, Default)]
pub struct ManifestSlot {
    inner: Arc<RwLock<Option<Arc<ClientManifest>>>>,
}

impl ManifestSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(manifest: ClientManifest) -> Self {
        let slot = Self::new();
        slot.set(manifest);
        slot
    }

    pub fn set(&self, manifest: ClientManifest) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(manifest));
    }

    pub fn peek(&self) -> Option<Arc<ClientManifest>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn get(&self) -> LauncherResult<Arc<ClientManifest>> {
        self.peek()
            .ok_or(LauncherError::NotReady("client manifest has not been resolved"))
    }
}
