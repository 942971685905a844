// ─── Mod Synchronizer ───
// Diffs the installed pack against the desired one and queues provider downloads.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Deserialize;
use tracing::{debug, info};

use super::model::{CurseForgeMod, InstalledFile, ModInstance, ModrinthMod};
use super::pack::{ModPack, PackBundle};
use crate::core::downloader::{DownloadEntry, Downloader, TaskQueue};
use crate::core::error::{io_at, LauncherError, LauncherResult};
use crate::core::http::ensure_success;
use crate::core::state::LauncherSettings;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModAction {
    Install,
    /// Remove `old_file` from `mods/`, then install.
    Replace { old_file: String },
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedMod {
    pub key: String,
    pub action: ModAction,
}

/// Decide what happens to every desired mod. Only previous entries with a
/// recorded file name count as installed.
pub fn plan(old: &ModPack, new: &ModPack) -> Vec<PlannedMod> {
    let installed: HashMap<String, &ModInstance> = old
        .mods
        .iter()
        .filter(|m| m.current_file_name().is_some())
        .map(|m| (m.key(), m))
        .collect();

    new.mods
        .iter()
        .map(|desired| {
            let key = desired.key();
            let action = match installed.get(&key) {
                None => ModAction::Install,
                Some(previous) if desired.same_target(previous) => ModAction::Skip,
                Some(previous) => ModAction::Replace {
                    old_file: previous.current_file_name().unwrap_or_default().to_string(),
                },
            };
            PlannedMod { key, action }
        })
        .collect()
}

// ── Provider responses ──────────────────────────────

#[derive(Debug, Deserialize)]
struct CurseForgeFileResponse {
    data: CurseForgeFile,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CurseForgeFile {
    id: u64,
    file_name: String,
    #[serde(default)]
    download_url: Option<String>,
    #[serde(default)]
    hashes: Vec<CurseForgeHash>,
}

#[derive(Debug, Deserialize)]
struct CurseForgeHash {
    value: String,
    algo: u32,
}

#[derive(Debug, Deserialize)]
struct ModrinthVersion {
    id: String,
    #[serde(default)]
    files: Vec<ModrinthFile>,
}

#[derive(Debug, Deserialize)]
struct ModrinthFile {
    url: String,
    filename: String,
    #[serde(default)]
    hashes: BTreeMap<String, String>,
}

/// CurseForge hash algorithm id for SHA-1.
const CURSEFORGE_SHA1: u32 = 1;

#[derive(Clone)]
pub struct ModSynchronizer {
    downloader: Downloader,
    curseforge_api: String,
    modrinth_api: String,
    curseforge_api_key: Option<String>,
}

/// Work queued by [`ModSynchronizer::prepare`], committed once its queue drained.
pub struct SyncJob {
    pack: ModPack,
    installed: Arc<Mutex<HashMap<usize, InstalledFile>>>,
    profile_path: PathBuf,
    bundle: Option<Arc<PackBundle>>,
    downloads: usize,
    deletions: usize,
}

impl ModSynchronizer {
    pub fn new(downloader: Downloader, settings: &LauncherSettings) -> Self {
        Self {
            downloader,
            curseforge_api: settings
                .endpoints
                .curseforge_api
                .trim_end_matches('/')
                .to_string(),
            modrinth_api: settings
                .endpoints
                .modrinth_api
                .trim_end_matches('/')
                .to_string(),
            curseforge_api_key: settings.curseforge_api_key.clone(),
        }
    }

    /// Delete replaced files and queue every download and tree update on
    /// `queue`. Nothing is persisted until [`SyncJob::commit`].
    pub fn prepare(
        &self,
        queue: &TaskQueue,
        old: &ModPack,
        mut new: ModPack,
        profile_path: &Path,
        bundle: Option<Arc<PackBundle>>,
    ) -> LauncherResult<SyncJob> {
        new.validate()?;
        let plan = plan(old, &new);
        let previous: HashMap<String, &ModInstance> =
            old.mods.iter().map(|m| (m.key(), m)).collect();
        let mods_dir = profile_path.join("mods");
        let installed = Arc::new(Mutex::new(HashMap::new()));
        let mut downloads = 0;
        let mut deletions = 0;

        for (index, planned) in plan.iter().enumerate() {
            match &planned.action {
                ModAction::Skip => {
                    debug!("{} is up to date", planned.key);
                    if let Some(previous) = previous.get(&planned.key) {
                        new.mods[index].inherit_current(previous);
                    }
                    continue;
                }
                ModAction::Replace { old_file } => {
                    let stale = mods_dir.join(old_file);
                    info!("Removing old mod file {:?}", stale);
                    match std::fs::remove_file(&stale) {
                        Ok(()) => {}
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                        Err(e) => return Err(io_at(&stale)(e)),
                    }
                    deletions += 1;
                }
                ModAction::Install => info!("New mod {}", planned.key),
            }

            self.enqueue_download(queue, index, new.mods[index].clone(), &mods_dir, &installed)?;
            downloads += 1;
        }

        if let Some(bundle) = &bundle {
            enqueue_trees(queue, old, &new, Arc::clone(bundle), profile_path);
        }

        info!(
            "Mod sync: {} downloads, {} removals, {} unchanged",
            downloads,
            deletions,
            plan.len() - downloads
        );
        Ok(SyncJob {
            pack: new,
            installed,
            profile_path: profile_path.to_path_buf(),
            bundle,
            downloads,
            deletions,
        })
    }

    /// `prepare` + drain + `commit` on a fresh queue.
    pub async fn sync(
        &self,
        queue: &TaskQueue,
        old: &ModPack,
        new: ModPack,
        profile_path: &Path,
        bundle: Option<Arc<PackBundle>>,
    ) -> LauncherResult<ModPack> {
        let job = self.prepare(queue, old, new, profile_path, bundle)?;
        queue.run_to_completion().await?;
        job.commit().await
    }

    fn enqueue_download(
        &self,
        queue: &TaskQueue,
        index: usize,
        instance: ModInstance,
        mods_dir: &Path,
        installed: &Arc<Mutex<HashMap<usize, InstalledFile>>>,
    ) -> LauncherResult<()> {
        if matches!(instance, ModInstance::CurseForge(_)) && self.curseforge_api_key.is_none() {
            return Err(LauncherError::ModProvider(
                "CurseForge API key is not configured".into(),
            ));
        }

        let this = self.clone();
        let mods_dir = mods_dir.to_path_buf();
        let installed = Arc::clone(installed);
        queue.add_task(move || {
            let this = this.clone();
            let instance = instance.clone();
            let mods_dir = mods_dir.clone();
            let installed = Arc::clone(&installed);
            async move {
                let file = match &instance {
                    ModInstance::CurseForge(m) => this.download_curseforge(m, &mods_dir).await?,
                    ModInstance::Modrinth(m) => this.download_modrinth(m, &mods_dir).await?,
                };
                installed
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(index, file);
                Ok(())
            }
        });
        Ok(())
    }

    async fn download_curseforge(
        &self,
        m: &CurseForgeMod,
        mods_dir: &Path,
    ) -> LauncherResult<InstalledFile> {
        let url = format!(
            "{}/v1/mods/{}/files/{}",
            self.curseforge_api, m.mod_id, m.file_id
        );
        let api_key = self.curseforge_api_key.as_deref().unwrap_or_default();
        let response = self
            .downloader
            .client()
            .get(&url)
            .header("x-api-key", api_key)
            .send()
            .await?;
        let file = ensure_success(response)?
            .json::<CurseForgeFileResponse>()
            .await?
            .data;

        if file.file_name.is_empty() {
            return Err(LauncherError::ModProvider(format!(
                "CurseForge file {} has no file name",
                m.file_id
            )));
        }
        let Some(download_url) = file.download_url.filter(|u| !u.is_empty()) else {
            return Err(LauncherError::ModProvider(format!(
                "CurseForge file {} ({}) does not allow third-party downloads",
                m.file_id, file.file_name
            )));
        };
        let sha1 = file
            .hashes
            .iter()
            .find(|h| h.algo == CURSEFORGE_SHA1)
            .map(|h| h.value.clone())
            .unwrap_or_default();

        info!("Downloading mod file {} ({})", file.file_name, file.id);
        let entry = DownloadEntry::new(download_url, mods_dir.join(&file.file_name)).with_sha1(sha1);
        self.downloader.download_file(&entry).await?;
        Ok(InstalledFile {
            file_name: file.file_name,
            id: file.id.to_string(),
        })
    }

    async fn download_modrinth(
        &self,
        m: &ModrinthMod,
        mods_dir: &Path,
    ) -> LauncherResult<InstalledFile> {
        let url = format!(
            "{}/project/{}/version/{}",
            self.modrinth_api, m.project_id, m.version_id
        );
        let response = self.downloader.client().get(&url).send().await?;
        let version: ModrinthVersion = ensure_success(response)?.json().await?;

        let Some(file) = version.files.iter().find(|f| f.filename == m.file_name) else {
            return Err(LauncherError::ModProvider(format!(
                "{} not found in Modrinth version {}",
                m.file_name, m.version_id
            )));
        };
        if file.url.is_empty() {
            return Err(LauncherError::ModProvider(format!(
                "Modrinth file {} has no download url",
                file.filename
            )));
        }

        info!("Downloading mod file {} ({})", file.filename, version.id);
        let sha1 = file.hashes.get("sha1").cloned().unwrap_or_default();
        let entry = DownloadEntry::new(&file.url, mods_dir.join(&file.filename)).with_sha1(sha1);
        self.downloader.download_file(&entry).await?;
        Ok(InstalledFile {
            file_name: file.filename.clone(),
            id: version.id,
        })
    }
}

fn enqueue_trees(
    queue: &TaskQueue,
    old: &ModPack,
    new: &ModPack,
    bundle: Arc<PackBundle>,
    profile_path: &Path,
) {
    let initialize = new
        .initialize_due(old)
        .then(|| new.initialize.as_ref().map(|i| i.initializes.clone()))
        .flatten();
    let overrides = new
        .overrides_due(old)
        .then(|| new.overrides.as_ref().map(|o| o.overrides.clone()))
        .flatten();
    if initialize.is_none() && overrides.is_none() {
        debug!("Pack trees are up to date");
        return;
    }

    let profile_path = profile_path.to_path_buf();
    queue.add_task(move || {
        let bundle = Arc::clone(&bundle);
        let profile_path = profile_path.clone();
        let initialize = initialize.clone();
        let overrides = overrides.clone();
        async move {
            if let Some(prefix) = &initialize {
                info!("Applying pack initializers");
                bundle.apply_tree(prefix, &profile_path).await?;
            }
            if let Some(prefix) = &overrides {
                info!("Applying pack overrides");
                bundle.apply_tree(prefix, &profile_path).await?;
            }
            Ok(())
        }
    });
}

impl SyncJob {
    pub fn downloads(&self) -> usize {
        self.downloads
    }

    pub fn deletions(&self) -> usize {
        self.deletions
    }

    /// Record what was installed and persist the pack as `<profile>/manifest.json`.
    pub async fn commit(self) -> LauncherResult<ModPack> {
        let SyncJob {
            mut pack,
            installed,
            profile_path,
            bundle,
            ..
        } = self;

        let installed = std::mem::take(&mut *installed.lock().unwrap_or_else(PoisonError::into_inner));
        for (index, file) in installed {
            if let Some(instance) = pack.mods.get_mut(index) {
                instance.record_installed(&file);
            }
        }
        pack.save_installed(&profile_path).await?;
        drop(bundle);
        Ok(pack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn installed_modrinth(project: &str, version: &str, file: &str) -> ModInstance {
        serde_json::from_value(json!({
            "type": "modrinth", "project_id": project, "version_id": version,
            "file_name": file, "current_file_name": file, "current_version_id": version
        }))
        .unwrap()
    }

    fn desired_modrinth(project: &str, version: &str, file: &str) -> ModInstance {
        serde_json::from_value(json!({
            "type": "modrinth", "project_id": project, "version_id": version, "file_name": file
        }))
        .unwrap()
    }

    fn pack(mods: Vec<ModInstance>) -> ModPack {
        ModPack {
            mods,
            ..ModPack::default()
        }
    }

    fn synchronizer() -> ModSynchronizer {
        let mut settings = LauncherSettings::default();
        settings.endpoints.modrinth_api = "http://127.0.0.1:9".into();
        ModSynchronizer::new(Downloader::new(reqwest::Client::new()), &settings)
    }

    #[test]
    fn plan_distinguishes_install_replace_skip() {
        let old = pack(vec![
            installed_modrinth("a", "1", "a-1.jar"),
            installed_modrinth("b", "1", "b-1.jar"),
            desired_modrinth("c", "1", "c-1.jar"),
        ]);
        let new = pack(vec![
            desired_modrinth("a", "1", "a-1.jar"),
            desired_modrinth("b", "2", "b-2.jar"),
            desired_modrinth("c", "1", "c-1.jar"),
            desired_modrinth("d", "1", "d-1.jar"),
        ]);

        let actions: Vec<_> = plan(&old, &new).into_iter().map(|p| p.action).collect();
        assert_eq!(
            actions,
            vec![
                ModAction::Skip,
                ModAction::Replace {
                    old_file: "b-1.jar".into()
                },
                // Never recorded as installed.
                ModAction::Install,
                ModAction::Install,
            ]
        );
    }

    #[tokio::test]
    async fn unchanged_pack_downloads_and_deletes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mods_dir = dir.path().join("mods");
        std::fs::create_dir_all(&mods_dir).unwrap();
        std::fs::write(mods_dir.join("a-1.jar"), b"jar").unwrap();

        let old = pack(vec![installed_modrinth("a", "1", "a-1.jar")]);
        let new = pack(vec![desired_modrinth("a", "1", "a-1.jar")]);

        let queue = TaskQueue::default();
        let job = synchronizer()
            .prepare(&queue, &old, new, dir.path(), None)
            .unwrap();
        assert_eq!(job.downloads(), 0);
        assert_eq!(job.deletions(), 0);
        assert_eq!(queue.total(), 0);

        queue.run_to_completion().await.unwrap();
        let saved = job.commit().await.unwrap();
        assert!(mods_dir.join("a-1.jar").exists());
        assert_eq!(saved.mods[0].current_file_name(), Some("a-1.jar"));

        let on_disk = ModPack::load_installed(dir.path()).await.unwrap();
        assert_eq!(on_disk, saved);
    }

    #[test]
    fn version_change_removes_only_the_old_file() {
        let dir = tempfile::tempdir().unwrap();
        let mods_dir = dir.path().join("mods");
        std::fs::create_dir_all(&mods_dir).unwrap();
        std::fs::write(mods_dir.join("a-1.jar"), b"old").unwrap();
        std::fs::write(mods_dir.join("b-1.jar"), b"keep").unwrap();

        let old = pack(vec![
            installed_modrinth("a", "1", "a-1.jar"),
            installed_modrinth("b", "1", "b-1.jar"),
        ]);
        let new = pack(vec![
            desired_modrinth("a", "2", "a-2.jar"),
            desired_modrinth("b", "1", "b-1.jar"),
        ]);

        let queue = TaskQueue::default();
        let job = synchronizer()
            .prepare(&queue, &old, new, dir.path(), None)
            .unwrap();
        assert_eq!(job.deletions(), 1);
        assert_eq!(job.downloads(), 1);
        assert_eq!(queue.total(), 1);
        assert!(!mods_dir.join("a-1.jar").exists());
        assert!(mods_dir.join("b-1.jar").exists());
    }

    #[test]
    fn curseforge_without_api_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let new = pack(vec![serde_json::from_value(
            json!({"type": "curseforge", "modId": 1, "fileId": 2}),
        )
        .unwrap()]);
        let queue = TaskQueue::default();
        let result = synchronizer().prepare(&queue, &ModPack::default(), new, dir.path(), None);
        assert!(matches!(result, Err(LauncherError::ModProvider(_))));
    }
}
