use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{info, warn};

use super::model::Profile;
use crate::core::error::{io_at, LauncherResult};

/// The launcher's profile list.
///
/// Owned by [`crate::core::state::AppState`]; every access goes through the
/// internal mutex. The loading flag lets a front end avoid starting two
/// refreshes at once.
pub struct ProfileStore {
    data_dir: PathBuf,
    profiles: Mutex<Vec<Profile>>,
    loading: AtomicBool,
}

/// Clears the loading flag when dropped.
pub struct LoadingGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl ProfileStore {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            profiles: Mutex::new(Vec::new()),
            loading: AtomicBool::new(false),
        }
    }

    /// `None` when another load is already in progress.
    pub fn begin_loading(&self) -> Option<LoadingGuard<'_>> {
        self.loading
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| LoadingGuard {
                flag: &self.loading,
            })
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Acquire)
    }

    /// Replace the list with the contents of `path`. A missing file is an
    /// empty list; a record with an unsupported version fails the whole load.
    pub async fn load_from(&self, path: &Path) -> LauncherResult<usize> {
        let mut loaded: Vec<Profile> = match tokio::fs::read_to_string(path).await {
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(io_at(path)(e)),
        };
        for profile in &mut loaded {
            profile.attach(&self.data_dir)?;
        }
        let count = loaded.len();
        *self.guard() = loaded;
        info!("Loaded {} profiles from {:?}", count, path);
        Ok(count)
    }

    pub async fn save_to(&self, path: &Path) -> LauncherResult<()> {
        let json = serde_json::to_string_pretty(&*self.guard())?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(io_at(parent))?;
        }
        tokio::fs::write(path, json).await.map_err(io_at(path))
    }

    pub fn list(&self) -> Vec<Profile> {
        self.guard().clone()
    }

    pub fn len(&self) -> usize {
        self.guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }

    /// First profile called `name`, whatever its source.
    pub fn find(&self, name: &str) -> Option<Profile> {
        self.guard().iter().find(|p| p.name() == name).cloned()
    }

    /// Insert, or replace the profile with the same `(name, source)`.
    pub fn upsert(&self, mut profile: Profile) -> LauncherResult<()> {
        profile.attach(&self.data_dir)?;
        let mut profiles = self.guard();
        match profiles.iter_mut().find(|p| p.same_identity(&profile)) {
            Some(existing) => *existing = profile,
            None => profiles.push(profile),
        }
        Ok(())
    }

    pub fn remove(&self, name: &str, source: Option<&str>) -> Option<Profile> {
        let mut profiles = self.guard();
        let index = profiles
            .iter()
            .position(|p| p.name() == name && p.source.as_deref() == source)?;
        Some(profiles.remove(index))
    }

    /// Re-fetch every sourced profile. Failures are logged and the stale
    /// copy is kept; returns how many profiles were refreshed.
    pub async fn refresh_sources(&self, client: &reqwest::Client) -> usize {
        let Some(_loading) = self.begin_loading() else {
            warn!("Profile refresh already in progress");
            return 0;
        };

        let snapshot: Vec<Profile> = self
            .list()
            .into_iter()
            .filter(|p| p.source.is_some())
            .collect();
        let mut refreshed = 0;
        for mut profile in snapshot {
            match profile.fetch(client, &self.data_dir).await {
                Ok(()) => match self.upsert(profile) {
                    Ok(()) => refreshed += 1,
                    Err(e) => warn!("Failed to store refreshed profile: {}", e),
                },
                Err(e) => warn!("Keeping cached profile {}: {}", profile.name(), e),
            }
        }
        refreshed
    }

    fn guard(&self) -> MutexGuard<'_, Vec<Profile>> {
        self.profiles.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::profile::PublicProfile;
    use serde_json::json;

    fn public(name: &str, version: &str) -> PublicProfile {
        serde_json::from_value(json!({
            "name": name,
            "manifest": {"loaderType": "vanilla", "version": version},
            "version": 1
        }))
        .unwrap()
    }

    #[test]
    fn upsert_is_keyed_by_name_and_source() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::new(dir.path().to_path_buf());
        store
            .upsert(Profile::local(public("a", "1.20.1"), dir.path()))
            .unwrap();
        store
            .upsert(Profile::local(public("a", "1.21"), dir.path()))
            .unwrap();
        store
            .upsert(
                Profile::sourced(public("a", "1.20.1"), "https://h.example/p.json", dir.path())
                    .unwrap(),
            )
            .unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.find("a").unwrap().manifest().version(), "1.21");
        assert!(store.remove("a", Some("https://h.example/p.json")).is_some());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn save_then_load_restores_paths() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("profiles.json");
        let store = ProfileStore::new(dir.path().to_path_buf());
        store
            .upsert(
                Profile::sourced(public("a", "1.20.1"), "https://h.example/p.json", dir.path())
                    .unwrap(),
            )
            .unwrap();
        store.save_to(&file).await.unwrap();

        let reloaded = ProfileStore::new(dir.path().to_path_buf());
        assert_eq!(reloaded.load_from(&file).await.unwrap(), 1);
        assert_eq!(
            reloaded.find("a").unwrap().path,
            dir.path().join("profiles").join("h.example").join("a")
        );
    }

    #[tokio::test]
    async fn unsupported_record_fails_the_load() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("profiles.json");
        std::fs::write(
            &file,
            json!([
                {"name": "ok", "manifest": {"loaderType": "vanilla", "version": "1.20.1"}, "version": 1},
                {"name": "bad", "manifest": {"loaderType": "vanilla", "version": "1.20.1"}, "version": 7}
            ])
            .to_string(),
        )
        .unwrap();

        let store = ProfileStore::new(dir.path().to_path_buf());
        assert!(store.load_from(&file).await.is_err());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn missing_file_is_an_empty_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::new(dir.path().to_path_buf());
        assert_eq!(store.load_from(&dir.path().join("none.json")).await.unwrap(), 0);
    }

    #[test]
    fn loading_guard_is_exclusive() {
        let store = ProfileStore::new(PathBuf::from("/data"));
        let guard = store.begin_loading();
        assert!(guard.is_some());
        assert!(store.begin_loading().is_none());
        drop(guard);
        assert!(!store.is_loading());
    }
}
