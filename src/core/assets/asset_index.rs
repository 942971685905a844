use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::downloader::{DownloadEntry, Downloader, TaskQueue};
use crate::core::error::{io_at, LauncherResult};
use crate::core::version::{AssetIndexRef, ClientManifest};

/// Top-level asset index JSON structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetIndex {
    pub objects: HashMap<String, AssetObject>,
    #[serde(default, rename = "virtual", skip_serializing_if = "std::ops::Not::not")]
    pub is_virtual: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub map_to_resources: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetObject {
    pub hash: String,
    pub size: u64,
}

impl AssetObject {
    /// `<xx>/<hash>`, shared by the object store and the resources host.
    pub fn relative_path(&self) -> String {
        let prefix = self.hash.get(..2).unwrap_or(&self.hash);
        format!("{}/{}", prefix, self.hash)
    }
}

/// Asset index, object and log-config downloads for one client manifest.
pub struct AssetManager;

impl AssetManager {
    pub fn assets_dir(data_dir: &Path) -> PathBuf {
        data_dir.join("assets")
    }

    pub fn index_path(data_dir: &Path, id: &str) -> PathBuf {
        Self::assets_dir(data_dir)
            .join("indexes")
            .join(format!("{}.json", id))
    }

    pub fn object_path(data_dir: &Path, object: &AssetObject) -> PathBuf {
        Self::assets_dir(data_dir)
            .join("objects")
            .join(object.relative_path())
    }

    /// Load the index from `assets/indexes/<id>.json`, downloading it first
    /// when missing or when its hash no longer matches.
    pub async fn fetch_index(
        downloader: &Downloader,
        data_dir: &Path,
        index_ref: &AssetIndexRef,
    ) -> LauncherResult<AssetIndex> {
        let path = Self::index_path(data_dir, &index_ref.id);
        if !Downloader::is_cached(&path, Some(&index_ref.sha1)).await? {
            info!("Downloading asset index {}", index_ref.id);
            let entry = DownloadEntry::new(&index_ref.url, path.clone())
                .with_sha1(&index_ref.sha1)
                .with_size(index_ref.size);
            downloader.download_file(&entry).await?;
        }
        let raw = tokio::fs::read_to_string(&path).await.map_err(io_at(&path))?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Queue every object whose file is missing or has the wrong size.
    /// Returns how many objects were queued.
    pub async fn enqueue_objects(
        downloader: &Downloader,
        queue: &TaskQueue,
        data_dir: &Path,
        resources_base: &str,
        index: &AssetIndex,
    ) -> usize {
        let base = resources_base.trim_end_matches('/');
        let mut queued = 0;

        for object in index.objects.values() {
            let dest = Self::object_path(data_dir, object);
            if let Ok(meta) = tokio::fs::metadata(&dest).await {
                if meta.len() == object.size {
                    continue;
                }
            }

            let url = format!("{}/{}", base, object.relative_path());
            downloader.enqueue(
                queue,
                DownloadEntry::new(url, dest)
                    .with_sha1(&object.hash)
                    .with_size(object.size),
            );
            queued += 1;
        }

        info!(
            "Downloading {} asset objects ({} already cached)",
            queued,
            index.objects.len() - queued
        );
        queued
    }

    /// Queue the client logging configuration into `assets/log_configs/<id>`.
    pub async fn enqueue_log_config(
        downloader: &Downloader,
        queue: &TaskQueue,
        data_dir: &Path,
        manifest: &ClientManifest,
    ) -> LauncherResult<Option<PathBuf>> {
        let Some(config) = manifest.logging.as_ref().and_then(|l| l.client.as_ref()) else {
            return Ok(None);
        };
        let dest = Self::log_config_path(data_dir, &config.file.id);
        if !Downloader::is_cached(&dest, Some(&config.file.sha1)).await? {
            debug!("Queueing log config {}", config.file.id);
            downloader.enqueue(
                queue,
                DownloadEntry::new(&config.file.url, dest.clone())
                    .with_sha1(&config.file.sha1)
                    .with_size(config.file.size),
            );
        }
        Ok(Some(dest))
    }

    pub fn log_config_path(data_dir: &Path, id: &str) -> PathBuf {
        Self::assets_dir(data_dir).join("log_configs").join(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_paths_use_two_char_prefix() {
        let data = Path::new("/data");
        let object = AssetObject {
            hash: "bdf48ef6b5d0d23bbb02e17d04865216179f510a".into(),
            size: 1,
        };
        assert_eq!(
            object.relative_path(),
            "bd/bdf48ef6b5d0d23bbb02e17d04865216179f510a"
        );
        assert_eq!(
            AssetManager::object_path(data, &object),
            Path::new("/data/assets/objects/bd/bdf48ef6b5d0d23bbb02e17d04865216179f510a")
        );
        assert_eq!(
            AssetManager::index_path(data, "5"),
            Path::new("/data/assets/indexes/5.json")
        );
    }

    #[test]
    fn parse_index_with_flags() {
        let index: AssetIndex = serde_json::from_str(
            r#"{"virtual": true, "objects": {"icons/icon_16x16.png": {"hash": "bdf48ef6b5d0d23bbb02e17d04865216179f510a", "size": 3665}}}"#,
        )
        .unwrap();
        assert!(index.is_virtual);
        assert!(!index.map_to_resources);
        assert_eq!(index.objects["icons/icon_16x16.png"].size, 3665);
    }

    #[tokio::test]
    async fn objects_with_matching_size_are_not_queued() {
        let dir = tempfile::tempdir().unwrap();
        let present = AssetObject {
            hash: "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d".into(),
            size: 5,
        };
        let dest = AssetManager::object_path(dir.path(), &present);
        std::fs::create_dir_all(dest.parent().unwrap()).unwrap();
        std::fs::write(&dest, b"hello").unwrap();

        let mut objects = HashMap::new();
        objects.insert("present".to_string(), present);
        objects.insert(
            "missing".to_string(),
            AssetObject {
                hash: "0123456789abcdef0123456789abcdef01234567".into(),
                size: 10,
            },
        );
        let index = AssetIndex {
            objects,
            is_virtual: false,
            map_to_resources: false,
        };

        let downloader = Downloader::new(reqwest::Client::new());
        let queue = TaskQueue::default();
        let queued =
            AssetManager::enqueue_objects(&downloader, &queue, dir.path(), "http://127.0.0.1:9", &index)
                .await;
        assert_eq!(queued, 1);
        assert_eq!(queue.remain(), 1);
    }
}
