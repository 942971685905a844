// ─── Client Manifest ───
// Per-version Mojang JSON (or a loader's child JSON) with exact upstream field names.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use super::rules::{Environment, Rule};
use crate::core::error::{io_at, LauncherError, LauncherResult};
use crate::core::http::get_json;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClientManifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Arguments>,
    /// Pre-1.13 space separated game arguments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minecraft_arguments: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_index: Option<AssetIndexRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assets: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compliance_level: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downloads: Option<ClientDownloads>,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub java_version: Option<JavaVersion>,
    #[serde(default)]
    pub libraries: Vec<Library>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<Logging>,
    pub main_class: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_launcher_version: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub version_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inherits_from: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Arguments {
    #[serde(default)]
    pub game: Vec<Argument>,
    #[serde(default)]
    pub jvm: Vec<Argument>,
}

/// One entry of `arguments.game` / `arguments.jvm`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Argument {
    Plain(String),
    Conditional {
        rules: Vec<Rule>,
        value: ArgumentValue,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ArgumentValue {
    One(String),
    Many(Vec<String>),
}

impl ArgumentValue {
    pub fn values(&self) -> Vec<&str> {
        match self {
            ArgumentValue::One(v) => vec![v.as_str()],
            ArgumentValue::Many(vs) => vs.iter().map(String::as_str).collect(),
        }
    }
}

impl Argument {
    /// Raw templates this argument contributes on `env`.
    pub fn resolve<'a>(&'a self, env: &Environment) -> Vec<&'a str> {
        match self {
            Argument::Plain(s) => vec![s.as_str()],
            Argument::Conditional { rules, value } if env.allows(rules) => value.values(),
            Argument::Conditional { .. } => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AssetIndexRef {
    pub id: String,
    pub sha1: String,
    pub size: u64,
    #[serde(default)]
    pub total_size: u64,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DownloadInfo {
    #[serde(default)]
    pub sha1: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ClientDownloads {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<DownloadInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_mappings: Option<DownloadInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<DownloadInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_mappings: Option<DownloadInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub windows_server: Option<DownloadInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JavaVersion {
    pub component: String,
    pub major_version: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Logging {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    pub argument: String,
    pub file: LoggingFile,
    #[serde(rename = "type")]
    pub config_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingFile {
    pub id: String,
    pub sha1: String,
    pub size: u64,
    pub url: String,
}

// ─── Libraries ───

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Library {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downloads: Option<LibraryDownloads>,
    /// Maven repository base for entries without `downloads` (older loader JSONs).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub natives: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extract: Option<ExtractRules>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<Rule>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LibraryDownloads {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<LibraryArtifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classifiers: Option<BTreeMap<String, LibraryArtifact>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LibraryArtifact {
    pub path: String,
    #[serde(default)]
    pub sha1: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExtractRules {
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl Library {
    pub fn is_allowed(&self, env: &Environment) -> bool {
        env.allows(&self.rules)
    }

    /// Main artifact, synthesised from the Maven name when `downloads` is absent.
    /// Natives-only entries (`downloads` without `artifact`) have none.
    pub fn artifact(&self) -> Option<LibraryArtifact> {
        if let Some(downloads) = &self.downloads {
            return downloads.artifact.clone();
        }
        let path = maven_path(&self.name)?;
        let url = self
            .url
            .as_deref()
            .map(|base| format!("{}/{}", base.trim_end_matches('/'), path))
            .unwrap_or_default();
        Some(LibraryArtifact {
            path,
            sha1: String::new(),
            size: 0,
            url,
        })
    }

    /// Classifier key of this library's natives on `env`, e.g. `natives-windows`.
    pub fn native_classifier(&self, env: &Environment) -> Option<String> {
        let natives = self.natives.as_ref()?;
        let classifier = natives.get(env.os_name)?;
        let bits = if env.arch.contains("64") { "64" } else { "32" };
        Some(classifier.replace("${arch}", bits))
    }

    /// Native classifier artifact for `env`, if this library ships one.
    pub fn native_artifact(&self, env: &Environment) -> Option<&LibraryArtifact> {
        let classifier = self.native_classifier(env)?;
        self.downloads
            .as_ref()?
            .classifiers
            .as_ref()?
            .get(&classifier)
    }
}

/// `group:artifact:version[:classifier][@ext]` → `group/path/artifact/version/artifact-version[-classifier].ext`
pub fn maven_path(name: &str) -> Option<String> {
    let (coord, ext) = match name.split_once('@') {
        Some((coord, ext)) => (coord, ext),
        None => (name, "jar"),
    };
    let parts: Vec<&str> = coord.split(':').collect();
    let (group, artifact, version, classifier) = match parts.as_slice() {
        [g, a, v] => (*g, *a, *v, None),
        [g, a, v, c] => (*g, *a, *v, Some(*c)),
        _ => return None,
    };
    let file = match classifier {
        Some(c) => format!("{}-{}-{}.{}", artifact, version, c, ext),
        None => format!("{}-{}.{}", artifact, version, ext),
    };
    Some(format!(
        "{}/{}/{}/{}",
        group.replace('.', "/"),
        artifact,
        version,
        file
    ))
}

// ─── Manifest operations ───

impl ClientManifest {
    /// Fetch and parse a client manifest from `url`.
    pub async fn fetch(client: &reqwest::Client, url: &str) -> LauncherResult<Self> {
        let manifest: ClientManifest = get_json(client, url).await?;
        info!("Loaded client manifest {}", manifest.id);
        Ok(manifest)
    }

    pub async fn load(path: &Path) -> LauncherResult<Self> {
        let raw = tokio::fs::read_to_string(path).await.map_err(io_at(path))?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// `versions/<id>/<id>.json`
    pub fn json_path(data_dir: &Path, id: &str) -> PathBuf {
        data_dir
            .join("versions")
            .join(id)
            .join(format!("{}.json", id))
    }

    /// `versions/<id>/<id>.jar`
    pub fn jar_path(&self, data_dir: &Path) -> PathBuf {
        data_dir
            .join("versions")
            .join(&self.id)
            .join(format!("{}.jar", self.id))
    }

    /// Persist pretty-printed next to the client jar.
    pub async fn save(&self, data_dir: &Path) -> LauncherResult<()> {
        let path = Self::json_path(data_dir, &self.id);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(io_at(parent))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(&path, json).await.map_err(io_at(&path))
    }

    pub fn java_component(&self) -> &str {
        self.java_version
            .as_ref()
            .map(|j| j.component.as_str())
            .unwrap_or("jre-legacy")
    }

    /// Game argument templates, falling back to legacy `minecraftArguments`.
    pub fn game_arguments(&self) -> Vec<Argument> {
        match &self.arguments {
            Some(args) => args.game.clone(),
            None => self
                .minecraft_arguments
                .as_deref()
                .unwrap_or_default()
                .split_whitespace()
                .map(|s| Argument::Plain(s.to_string()))
                .collect(),
        }
    }

    pub fn jvm_arguments(&self) -> Vec<Argument> {
        self.arguments
            .as_ref()
            .map(|a| a.jvm.clone())
            .unwrap_or_default()
    }

    /// Apply a child manifest that declares `inheritsFrom: self.id`.
    ///
    /// The result keeps this manifest's asset index, downloads, Java runtime,
    /// logging and timestamps. Arguments and libraries become parent entries
    /// followed by child entries; `mainClass`, `id`, `type` and `inheritsFrom`
    /// come from the child. `self` is never modified.
    pub fn inherits_merge(&self, child: &ClientManifest) -> LauncherResult<ClientManifest> {
        if let Some(parent_of_parent) = &self.inherits_from {
            return Err(LauncherError::InheritsMerge(format!(
                "{} itself inherits from {}",
                self.id, parent_of_parent
            )));
        }
        let Some(wanted) = child.inherits_from.as_deref() else {
            return Err(LauncherError::InheritsMerge(format!(
                "{} does not declare inheritsFrom",
                child.id
            )));
        };
        if wanted != self.id {
            return Err(LauncherError::InheritsMerge(format!(
                "{} inherits from {}, not {}",
                child.id, wanted, self.id
            )));
        }

        let mut merged = self.clone();

        let mut game = self.game_arguments();
        game.extend(child.game_arguments());
        let mut jvm = self.jvm_arguments();
        jvm.extend(child.jvm_arguments());
        merged.arguments = Some(Arguments { game, jvm });
        merged.minecraft_arguments = None;

        merged.libraries.extend(child.libraries.iter().cloned());

        merged.main_class = child.main_class.clone();
        merged.id = child.id.clone();
        merged.version_type = child.version_type.clone();
        merged.inherits_from = child.inherits_from.clone();

        Ok(merged)
    }
}
