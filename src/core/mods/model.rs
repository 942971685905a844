use serde::{Deserialize, Serialize};

use crate::core::error::{LauncherError, LauncherResult};

/// One mod of a pack, by provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ModInstance {
    CurseForge(CurseForgeMod),
    Modrinth(ModrinthMod),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CurseForgeMod {
    pub mod_id: u64,
    pub file_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_file_id: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModrinthMod {
    pub project_id: String,
    pub version_id: String,
    pub file_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_version_id: Option<String>,
}

/// What a finished download left on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledFile {
    pub file_name: String,
    /// CurseForge file id or Modrinth version id, as a string.
    pub id: String,
}

impl ModInstance {
    /// Provider-qualified project key, e.g. `curseforge:238222`.
    pub fn key(&self) -> String {
        match self {
            ModInstance::CurseForge(m) => format!("curseforge:{}", m.mod_id),
            ModInstance::Modrinth(m) => format!("modrinth:{}", m.project_id),
        }
    }

    pub fn current_file_name(&self) -> Option<&str> {
        let name = match self {
            ModInstance::CurseForge(m) => m.current_file_name.as_deref(),
            ModInstance::Modrinth(m) => m.current_file_name.as_deref(),
        };
        name.filter(|name| !name.is_empty())
    }

    /// Whether `self` asks for the same file `old` was installed from.
    pub fn same_target(&self, old: &ModInstance) -> bool {
        match (self, old) {
            (ModInstance::CurseForge(new), ModInstance::CurseForge(old)) => {
                new.file_id == old.file_id
            }
            (ModInstance::Modrinth(new), ModInstance::Modrinth(old)) => {
                new.version_id == old.version_id
            }
            _ => false,
        }
    }

    /// Copy the installed-file identity of a skipped entry from its predecessor.
    pub fn inherit_current(&mut self, old: &ModInstance) {
        match (self, old) {
            (ModInstance::CurseForge(new), ModInstance::CurseForge(old)) => {
                new.current_file_name = old.current_file_name.clone();
                new.current_file_id = old.current_file_id;
            }
            (ModInstance::Modrinth(new), ModInstance::Modrinth(old)) => {
                new.current_file_name = old.current_file_name.clone();
                new.current_version_id = old.current_version_id.clone();
            }
            _ => {}
        }
    }

    pub fn record_installed(&mut self, file: &InstalledFile) {
        match self {
            ModInstance::CurseForge(m) => {
                m.current_file_name = Some(file.file_name.clone());
                m.current_file_id = file.id.parse().ok();
            }
            ModInstance::Modrinth(m) => {
                m.current_file_name = Some(file.file_name.clone());
                m.current_version_id = Some(file.id.clone());
            }
        }
    }

    pub fn validate(&self) -> LauncherResult<()> {
        match self {
            ModInstance::CurseForge(m) if m.mod_id == 0 || m.file_id == 0 => Err(
                LauncherError::ModProvider("modId and fileId are required".into()),
            ),
            ModInstance::Modrinth(m)
                if m.project_id.is_empty() || m.version_id.is_empty() || m.file_name.is_empty() =>
            {
                Err(LauncherError::ModProvider(
                    "project_id, version_id and file_name are required".into(),
                ))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tagged_by_provider() {
        let mods: Vec<ModInstance> = serde_json::from_value(json!([
            {"type": "curseforge", "modId": 238222, "fileId": 4712866},
            {"type": "modrinth", "project_id": "AANobbMI", "version_id": "mc1.20.1-0.5.8", "file_name": "sodium.jar"}
        ]))
        .unwrap();
        assert_eq!(mods[0].key(), "curseforge:238222");
        assert_eq!(mods[1].key(), "modrinth:AANobbMI");
        assert!(mods.iter().all(|m| m.validate().is_ok()));
        assert!(mods[0].current_file_name().is_none());

        let back = serde_json::to_value(&mods).unwrap();
        assert_eq!(back[0]["type"], "curseforge");
        assert!(back[0].get("currentFileName").is_none());
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let result: Result<ModInstance, _> =
            serde_json::from_value(json!({"type": "github", "repo": "x"}));
        assert!(result.is_err());
    }

    #[test]
    fn missing_ids_fail_validation() {
        let m: ModInstance =
            serde_json::from_value(json!({"type": "curseforge", "modId": 1, "fileId": 0})).unwrap();
        assert!(matches!(m.validate(), Err(LauncherError::ModProvider(_))));
    }

    #[test]
    fn record_and_inherit_current_identity() {
        let mut old: ModInstance =
            serde_json::from_value(json!({"type": "curseforge", "modId": 1, "fileId": 2})).unwrap();
        old.record_installed(&InstalledFile {
            file_name: "jei.jar".into(),
            id: "2".into(),
        });
        assert_eq!(old.current_file_name(), Some("jei.jar"));

        let mut new = old.clone();
        if let ModInstance::CurseForge(m) = &mut new {
            m.current_file_name = None;
            m.current_file_id = None;
        }
        assert!(new.same_target(&old));
        new.inherit_current(&old);
        assert_eq!(new, old);
    }
}
