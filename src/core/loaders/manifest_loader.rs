use serde::{Deserialize, Serialize};

use super::forge::ForgeTarget;
use crate::core::error::LauncherResult;
use crate::core::mods::{ModPack, PackSource};

/// How a profile's game is assembled, tagged by `loaderType`.
/// Unknown tags fail to parse.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "loaderType", rename_all = "lowercase")]
pub enum ManifestLoader {
    Vanilla {
        version: String,
    },
    Forge {
        version: String,
        #[serde(rename = "forgeVersion")]
        forge_version: String,
        /// `.zip` bundle or plain JSON mod list.
        #[serde(rename = "packUrl", default, skip_serializing_if = "Option::is_none")]
        pack_url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pack: Option<ModPack>,
    },
}

impl ManifestLoader {
    pub fn vanilla(version: impl Into<String>) -> Self {
        ManifestLoader::Vanilla {
            version: version.into(),
        }
    }

    pub fn forge(version: impl Into<String>, forge_version: impl Into<String>) -> Self {
        ManifestLoader::Forge {
            version: version.into(),
            forge_version: forge_version.into(),
            pack_url: None,
            pack: None,
        }
    }

    /// Minecraft version.
    pub fn version(&self) -> &str {
        match self {
            ManifestLoader::Vanilla { version } | ManifestLoader::Forge { version, .. } => version,
        }
    }

    /// `<v>` for vanilla, `<v>-<forge>` for Forge.
    pub fn version_name(&self) -> String {
        match self {
            ManifestLoader::Vanilla { version } => version.clone(),
            ManifestLoader::Forge {
                version,
                forge_version,
                ..
            } => format!("{}-{}", version, forge_version),
        }
    }

    pub fn forge_target(&self) -> Option<ForgeTarget> {
        match self {
            ManifestLoader::Vanilla { .. } => None,
            ManifestLoader::Forge {
                version,
                forge_version,
                ..
            } => Some(ForgeTarget::new(version, forge_version)),
        }
    }

    /// Where the mod pack comes from; inline `pack` wins over `packUrl`.
    pub fn pack_source(&self) -> LauncherResult<Option<PackSource>> {
        match self {
            ManifestLoader::Vanilla { .. } => Ok(None),
            ManifestLoader::Forge { pack, pack_url, .. } => {
                PackSource::from_parts(pack.as_ref(), pack_url.as_deref())
            }
        }
    }
}
