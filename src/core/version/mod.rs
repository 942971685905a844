pub mod manifest;
pub mod rules;
pub mod version_file;

pub use manifest::{LatestVersions, VersionEntry, VersionManifest};
pub use rules::{current_arch, current_os_name, features, Environment, OsRule, Rule, RuleAction};
pub use version_file::{
    Argument, ArgumentValue, Arguments, AssetIndexRef, ClientDownloads, ClientManifest,
    DownloadInfo, JavaVersion, Library, LibraryArtifact, LibraryDownloads, Logging,
};
