// ─── Launcher Core ───
// Profile-driven launcher backend.
//
// Architecture:
//   core/
//     auth/         Device-code sign-in + Xbox Live / game token chain
//     profile/      Profile records, remote sources, persisted list
//     version/      Mojang version list, client manifests, OS rules
//     downloader/   Retrying task queue + SHA-1 checked downloads
//     assets/       Asset index + object downloads
//     java/         Mojang-published Java runtimes
//     setup/        Step pipeline with per-step progress
//     loaders/      Vanilla / Forge resolution, setup and boot
//     mods/         Mod pack sync (CurseForge, Modrinth, zip bundles)
//     launch/       Classpath, natives, arguments, process
//     state/        Settings and shared application state

pub mod assets;
pub mod auth;
pub mod downloader;
pub mod error;
pub mod http;
pub mod java;
pub mod launch;
pub mod loaders;
pub mod mods;
pub mod profile;
pub mod setup;
pub mod state;
pub mod version;
