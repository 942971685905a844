pub mod model;
pub mod pack;
pub mod sync;

pub use model::{CurseForgeMod, InstalledFile, ModInstance, ModrinthMod};
pub use pack::{InitializeManifest, ModPack, OverridesManifest, PackBundle, PackSource};
pub use sync::{plan, ModAction, ModSynchronizer, PlannedMod, SyncJob};
