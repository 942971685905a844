pub mod forge;
pub mod manifest_loader;
pub mod resolver;

pub use forge::{forge_setup_step, run_installer, ForgeTarget};
pub use manifest_loader::ManifestLoader;
pub use resolver::{build_setup, ManifestResolver};
