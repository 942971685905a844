// ─── Setup ───
// Steps that turn a resolved client manifest into an installed game tree.

pub mod context;
pub mod state;
pub mod steps;

pub use context::{ManifestSlot, SetupContext};
pub use state::{QueueProgress, SetupPhase, SetupState, Step};
pub use steps::{
    AssetsDownloadStep, ClientDownloadStep, JavaSetupStep, LibraryDownloadStep, ModDownloadStep,
};
