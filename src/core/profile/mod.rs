pub mod model;
pub mod store;

pub use model::{Profile, PublicProfile, CURRENT_PROFILE_VERSION, DEFAULT_MEMORY_MB};
pub use store::{LoadingGuard, ProfileStore};
