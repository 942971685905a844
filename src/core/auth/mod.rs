pub mod account;
pub mod browser;
pub mod session;

pub use account::{
    AccountClient, EntitlementVerifier, GameCredential, GameProfile, MinecraftAccount,
    MOJANG_PUBLIC_KEY,
};
pub use browser::open_browser;
pub use session::{AuthPhase, AuthSession, DeviceCode, MsaToken, REQUIRED_SCOPES};
