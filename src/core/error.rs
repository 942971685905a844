use std::path::PathBuf;
use thiserror::Error;

/// Central error type for the launcher core.
/// Every module returns `Result<T, LauncherError>`.
///
/// Task queues retry whatever a task returns; everything else surfaces as is.
#[derive(Debug, Error)]
pub enum LauncherError {
    // ── IO ──────────────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    // ── Network ─────────────────────────────────────────
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Download failed for {url}: HTTP {status}")]
    DownloadFailed { url: String, status: u16 },

    // ── Integrity ───────────────────────────────────────
    #[error("SHA-1 mismatch for {path:?}: expected {expected}, got {actual}")]
    Sha1Mismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("Size mismatch for {path:?}: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    // ── JSON ────────────────────────────────────────────
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ── Archive ─────────────────────────────────────────
    #[error("Zip extraction error: {0}")]
    Zip(#[from] zip::result::ZipError),

    // ── Authentication ──────────────────────────────────
    #[error("{step} failed: {message}")]
    AuthStep { step: AuthStep, message: String },

    #[error("Sign-in did not grant the required scopes (missing: {missing:?})")]
    MissingScopes { missing: Vec<String> },

    #[error("Xbox Live rejected the account (XErr {code}): {message}")]
    XstsRemediation {
        code: u64,
        message: String,
        redirect: Option<String>,
    },

    #[error("No game entitlement found on this account")]
    EntitlementMissing,

    #[error("Entitlement signature is invalid: {0}")]
    EntitlementSignature(#[source] jsonwebtoken::errors::Error),

    #[error("Entitlement verification key is unusable: {0}")]
    EntitlementKey(#[source] jsonwebtoken::errors::Error),

    // ── Data ────────────────────────────────────────────
    #[error("Unsupported profile version {found} (expected {expected})")]
    ProfileVersion { found: u32, expected: u32 },

    #[error("Invalid profile source {0}")]
    ProfileSource(String),

    #[error("Profile {name} not found in {source_url}")]
    ProfileNotFound { name: String, source_url: String },

    #[error("Cannot merge manifests: {0}")]
    InheritsMerge(String),

    #[error("Minecraft version {0} not found in version list")]
    VersionNotFound(String),

    #[error("No Java runtime {component} published for {platform}")]
    RuntimeNotFound { component: String, platform: String },

    #[error("Loader error: {0}")]
    Loader(String),

    #[error("Mod provider error: {0}")]
    ModProvider(String),

    // ── Precondition ────────────────────────────────────
    #[error("Not ready: {0}")]
    NotReady(&'static str),

    #[error("Microsoft account authentication failed, please sign in again")]
    ReloginRequired(#[source] Box<LauncherError>),

    // ── Java ────────────────────────────────────────────
    #[error("Java execution failed: {0}")]
    JavaExecution(String),

    // ── Generic ─────────────────────────────────────────
    #[error("{0}")]
    Other(String),
}

/// Hop of the sign-in chain an [`LauncherError::AuthStep`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStep {
    DeviceCode,
    TokenPoll,
    XboxLive,
    Xsts,
    GameLogin,
    Entitlements,
    GameProfile,
}

impl std::fmt::Display for AuthStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            AuthStep::DeviceCode => "Device code request",
            AuthStep::TokenPoll => "Token polling",
            AuthStep::XboxLive => "Xbox Live authentication",
            AuthStep::Xsts => "XSTS authorization",
            AuthStep::GameLogin => "Minecraft login",
            AuthStep::Entitlements => "Entitlement lookup",
            AuthStep::GameProfile => "Minecraft profile lookup",
        };
        f.write_str(label)
    }
}

impl LauncherError {
    pub fn auth(step: AuthStep, message: impl Into<String>) -> Self {
        LauncherError::AuthStep {
            step,
            message: message.into(),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type LauncherResult<T> = Result<T, LauncherError>;

impl From<std::io::Error> for LauncherError {
    fn from(source: std::io::Error) -> Self {
        LauncherError::Io {
            path: PathBuf::new(),
            source,
        }
    }
}

/// Attach a path to an IO error, `map_err(io_at(&path))`.
pub fn io_at(path: &std::path::Path) -> impl FnOnce(std::io::Error) -> LauncherError + '_ {
    move |source| LauncherError::Io {
        path: path.to_path_buf(),
        source,
    }
}
