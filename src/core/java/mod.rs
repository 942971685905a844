pub mod runtime;

pub use runtime::installed_java;
pub use runtime::java_executable_path;
pub use runtime::platform_key;
pub use runtime::JavaRuntimeInstaller;
pub use runtime::RuntimeManifest;
