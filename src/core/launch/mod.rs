pub mod args;
pub mod classpath;
pub mod process;

pub use args::{substitute, LaunchRequest, DEFAULT_JVM_ARGS, LAUNCHER_NAME, LAUNCHER_VERSION};
pub use classpath::{build_classpath, classpath_entries, classpath_separator, extract_natives};
pub use process::{GameProcess, LaunchCommand};
