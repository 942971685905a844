use std::process::Command;

use tracing::{info, warn};

/// Open `url` in the user's browser. An empty url is ignored.
pub fn open_browser(url: &str) {
    if url.is_empty() {
        return;
    }
    info!("Opening {}", url);
    if let Err(e) = browser_command(url).spawn() {
        warn!("Failed to open browser for {}: {}", url, e);
    }
}

#[cfg(target_os = "windows")]
fn browser_command(url: &str) -> Command {
    let mut cmd = Command::new("rundll32");
    cmd.arg("url.dll,FileProtocolHandler").arg(url);
    cmd
}

#[cfg(target_os = "macos")]
fn browser_command(url: &str) -> Command {
    let mut cmd = Command::new("open");
    cmd.arg(url);
    cmd
}

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
fn browser_command(url: &str) -> Command {
    let mut cmd = Command::new("xdg-open");
    cmd.arg(url);
    cmd
}
