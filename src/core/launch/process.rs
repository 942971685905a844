// ─── Launch Task ───
// Spawns the game and forwards its output to the log.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::core::error::{LauncherError, LauncherResult};

/// Program, arguments and working directory of one game launch.
#[derive(Debug, Clone)]
pub struct LaunchCommand {
    pub java: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
}

/// A running game. Output is forwarded line by line until the pipes close.
pub struct GameProcess {
    child: Child,
    forwarders: Vec<JoinHandle<()>>,
}

impl LaunchCommand {
    pub fn spawn(&self) -> LauncherResult<GameProcess> {
        std::fs::create_dir_all(&self.working_dir)
            .map_err(crate::core::error::io_at(&self.working_dir))?;

        let mut cmd = Command::new(&self.java);
        cmd.args(&self.args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        configure_platform_spawn(&mut cmd);

        info!("Launching game with Java {:?}", self.java);
        debug!("Command (copy/paste): {}", self.display_for_logs());

        let mut child = cmd
            .spawn()
            .map_err(|e| LauncherError::JavaExecution(e.to_string()))?;

        let mut forwarders = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            forwarders.push(forward_lines(stdout, "stdout"));
        }
        if let Some(stderr) = child.stderr.take() {
            forwarders.push(forward_lines(stderr, "stderr"));
        }
        Ok(GameProcess { child, forwarders })
    }

    fn display_for_logs(&self) -> String {
        std::iter::once(shell_escape(&self.java.to_string_lossy()))
            .chain(self.args.iter().map(|a| shell_escape(a)))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl GameProcess {
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Wait for the game to exit and its output to drain.
    pub async fn wait(mut self) -> LauncherResult<ExitStatus> {
        let status = self
            .child
            .wait()
            .await
            .map_err(|e| LauncherError::JavaExecution(e.to_string()))?;
        for forwarder in self.forwarders {
            let _ = forwarder.await;
        }
        info!("Game exited with {}", status);
        Ok(status)
    }
}

fn forward_lines<R>(reader: R, stream: &'static str) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            info!(target: "game", stream, "{}", line);
        }
    })
}

fn configure_platform_spawn(cmd: &mut Command) {
    #[cfg(target_os = "windows")]
    {
        const CREATE_NO_WINDOW: u32 = 0x0800_0000;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }
    #[cfg(not(target_os = "windows"))]
    {
        let _ = cmd;
    }
}

fn shell_escape(raw: &str) -> String {
    if raw.is_empty() {
        return "\"\"".to_string();
    }

    if raw.chars().all(|ch| {
        ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.' | '/' | ':' | '\\' | '=')
    }) {
        return raw.to_string();
    }

    format!("\"{}\"", raw.replace('"', "\\\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_line_quotes_only_when_needed() {
        let cmd = LaunchCommand {
            java: PathBuf::from("/usr/bin/java"),
            args: vec!["-Xmx2048M".into(), "a b".into(), String::new()],
            working_dir: PathBuf::from("/tmp"),
        };
        assert_eq!(cmd.display_for_logs(), "/usr/bin/java -Xmx2048M \"a b\" \"\"");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn spawned_process_runs_in_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let work = dir.path().join("profile");
        let cmd = LaunchCommand {
            java: PathBuf::from("/bin/sh"),
            args: vec!["-c".into(), "pwd > where.txt; echo hello".into()],
            working_dir: work.clone(),
        };
        let status = cmd.spawn().unwrap().wait().await.unwrap();
        assert!(status.success());
        let written = std::fs::read_to_string(work.join("where.txt")).unwrap();
        assert!(written.trim().ends_with("profile"));
    }
}
