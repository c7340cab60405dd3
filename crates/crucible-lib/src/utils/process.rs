#[cfg(windows)]
use std::os::windows::process::CommandExt;

use anyhow::{Context, Result};
use std::process::Stdio;
use tokio::process::Command;

/// Extension trait for spawning pipeline tools without flashing a console
/// window on Windows.
pub trait CrucibleCommandExt {
    /// Hides the console window on Windows. No-op on other platforms.
    fn suppress_console(&mut self) -> &mut Self;
}

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x08000000;

impl CrucibleCommandExt for Command {
    fn suppress_console(&mut self) -> &mut Self {
        #[cfg(windows)]
        {
            self.creation_flags(CREATE_NO_WINDOW);
        }
        self
    }
}

/// Run a command to completion, capturing its output.
/// A non-zero exit status becomes an error carrying stdout and stderr.
pub async fn run_captured(command: &mut Command, label: &str) -> Result<String> {
    command
        .suppress_console()
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    log::debug!("Executing {}: {:?}", label, command);

    let output = command
        .output()
        .await
        .with_context(|| format!("Failed to spawn {}", label))?;

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        log::error!("{} failed:", label);
        log::error!("  stdout: {}", stdout);
        log::error!("  stderr: {}", stderr);
        anyhow::bail!(
            "{} exited with code {:?}: {}",
            label,
            output.status.code(),
            stderr.lines().last().unwrap_or_default()
        );
    }

    Ok(stdout)
}
