//! Applies a downloaded update to this installation
//!
//! On Windows the artifact is an installer and runs detached. Everywhere
//! else the artifact replaces the running executable (the previous binary
//! stays next to it as `.old`) and the new binary is relaunched.

use async_trait::async_trait;
use shared::{process_info, process_warn, ProcessId};
use std::path::{Path, PathBuf};
use std::process::Stdio;

use crate::error::{ShellError, ShellResult};
use crate::traits::Installer;

/// Argument telling a relaunched shell to wait for its predecessor's lock
pub const RELAUNCH_FLAG: &str = "--relaunched";

/// Archive and package formats that cannot stand in for the executable
const PACKAGED_EXTENSIONS: &[&str] = &["zip", "dmg", "pkg", "msi", "exe", "gz", "tar", "deb", "rpm"];

pub struct SelfReplaceInstaller {
    target: PathBuf,
    relaunch: bool,
}

impl SelfReplaceInstaller {
    /// Install over the currently running executable
    pub fn new() -> ShellResult<Self> {
        Ok(Self {
            target: std::env::current_exe()?,
            relaunch: true,
        })
    }

    /// Install over `target` instead (fluent API)
    pub fn with_target(mut self, target: impl Into<PathBuf>) -> Self {
        self.target = target.into();
        self
    }

    /// Skip relaunching after the swap (fluent API)
    pub fn with_relaunch(mut self, relaunch: bool) -> Self {
        self.relaunch = relaunch;
        self
    }

    pub fn backup_path(&self) -> PathBuf {
        self.target.with_extension("old")
    }

    async fn replace_binary(&self, artifact: &Path) -> ShellResult<()> {
        let backup = self.backup_path();
        if tokio::fs::metadata(&backup).await.is_ok() {
            tokio::fs::remove_file(&backup).await?;
        }

        tokio::fs::rename(&self.target, &backup)
            .await
            .map_err(|e| ShellError::install(format!("cannot move {} aside: {e}", self.target.display())))?;

        if let Err(e) = tokio::fs::copy(artifact, &self.target).await {
            // put the original back so the installation keeps working
            if let Err(restore) = tokio::fs::rename(&backup, &self.target).await {
                process_warn!(ProcessId::current(), "Restoring {} failed: {}", self.target.display(), restore);
            }
            return Err(ShellError::install(format!("cannot write {}: {e}", self.target.display())));
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&self.target, std::fs::Permissions::from_mode(0o755)).await?;
        }

        Ok(())
    }

    /// Put the `.old` backup back over the target
    async fn restore_backup(&self) -> ShellResult<()> {
        tokio::fs::rename(self.backup_path(), &self.target)
            .await
            .map_err(|e| ShellError::install(format!("cannot restore {}: {e}", self.target.display())))
    }

    fn relaunch(&self) -> ShellResult<()> {
        let mut args: Vec<String> = std::env::args().skip(1).filter(|arg| arg != RELAUNCH_FLAG).collect();
        args.push(RELAUNCH_FLAG.to_string());

        std::process::Command::new(&self.target)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| ShellError::install(format!("relaunch failed: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl Installer for SelfReplaceInstaller {
    async fn install(&self, artifact: &Path) -> ShellResult<()> {
        if !artifact.is_file() {
            return Err(ShellError::install(format!("artifact missing: {}", artifact.display())));
        }

        if cfg!(target_os = "windows") {
            std::process::Command::new(artifact)
                .stdin(Stdio::null())
                .spawn()
                .map_err(|e| ShellError::install(format!("cannot start installer: {e}")))?;
            process_info!(ProcessId::current(), "📦 Installer started: {}", artifact.display());
            return Ok(());
        }

        if let Some(ext) = packaged_extension(artifact) {
            return Err(ShellError::install(format!(
                "{} is a .{ext} package and cannot replace the executable",
                artifact.display()
            )));
        }

        self.replace_binary(artifact).await?;
        process_info!(
            ProcessId::current(),
            "📦 Replaced {} (previous binary kept as {})",
            self.target.display(),
            self.backup_path().display()
        );

        if self.relaunch {
            if let Err(e) = self.relaunch() {
                match self.restore_backup().await {
                    Ok(()) => {
                        process_warn!(ProcessId::current(), "Relaunch failed, previous binary restored");
                    }
                    Err(restore) => {
                        process_warn!(ProcessId::current(), "{}", restore);
                    }
                }
                return Err(e);
            }
        }
        Ok(())
    }
}

fn packaged_extension(artifact: &Path) -> Option<String> {
    let ext = artifact.extension()?.to_str()?.to_ascii_lowercase();
    PACKAGED_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}
