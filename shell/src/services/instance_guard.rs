//! Single-instance guard
//!
//! An exclusive advisory lock on a file in the runtime directory. The holder
//! also writes a small JSON record next to it (pid and bridge URL) so a second
//! instance can ask the first one to bring its window back before exiting.

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use shared::{process_debug, process_info, ProcessId};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ShellError, ShellResult};

/// What the lock holder publishes about itself
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InstanceRecord {
    pub pid: u32,
    #[serde(default)]
    pub bridge_url: Option<String>,
}

pub struct SingleInstanceGuard {
    lock_path: PathBuf,
    record_path: PathBuf,
    lock_file: Option<File>,
}

impl SingleInstanceGuard {
    pub fn new(lock_path: impl Into<PathBuf>) -> Self {
        let lock_path = lock_path.into();
        let record_path = lock_path.with_extension("json");
        Self {
            lock_path,
            record_path,
            lock_file: None,
        }
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    pub fn is_held(&self) -> bool {
        self.lock_file.is_some()
    }

    /// Try to become the only instance. `Ok(false)` means another process
    /// holds the lock.
    pub fn acquire(&mut self) -> ShellResult<bool> {
        if self.is_held() {
            return Ok(true);
        }

        if let Some(parent) = self.lock_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&self.lock_path)?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                self.lock_file = Some(file);
                self.write_record(None)?;
                process_debug!(ProcessId::current(), "🔒 Acquired instance lock {}", self.lock_path.display());
                Ok(true)
            }
            Err(e) if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => {
                process_info!(ProcessId::current(), "Another instance holds {}", self.lock_path.display());
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Like `acquire`, but keeps trying for `wait` (a relaunched binary whose
    /// predecessor is still shutting down)
    pub async fn acquire_within(&mut self, wait: Duration) -> ShellResult<bool> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            if self.acquire()? {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }

    /// Publish the bridge URL for later instances
    pub fn record_bridge(&self, bridge_url: &str) -> ShellResult<()> {
        self.write_record(Some(bridge_url.to_string()))
    }

    /// Record written by whoever holds the lock, if readable
    pub fn holder(&self) -> Option<InstanceRecord> {
        let raw = fs::read_to_string(&self.record_path).ok()?;
        serde_json::from_str(&raw).ok()
    }

    pub fn release(&mut self) {
        if let Some(file) = self.lock_file.take() {
            let _ = fs::remove_file(&self.record_path);
            let _ = FileExt::unlock(&file);
            process_debug!(ProcessId::current(), "🔓 Released instance lock {}", self.lock_path.display());
        }
    }

    fn write_record(&self, bridge_url: Option<String>) -> ShellResult<()> {
        if !self.is_held() {
            return Err(ShellError::InstanceLocked);
        }
        let record = InstanceRecord {
            pid: std::process::id(),
            bridge_url,
        };
        fs::write(&self.record_path, serde_json::to_vec(&record)?)?;
        Ok(())
    }
}

impl Drop for SingleInstanceGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// Ask the running instance to show its window. Best-effort.
pub async fn request_activation(record: &InstanceRecord, timeout: Duration) -> ShellResult<()> {
    let bridge = record
        .bridge_url
        .as_deref()
        .ok_or_else(|| ShellError::bridge(format!("instance {} has not published a bridge", record.pid)))?;

    let client = reqwest::Client::builder()
        .timeout(timeout)
        .no_proxy()
        .build()
        .map_err(|e| ShellError::bridge(e.to_string()))?;

    let url = format!("{}/api/window/activate", bridge.trim_end_matches('/'));
    let response = client
        .post(&url)
        .send()
        .await
        .map_err(|e| ShellError::bridge(format!("activation request failed: {e}")))?;

    if response.status().is_success() {
        Ok(())
    } else {
        Err(ShellError::bridge(format!("activation rejected: HTTP {}", response.status())))
    }
}
