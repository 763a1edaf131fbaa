//! Bounded-retry readiness probe
//!
//! The window opens once the backend answers its liveness endpoint, instead
//! of after a fixed warm-up delay.

use shared::{process_debug, process_warn, BackendProcessHandle, ProcessId};
use std::time::Duration;
use tokio::sync::watch;

use crate::config::ReadinessConfig;
use crate::error::{ShellError, ShellResult};

/// Per-probe request timeout
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Outcome of waiting for the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready { attempts: u32 },
    Exhausted { attempts: u32 },
    /// The launch being probed is no longer live (exited, failed, replaced)
    BackendGone,
}

pub struct ReadinessProbe {
    client: reqwest::Client,
    config: ReadinessConfig,
}

impl ReadinessProbe {
    pub fn new(config: ReadinessConfig) -> ShellResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(PROBE_TIMEOUT)
            .no_proxy()
            .build()
            .map_err(|e| ShellError::transport(format!("failed to build probe client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Probe the backend launched as `generation` until it answers 2xx, the
    /// attempts run out, or the launch stops being live.
    pub async fn wait_ready(&self, backend: &watch::Receiver<BackendProcessHandle>, generation: u64) -> Readiness {
        for attempt in 1..=self.config.attempts {
            let handle = backend.borrow().clone();
            if handle.generation != generation || !handle.is_live() {
                process_warn!(
                    ProcessId::current(),
                    "Backend generation {} went away while waiting for readiness ({:?})",
                    generation,
                    handle.status
                );
                return Readiness::BackendGone;
            }

            if let Some(base) = handle.base_url() {
                let url = format!("{base}{}", self.config.path);
                match self.client.get(&url).send().await {
                    Ok(response) if response.status().is_success() => {
                        process_debug!(ProcessId::current(), "✅ Backend ready after {} probe(s)", attempt);
                        return Readiness::Ready { attempts: attempt };
                    }
                    Ok(response) => {
                        process_debug!(ProcessId::current(), "Probe {} got HTTP {}", attempt, response.status());
                    }
                    Err(e) => {
                        process_debug!(ProcessId::current(), "Probe {} failed: {}", attempt, e);
                    }
                }
            }

            if attempt < self.config.attempts {
                tokio::time::sleep(self.config.interval).await;
            }
        }

        Readiness::Exhausted {
            attempts: self.config.attempts,
        }
    }
}
