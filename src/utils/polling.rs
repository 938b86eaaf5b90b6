/// Wait for a cluster condition with a deadline
use anyhow::Result;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// How long and how often to check a condition
#[derive(Debug, Clone)]
pub struct PollingConfig {
    pub timeout: Duration,
    pub interval: Duration,
    pub description: String,
}

impl PollingConfig {
    pub fn new(timeout: Duration, interval: Duration, description: impl Into<String>) -> Self {
        Self {
            timeout,
            interval,
            description: description.into(),
        }
    }

    /// Check `condition` until it yields a value or the timeout passes.
    ///
    /// `Ok(None)` means "not yet"; an error stops polling immediately.
    pub async fn poll<F, Fut, T>(&self, mut condition: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        info!("{}...", self.description);
        let deadline = Instant::now() + self.timeout;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            if let Some(value) = condition().await? {
                info!("✓ {}", self.description);
                return Ok(value);
            }

            if Instant::now() + self.interval > deadline {
                anyhow::bail!(
                    "Timeout after {:?} ({} attempts): {}",
                    self.timeout,
                    attempt,
                    self.description
                );
            }

            debug!("{}: attempt {} not ready", self.description, attempt);
            tokio::time::sleep(self.interval).await;
        }
    }
}
