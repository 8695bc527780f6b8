use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::interval;

use crate::features::rate_limits::services::RateLimitService;

/// Background worker that deletes aged sliding-log rows and expired blocks
pub struct RateLimitSweeper {
    service: Arc<RateLimitService>,
    period: Duration,
}

impl RateLimitSweeper {
    pub fn new(service: Arc<RateLimitService>, period: Duration) -> Self {
        Self { service, period }
    }

    /// Run the sweeper in a background loop
    pub async fn run(&self) {
        tracing::info!(
            "Starting rate limit sweeper (every {} seconds)",
            self.period.as_secs()
        );

        let mut interval = interval(self.period);

        loop {
            interval.tick().await;
            self.sweep_once().await;
        }
    }

    /// One sweep pass. Failures are logged and retried on the next tick.
    pub async fn sweep_once(&self) {
        match self.service.sweep(Utc::now().timestamp_millis()).await {
            Ok(0) => {}
            Ok(removed) => tracing::debug!("Rate limit sweep removed {} rows", removed),
            Err(e) => tracing::warn!("Rate limit sweep failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::test_helpers::{FailingRateLimitStore, InMemoryRateLimitStore};

    #[tokio::test]
    async fn test_sweep_once_clears_aged_rows() {
        let store = Arc::new(InMemoryRateLimitStore::new());
        store.insert_row("deploy:u:ip", 0);

        let service = Arc::new(RateLimitService::new(store.clone()));
        RateLimitSweeper::new(service, Duration::from_secs(60))
            .sweep_once()
            .await;

        assert_eq!(store.row_count("deploy:u:ip"), 0);
    }

    #[tokio::test]
    async fn test_sweep_once_survives_store_failure() {
        let service = Arc::new(RateLimitService::new(Arc::new(FailingRateLimitStore)));
        RateLimitSweeper::new(service, Duration::from_secs(60))
            .sweep_once()
            .await;
    }
}
