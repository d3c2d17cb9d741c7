use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::models::User;
use crate::AppState;

pub struct CleanupService {
    state: Arc<AppState>,
}

impl CleanupService {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Runs forever, one sweep per `interval`.
    pub async fn run_periodically(self, interval: Duration) {
        loop {
            self.run_full_cleanup().await;
            tokio::time::sleep(interval).await;
        }
    }

    pub async fn run_full_cleanup(&self) -> u64 {
        self.cleanup_expired_otps().await
    }

    /// Drops OTP hashes whose expiry has passed so they can never be matched later.
    async fn cleanup_expired_otps(&self) -> u64 {
        match User::clear_expired_otps(&self.state.db.pool, Utc::now()).await {
            Ok(0) => 0,
            Ok(cleared) => {
                info!("Cleared {} expired OTP(s)", cleared);
                cleared
            }
            Err(e) => {
                error!("Failed to clear expired OTPs: {:?}", e);
                0
            }
        }
    }
}
