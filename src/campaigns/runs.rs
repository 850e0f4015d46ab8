//! Campaign-scoped cancellation.
//!
//! Every background run (extraction, opener batch) takes a child token of its
//! campaign's token. Cancelling the campaign stops all of them at once.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Registry of per-campaign cancellation tokens.
#[derive(Default)]
pub struct RunRegistry {
    tokens: RwLock<HashMap<String, CancellationToken>>,
}

impl RunRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Token for a new run scoped to `campaign_id`.
    pub async fn token_for(&self, campaign_id: &str) -> CancellationToken {
        let mut tokens = self.tokens.write().await;
        tokens
            .entry(campaign_id.to_string())
            .or_default()
            .child_token()
    }

    /// Cancel every run of a campaign. Returns false if none was registered.
    ///
    /// Runs started afterwards get a fresh token.
    pub async fn cancel_campaign(&self, campaign_id: &str) -> bool {
        match self.tokens.write().await.remove(campaign_id) {
            Some(token) => {
                token.cancel();
                debug!(campaign_id, "Campaign runs cancelled");
                true
            }
            None => false,
        }
    }
}
