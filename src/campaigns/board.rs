//! Campaign board: in-memory, optimistically updated campaign lists with
//! broadcast of every change.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info};

use super::model::{BoardEvent, Campaign, SyncState};

/// Default broadcast channel capacity.
const DEFAULT_BROADCAST_CAPACITY: usize = 256;

/// One campaign as currently shown, plus whether the store has confirmed it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoardEntry {
    pub campaign: Campaign,
    pub sync: SyncState,
}

/// Per-owner campaign lists, newest first.
///
/// Every mutation replaces whole entries; readers never observe a partially
/// updated campaign.
pub struct CampaignBoard {
    entries: RwLock<HashMap<String, Vec<BoardEntry>>>,
    tx: broadcast::Sender<BoardEvent>,
}

impl CampaignBoard {
    /// Create an empty board.
    pub fn new() -> Arc<Self> {
        let (tx, _rx) = broadcast::channel(DEFAULT_BROADCAST_CAPACITY);
        Arc::new(Self {
            entries: RwLock::new(HashMap::new()),
            tx,
        })
    }

    /// Subscribe to board events.
    pub fn subscribe(&self) -> broadcast::Receiver<BoardEvent> {
        self.tx.subscribe()
    }

    /// Show a campaign before its store writes have resolved.
    pub async fn insert_pending(&self, campaign: Campaign) {
        self.upsert(campaign, SyncState::PendingLocal).await;
    }

    /// Mark a campaign as matching the store.
    pub async fn confirm(&self, campaign: Campaign) {
        self.upsert(campaign, SyncState::Confirmed).await;
    }

    /// Replace an optimistic entry with the last state the store acknowledged.
    pub async fn roll_back(&self, acknowledged: Campaign) {
        debug!(
            campaign_id = %acknowledged.id,
            leads = acknowledged.lead_count(),
            "Rolling back optimistic campaign entry"
        );
        self.upsert(acknowledged, SyncState::Confirmed).await;
    }

    async fn upsert(&self, campaign: Campaign, sync: SyncState) {
        let event = BoardEvent::CampaignUpserted {
            campaign: campaign.clone(),
            sync,
        };
        {
            let mut entries = self.entries.write().await;
            let list = entries.entry(campaign.owner_id.clone()).or_default();
            let entry = BoardEntry { campaign, sync };
            match list.iter_mut().find(|e| e.campaign.id == entry.campaign.id) {
                Some(existing) => *existing = entry,
                None => list.insert(0, entry),
            }
        }

        // Broadcast; ok if no receivers are listening yet
        let _ = self.tx.send(event);
    }

    /// Remove a campaign. Returns false if it was not on the board.
    pub async fn remove(&self, owner_id: &str, campaign_id: &str) -> bool {
        let removed = {
            let mut entries = self.entries.write().await;
            match entries.get_mut(owner_id) {
                Some(list) => {
                    let before = list.len();
                    list.retain(|e| e.campaign.id != campaign_id);
                    list.len() != before
                }
                None => false,
            }
        };

        if removed {
            let _ = self.tx.send(BoardEvent::CampaignRemoved {
                owner_id: owner_id.to_string(),
                id: campaign_id.to_string(),
            });
        }
        removed
    }

    /// Replace an owner's list with the store's view.
    ///
    /// Pending entries the store does not know about yet stay on top, so an
    /// in-flight import is not hidden by a concurrent refresh.
    pub async fn reload(&self, owner_id: &str, campaigns: Vec<Campaign>) {
        let mut next: Vec<BoardEntry> = Vec::with_capacity(campaigns.len());
        {
            let mut entries = self.entries.write().await;
            if let Some(current) = entries.get(owner_id) {
                next.extend(
                    current
                        .iter()
                        .filter(|e| e.sync == SyncState::PendingLocal)
                        .filter(|e| !campaigns.iter().any(|c| c.id == e.campaign.id))
                        .cloned(),
                );
            }
            let kept = next.len();
            next.extend(campaigns.iter().cloned().map(|campaign| BoardEntry {
                campaign,
                sync: SyncState::Confirmed,
            }));

            info!(
                owner_id,
                confirmed = campaigns.len(),
                pending = kept,
                "Campaign board reloaded"
            );
            entries.insert(owner_id.to_string(), next);
        }

        let _ = self.tx.send(BoardEvent::Reloaded {
            owner_id: owner_id.to_string(),
            campaigns,
        });
    }

    /// Current entries for an owner, newest first.
    pub async fn entries(&self, owner_id: &str) -> Vec<BoardEntry> {
        self.entries
            .read()
            .await
            .get(owner_id)
            .cloned()
            .unwrap_or_default()
    }

    /// A single entry, if shown.
    pub async fn get(&self, owner_id: &str, campaign_id: &str) -> Option<BoardEntry> {
        self.entries
            .read()
            .await
            .get(owner_id)?
            .iter()
            .find(|e| e.campaign.id == campaign_id)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::campaigns::model::Lead;

    fn campaign(id: &str, owner: &str, leads: usize) -> Campaign {
        Campaign {
            id: id.to_string(),
            name: format!("campaign {id}"),
            owner_id: owner.to_string(),
            niche: String::new(),
            leads: (0..leads)
                .map(|i| Lead::from_username(format!("user{i}")))
                .collect(),
            created_at: Utc::now(),
            version: 0,
        }
    }

    #[tokio::test]
    async fn pending_then_confirmed() {
        let board = CampaignBoard::new();
        let mut rx = board.subscribe();

        board.insert_pending(campaign("c1", "u1", 2)).await;
        let entry = board.get("u1", "c1").await.unwrap();
        assert_eq!(entry.sync, SyncState::PendingLocal);
        assert_eq!(entry.campaign.lead_count(), 2);

        let mut confirmed = campaign("c1", "u1", 2);
        confirmed.version = 1;
        board.confirm(confirmed).await;

        let entries = board.entries("u1").await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].sync, SyncState::Confirmed);
        assert_eq!(entries[0].campaign.version, 1);

        let first = rx.recv().await.unwrap();
        assert!(matches!(
            first,
            BoardEvent::CampaignUpserted {
                sync: SyncState::PendingLocal,
                ..
            }
        ));
        let second = rx.recv().await.unwrap();
        assert!(matches!(
            second,
            BoardEvent::CampaignUpserted {
                sync: SyncState::Confirmed,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn roll_back_restores_acknowledged_state() {
        let board = CampaignBoard::new();
        board.insert_pending(campaign("c1", "u1", 3)).await;
        board.roll_back(campaign("c1", "u1", 0)).await;

        let entry = board.get("u1", "c1").await.unwrap();
        assert_eq!(entry.sync, SyncState::Confirmed);
        assert_eq!(entry.campaign.lead_count(), 0);
    }

    #[tokio::test]
    async fn newest_first_and_owner_scoped() {
        let board = CampaignBoard::new();
        board.confirm(campaign("old", "u1", 0)).await;
        board.confirm(campaign("new", "u1", 0)).await;
        board.confirm(campaign("other", "u2", 0)).await;

        let ids: Vec<_> = board
            .entries("u1")
            .await
            .into_iter()
            .map(|e| e.campaign.id)
            .collect();
        assert_eq!(ids, vec!["new", "old"]);
        assert!(board.get("u2", "old").await.is_none());
    }

    #[tokio::test]
    async fn remove_reports_whether_present() {
        let board = CampaignBoard::new();
        board.confirm(campaign("c1", "u1", 0)).await;

        assert!(board.remove("u1", "c1").await);
        assert!(!board.remove("u1", "c1").await);
        assert!(board.entries("u1").await.is_empty());
    }

    #[tokio::test]
    async fn reload_keeps_unconfirmed_pending_entries() {
        let board = CampaignBoard::new();
        board.confirm(campaign("stale", "u1", 0)).await;
        board.insert_pending(campaign("inflight", "u1", 1)).await;
        board.insert_pending(campaign("stored", "u1", 1)).await;

        board
            .reload("u1", vec![campaign("stored", "u1", 1), campaign("fresh", "u1", 0)])
            .await;

        let entries = board.entries("u1").await;
        let ids: Vec<_> = entries.iter().map(|e| e.campaign.id.as_str()).collect();
        assert_eq!(ids, vec!["inflight", "stored", "fresh"]);
        assert_eq!(entries[0].sync, SyncState::PendingLocal);
        assert_eq!(entries[1].sync, SyncState::Confirmed);
    }
}
