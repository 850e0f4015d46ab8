//! libSQL backend: async `Database` trait implementation.
//!
//! Leads and outbox lead snapshots are stored as JSON documents in TEXT
//! columns, mirroring the document layout of the records.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::campaigns::model::{Campaign, Lead};
use crate::error::DatabaseError;
use crate::outbox::model::{NewOutboxMessage, OutboxMessage};
use crate::store::migrations;
use crate::store::traits::Database;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        Ok(backend)
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Current version of a campaign, or `None` if it does not exist.
    async fn campaign_version(
        &self,
        owner_id: &str,
        campaign_id: &str,
    ) -> Result<Option<u64>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT version FROM campaigns WHERE id = ?1 AND owner_id = ?2",
                params![campaign_id, owner_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("campaign_version: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let version: i64 = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("campaign_version row: {e}")))?;
                Ok(Some(version as u64))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("campaign_version: {e}"))),
        }
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Canonical timestamp format. Fixed width so TEXT ordering is time ordering.
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Current time, already truncated to what the store keeps.
fn store_now() -> (DateTime<Utc>, String) {
    let stamp = format_datetime(&Utc::now());
    (parse_datetime(&stamp), stamp)
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<String, DatabaseError> {
    serde_json::to_string(value).map_err(|e| DatabaseError::Serialization(e.to_string()))
}

fn from_json<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T, DatabaseError> {
    serde_json::from_str(raw).map_err(|e| DatabaseError::Serialization(e.to_string()))
}

/// Map a libsql Row to a Campaign.
///
/// Column order matches CAMPAIGN_COLUMNS:
/// 0:id, 1:owner_id, 2:name, 3:niche, 4:leads, 5:version, 6:created_at
fn row_to_campaign(row: &libsql::Row) -> Result<Campaign, DatabaseError> {
    let parse = |e: libsql::Error| DatabaseError::Query(format!("campaign row parse: {e}"));
    let leads_json: String = row.get(4).map_err(parse)?;
    let version: i64 = row.get(5).map_err(parse)?;
    let created_str: String = row.get(6).map_err(parse)?;

    Ok(Campaign {
        id: row.get(0).map_err(parse)?,
        owner_id: row.get(1).map_err(parse)?,
        name: row.get(2).map_err(parse)?,
        niche: row.get(3).map_err(parse)?,
        leads: from_json(&leads_json)?,
        created_at: parse_datetime(&created_str),
        version: version as u64,
    })
}

/// Map a libsql Row to an OutboxMessage.
///
/// Column order matches OUTBOX_COLUMNS:
/// 0:id, 1:owner_id, 2:campaign_id, 3:campaign_name, 4:lead, 5:generated_message, 6:created_at
fn row_to_message(row: &libsql::Row) -> Result<OutboxMessage, DatabaseError> {
    let parse = |e: libsql::Error| DatabaseError::Query(format!("outbox row parse: {e}"));
    let lead_json: String = row.get(4).map_err(parse)?;
    let created_str: String = row.get(6).map_err(parse)?;

    Ok(OutboxMessage {
        id: row.get(0).map_err(parse)?,
        owner_id: row.get(1).map_err(parse)?,
        campaign_id: row.get(2).map_err(parse)?,
        campaign_name: row.get(3).map_err(parse)?,
        lead: from_json(&lead_json)?,
        generated_message: row.get(5).map_err(parse)?,
        created_at: parse_datetime(&created_str),
    })
}

async fn collect_messages(mut rows: libsql::Rows) -> Result<Vec<OutboxMessage>, DatabaseError> {
    let mut messages = Vec::new();
    while let Some(row) = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Query(format!("outbox rows: {e}")))?
    {
        messages.push(row_to_message(&row)?);
    }
    Ok(messages)
}

// ── Trait implementation ────────────────────────────────────────────

const CAMPAIGN_COLUMNS: &str = "id, owner_id, name, niche, leads, version, created_at";

const OUTBOX_COLUMNS: &str =
    "id, owner_id, campaign_id, campaign_name, lead, generated_message, created_at";

#[async_trait]
impl Database for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Campaigns ───────────────────────────────────────────────────

    async fn create_campaign(
        &self,
        name: &str,
        owner_id: &str,
    ) -> Result<Campaign, DatabaseError> {
        let id = Uuid::new_v4().to_string();
        let (created_at, stamp) = store_now();

        self.conn()
            .execute(
                "INSERT INTO campaigns (id, owner_id, name, niche, leads, version, created_at, updated_at)
                 VALUES (?1, ?2, ?3, '', '[]', 0, ?4, ?4)",
                params![id.clone(), owner_id, name, stamp],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("create_campaign: {e}")))?;

        debug!(campaign_id = %id, owner_id, "Campaign inserted into DB");
        Ok(Campaign {
            id,
            name: name.to_string(),
            owner_id: owner_id.to_string(),
            niche: String::new(),
            leads: Vec::new(),
            created_at,
            version: 0,
        })
    }

    async fn list_campaigns(&self, owner_id: &str) -> Result<Vec<Campaign>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE owner_id = ?1 ORDER BY created_at DESC, rowid DESC"
                ),
                params![owner_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_campaigns: {e}")))?;

        let mut campaigns = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_campaigns: {e}")))?
        {
            campaigns.push(row_to_campaign(&row)?);
        }
        Ok(campaigns)
    }

    async fn get_campaign(
        &self,
        owner_id: &str,
        campaign_id: &str,
    ) -> Result<Option<Campaign>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE id = ?1 AND owner_id = ?2"),
                params![campaign_id, owner_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_campaign: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_campaign(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_campaign: {e}"))),
        }
    }

    async fn append_leads(
        &self,
        owner_id: &str,
        campaign_id: &str,
        leads: &[Lead],
        expected_version: Option<u64>,
    ) -> Result<u64, DatabaseError> {
        let current = self
            .get_campaign(owner_id, campaign_id)
            .await?
            .ok_or_else(|| DatabaseError::campaign_not_found(campaign_id))?;

        if let Some(expected) = expected_version {
            if expected != current.version {
                return Err(DatabaseError::Conflict {
                    entity: "campaign".into(),
                    id: campaign_id.to_string(),
                    expected,
                    found: current.version,
                });
            }
        }

        let mut merged = current.leads;
        merged.extend_from_slice(leads);
        let next_version = current.version + 1;
        let (_, stamp) = store_now();

        // Compare-and-swap on the version read above.
        let updated = self
            .conn()
            .execute(
                "UPDATE campaigns SET leads = ?1, version = ?2, updated_at = ?3
                 WHERE id = ?4 AND owner_id = ?5 AND version = ?6",
                params![
                    to_json(&merged)?,
                    next_version as i64,
                    stamp,
                    campaign_id,
                    owner_id,
                    current.version as i64,
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("append_leads: {e}")))?;

        if updated == 0 {
            return match self.campaign_version(owner_id, campaign_id).await? {
                Some(found) => Err(DatabaseError::Conflict {
                    entity: "campaign".into(),
                    id: campaign_id.to_string(),
                    expected: current.version,
                    found,
                }),
                None => Err(DatabaseError::campaign_not_found(campaign_id)),
            };
        }

        debug!(
            campaign_id,
            appended = leads.len(),
            total = merged.len(),
            version = next_version,
            "Leads appended"
        );
        Ok(next_version)
    }

    async fn delete_campaign(
        &self,
        owner_id: &str,
        campaign_id: &str,
    ) -> Result<(), DatabaseError> {
        let deleted = self
            .conn()
            .execute(
                "DELETE FROM campaigns WHERE id = ?1 AND owner_id = ?2",
                params![campaign_id, owner_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_campaign: {e}")))?;

        if deleted == 0 {
            return Err(DatabaseError::campaign_not_found(campaign_id));
        }
        info!(campaign_id, owner_id, "Campaign deleted");
        Ok(())
    }

    // ── Outbox ──────────────────────────────────────────────────────

    async fn append_message(
        &self,
        message: &NewOutboxMessage,
    ) -> Result<OutboxMessage, DatabaseError> {
        let id = Uuid::new_v4().to_string();
        let (created_at, stamp) = store_now();

        self.conn()
            .execute(
                "INSERT INTO outbox (id, owner_id, campaign_id, campaign_name, lead, generated_message, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    id.clone(),
                    message.owner_id.as_str(),
                    message.campaign_id.as_str(),
                    message.campaign_name.as_str(),
                    to_json(&message.lead)?,
                    message.generated_message.as_str(),
                    stamp,
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("append_message: {e}")))?;

        debug!(message_id = %id, campaign_id = %message.campaign_id, "Outbox message inserted");
        Ok(OutboxMessage {
            id,
            lead: message.lead.clone(),
            campaign_id: message.campaign_id.clone(),
            campaign_name: message.campaign_name.clone(),
            generated_message: message.generated_message.clone(),
            owner_id: message.owner_id.clone(),
            created_at,
        })
    }

    async fn list_messages(&self, owner_id: &str) -> Result<Vec<OutboxMessage>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {OUTBOX_COLUMNS} FROM outbox WHERE owner_id = ?1 ORDER BY created_at DESC, rowid DESC"
                ),
                params![owner_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_messages: {e}")))?;
        collect_messages(rows).await
    }

    async fn list_messages_for_campaign(
        &self,
        owner_id: &str,
        campaign_id: &str,
    ) -> Result<Vec<OutboxMessage>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {OUTBOX_COLUMNS} FROM outbox WHERE owner_id = ?1 AND campaign_id = ?2 ORDER BY created_at DESC, rowid DESC"
                ),
                params![owner_id, campaign_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_messages_for_campaign: {e}")))?;
        collect_messages(rows).await
    }
}
