//! Error types for lead outreach.

use std::time::Duration;

/// Top-level error type for campaign, outbox and generation actions.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Store error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Generation error: {0}")]
    Generation(#[from] LlmError),

    /// The campaign record was created but attaching its leads failed.
    /// The campaign stays in the store (unless a compensating delete ran).
    #[error("Campaign {campaign_id} was created but its leads could not be saved: {source}")]
    PartialImport {
        campaign_id: String,
        #[source]
        source: DatabaseError,
    },

    #[error("Operation cancelled for campaign {campaign_id}")]
    Cancelled { campaign_id: String },
}

impl Error {
    /// True when the error means the campaign (or message) does not exist for this owner.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::Database(DatabaseError::NotFound { .. })
                | Error::PartialImport {
                    source: DatabaseError::NotFound { .. },
                    ..
                }
        )
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// User input that cannot be turned into a campaign, import or run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Please provide a campaign name.")]
    EmptyCampaignName,

    #[error("Please provide at least one username.")]
    NoUsernames,

    #[error("Could not find a \"username\" or \"handle\" column in the CSV.")]
    MissingCsvColumn,

    #[error("CSV parsing error: {0}")]
    Csv(String),

    #[error("Goal must be at least {min} characters.")]
    GoalTooShort { min: usize },

    #[error("Please provide a target Instagram account.")]
    EmptyTarget,

    #[error("An extraction is already running for campaign {campaign_id}")]
    RunInProgress { campaign_id: String },

    #[error("Campaign {campaign_id} has no leads to start")]
    NoLeads { campaign_id: String },

    #[error("Please provide both lead profile data and a message template.")]
    EmptyPersonalizeInput,
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Concurrent update on {entity} {id}: expected version {expected}, found {found}")]
    Conflict {
        entity: String,
        id: String,
        expected: u64,
        found: u64,
    },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl DatabaseError {
    pub(crate) fn campaign_not_found(id: impl Into<String>) -> Self {
        DatabaseError::NotFound {
            entity: "campaign".to_string(),
            id: id.into(),
        }
    }
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Provider {provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },
}

/// Result type alias for outreach actions.
pub type Result<T> = std::result::Result<T, Error>;
