//! Configuration types.
//!
//! Everything is read from environment variables at startup. Lookups go
//! through a closure so tests can feed values without touching the process
//! environment.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::{LlmBackend, LlmConfig};

/// Default conversation goal used when a campaign is started without one.
pub const DEFAULT_GOAL: &str = "Book a 15-minute discovery call";

/// What the import controller does when the campaign record was created
/// but appending its leads failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AppendFailurePolicy {
    /// Leave the campaign in place with zero leads and report the failure.
    #[default]
    KeepEmptyCampaign,
    /// Delete the freshly created campaign record before reporting.
    CompensatingDelete,
}

/// How a batch of opener generations is settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchMode {
    /// Every successful generation is written; failures are reported per lead.
    #[default]
    PartialSuccess,
    /// A single failure discards the whole batch and nothing is written.
    AllOrNothing,
}

/// Lead import settings.
#[derive(Debug, Clone, Default)]
pub struct ImportConfig {
    pub append_failure: AppendFailurePolicy,
}

/// Opener batch settings.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Goal used when the caller does not supply one.
    pub default_goal: String,
    /// Minimum goal length after trimming.
    pub min_goal_len: usize,
    /// Per-lead generation timeout.
    pub generation_timeout: Duration,
    /// Maximum in-flight generation calls per batch.
    pub max_concurrent: usize,
    pub mode: BatchMode,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            default_goal: DEFAULT_GOAL.to_string(),
            min_goal_len: 5,
            generation_timeout: Duration::from_secs(30),
            max_concurrent: 4,
            mode: BatchMode::default(),
        }
    }
}

/// Extraction run settings.
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    /// Delay between progress checkpoints.
    pub tick_interval: Duration,
    /// Number of leads produced per run.
    pub lead_count: usize,
    /// Deadline for the lead source once progress reaches 100%.
    pub source_timeout: Duration,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(1500),
            lead_count: 8,
            source_timeout: Duration::from_secs(60),
        }
    }
}

/// Full service configuration.
#[derive(Debug, Clone)]
pub struct OutreachConfig {
    pub db_path: PathBuf,
    pub http_port: u16,
    /// LLM settings. `None` when no API key is configured; generation and
    /// LLM-backed extraction are then unavailable and mock leads are used.
    pub llm: Option<LlmConfig>,
    /// Directory for rolling log files, if file logging is wanted.
    pub log_dir: Option<PathBuf>,
    pub import: ImportConfig,
    pub batch: BatchConfig,
    pub extraction: ExtractionConfig,
}

impl OutreachConfig {
    /// Build config from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let db_path = lookup("OUTREACH_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data/outreach.db"));

        let http_port = parse_or(&lookup, "OUTREACH_HTTP_PORT", 8080u16)?;

        let backend = match lookup("OUTREACH_LLM_BACKEND") {
            Some(raw) => raw.parse::<LlmBackend>().map_err(|message| {
                ConfigError::InvalidValue {
                    key: "OUTREACH_LLM_BACKEND".into(),
                    message,
                }
            })?,
            None => LlmBackend::Anthropic,
        };

        let key_var = match backend {
            LlmBackend::Anthropic => "ANTHROPIC_API_KEY",
            LlmBackend::OpenAi => "OPENAI_API_KEY",
        };
        let llm = lookup(key_var)
            .filter(|k| !k.trim().is_empty())
            .map(|api_key| LlmConfig {
                backend,
                api_key: SecretString::from(api_key),
                model: lookup("OUTREACH_MODEL")
                    .unwrap_or_else(|| backend.default_model().to_string()),
            });

        let batch = BatchConfig {
            default_goal: lookup("OUTREACH_DEFAULT_GOAL")
                .filter(|g| !g.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_GOAL.to_string()),
            generation_timeout: Duration::from_secs(parse_positive_or(
                &lookup,
                "OUTREACH_GENERATION_TIMEOUT_SECS",
                30,
            )?),
            max_concurrent: parse_or(&lookup, "OUTREACH_MAX_CONCURRENT_GENERATIONS", 4usize)?
                .max(1),
            mode: match lookup("OUTREACH_BATCH_MODE").as_deref() {
                None | Some("partial_success") => BatchMode::PartialSuccess,
                Some("all_or_nothing") => BatchMode::AllOrNothing,
                Some(other) => {
                    return Err(ConfigError::InvalidValue {
                        key: "OUTREACH_BATCH_MODE".into(),
                        message: format!("unknown batch mode '{other}'"),
                    });
                }
            },
            ..BatchConfig::default()
        };

        let extraction = ExtractionConfig {
            tick_interval: Duration::from_millis(parse_positive_or(
                &lookup,
                "OUTREACH_EXTRACTION_TICK_MS",
                1500,
            )?),
            lead_count: parse_or(&lookup, "OUTREACH_EXTRACTION_LEAD_COUNT", 8usize)?,
            source_timeout: Duration::from_secs(parse_positive_or(
                &lookup,
                "OUTREACH_EXTRACTION_TIMEOUT_SECS",
                60,
            )?),
        };

        Ok(Self {
            db_path,
            http_port,
            llm,
            log_dir: lookup("OUTREACH_LOG_DIR").map(PathBuf::from),
            import: ImportConfig::default(),
            batch,
            extraction,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}

/// Like [`parse_or`], for durations where zero is meaningless.
fn parse_positive_or<F>(lookup: &F, key: &str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match parse_or(lookup, key, default)? {
        0 => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "must be greater than zero".to_string(),
        }),
        value => Ok(value),
    }
}
