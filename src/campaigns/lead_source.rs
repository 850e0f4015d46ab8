//! Lead sources: where an extraction run gets its new leads from.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::LlmError;
use crate::llm::extract_json_object;
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};

use super::import::normalize_username;
use super::model::{Lead, PLACEHOLDER_AVATAR_URL, PLACEHOLDER_POST_IMAGE_URL};

/// Parameters of one extraction run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionRequest {
    /// Bare handle of the account whose followers are wanted.
    pub target_account: String,
    /// Niche of the target account, e.g. "Fitness".
    pub niche: String,
    /// Number of leads to produce.
    pub count: usize,
}

/// Produces the leads attached when an extraction reaches 100%.
#[async_trait]
pub trait LeadSource: Send + Sync {
    async fn produce(&self, request: &ExtractionRequest) -> Result<Vec<Lead>, LlmError>;
}

/// (name, username, bio)
const MOCK_PROFILES: &[(&str, &str, &str)] = &[
    (
        "Alice Johnson",
        "alicej",
        "Photographer & Traveler. Exploring the world one click at a time. DM for collabs!",
    ),
    (
        "Bob Williams",
        "bobw",
        "Fitness coach and nutritionist. Helping you become the best version of yourself. #fitness #health",
    ),
    (
        "Charlie Brown",
        "charlieb",
        "Digital artist and illustrator. Bringing ideas to life with color and pixels. Open for commissions.",
    ),
    (
        "Diana Miller",
        "dianam",
        "Founder @StyleUp. Fashion enthusiast and blogger. Sharing my journey through style.",
    ),
    (
        "Ethan Davis",
        "ethand",
        "Musician and producer. Creating sounds for the soul.",
    ),
    (
        "Fiona Garcia",
        "fionag",
        "Chef and food blogger. On a mission to find the best tacos in the world.",
    ),
    (
        "George Rodriguez",
        "georger",
        "Real estate agent based in Miami. Helping you find your dream home.",
    ),
    (
        "Hannah Wilson",
        "hannahw",
        "Yoga instructor and wellness advocate. Finding balance on and off the mat.",
    ),
];

/// Samples built-in mock profiles. Every produced lead gets a fresh id.
pub struct MockLeadSource {
    rng: Mutex<StdRng>,
}

impl MockLeadSource {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Reproducible sampling for tests.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for MockLeadSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LeadSource for MockLeadSource {
    async fn produce(&self, request: &ExtractionRequest) -> Result<Vec<Lead>, LlmError> {
        let picked: Vec<&(&str, &str, &str)> = {
            let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
            MOCK_PROFILES
                .choose_multiple(&mut *rng, request.count.min(MOCK_PROFILES.len()))
                .collect()
        };

        debug!(
            target_account = %request.target_account,
            count = picked.len(),
            "Sampled mock leads"
        );

        Ok(picked
            .into_iter()
            .map(|(name, username, bio)| Lead {
                id: Uuid::new_v4().to_string(),
                name: name.to_string(),
                username: username.to_string(),
                bio: bio.to_string(),
                avatar_url: PLACEHOLDER_AVATAR_URL.to_string(),
                latest_post_image_url: PLACEHOLDER_POST_IMAGE_URL.to_string(),
            })
            .collect())
    }
}

/// Asks an LLM to invent plausible follower profiles for the target account.
pub struct LlmLeadSource {
    llm: Arc<dyn LlmProvider>,
    temperature: f32,
    max_tokens: u32,
}

impl LlmLeadSource {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            llm,
            temperature: 0.9,
            max_tokens: 2048,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ExtractedLeads {
    #[serde(default)]
    leads: Vec<ExtractedLead>,
}

#[derive(Debug, Deserialize)]
struct ExtractedLead {
    #[serde(default)]
    name: String,
    #[serde(default)]
    username: String,
    #[serde(default)]
    bio: String,
}

#[async_trait]
impl LeadSource for LlmLeadSource {
    async fn produce(&self, request: &ExtractionRequest) -> Result<Vec<Lead>, LlmError> {
        info!(
            target_account = %request.target_account,
            niche = %request.niche,
            count = request.count,
            "Generating leads with LLM"
        );

        let system_prompt = format!(
            "You generate realistic mock Instagram user profiles. The profiles represent \
             followers of a specific account and must be relevant to its niche.\n\n\
             Rules:\n\
             - All usernames are unique and have no '@' prefix\n\
             - All bios are unique, 1-3 sentences, and sound like a real person\n\
             - All names are plausible\n\n\
             Respond with a JSON object of the form:\n\
             {{\"leads\": [{{\"name\": \"...\", \"username\": \"...\", \"bio\": \"...\"}}]}}\n\n\
             ONLY output the JSON object. No other text."
        );

        let user_prompt = format!(
            "Generate {count} mock leads who follow the Instagram account @{target}. \
             The niche of this account is: {niche}. Each bio should reflect the interests \
             of someone in the {niche} space.",
            count = request.count,
            target = request.target_account,
            niche = request.niche,
        );

        let completion = CompletionRequest::new(vec![
            ChatMessage::system(system_prompt),
            ChatMessage::user(user_prompt),
        ])
        .with_temperature(self.temperature)
        .with_max_tokens(self.max_tokens);

        let response = self.llm.complete(completion).await?;
        let leads = parse_extracted_leads(&response.content, request.count)
            .map_err(|reason| LlmError::InvalidResponse {
                provider: self.llm.model_name().to_string(),
                reason,
            })?;

        info!(count = leads.len(), "LLM produced leads");
        Ok(leads)
    }
}

/// Parse `{"leads": [...]}` output. Image URLs are always the placeholders
/// and ids are always freshly generated, whatever the model returned.
fn parse_extracted_leads(text: &str, limit: usize) -> Result<Vec<Lead>, String> {
    let json = extract_json_object(text).ok_or_else(|| "no JSON object in response".to_string())?;
    let parsed: ExtractedLeads =
        serde_json::from_str(json).map_err(|e| format!("malformed leads JSON: {e}"))?;

    let leads: Vec<Lead> = parsed
        .leads
        .into_iter()
        .filter_map(|raw| {
            let Some(username) = normalize_username(&raw.username) else {
                warn!(name = %raw.name, "Skipping generated lead without username");
                return None;
            };
            let name = match raw.name.trim() {
                "" => username.clone(),
                name => name.to_string(),
            };
            Some(Lead {
                id: Uuid::new_v4().to_string(),
                name,
                username,
                bio: raw.bio.trim().to_string(),
                avatar_url: PLACEHOLDER_AVATAR_URL.to_string(),
                latest_post_image_url: PLACEHOLDER_POST_IMAGE_URL.to_string(),
            })
        })
        .take(limit)
        .collect();

    if leads.is_empty() {
        return Err("response contained no usable leads".to_string());
    }
    Ok(leads)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::llm::provider::{CompletionResponse, FinishReason};

    fn request(count: usize) -> ExtractionRequest {
        ExtractionRequest {
            target_account: "fitlife".into(),
            niche: "Fitness".into(),
            count,
        }
    }

    struct CannedLlm {
        reply: String,
    }

    #[async_trait]
    impl LlmProvider for CannedLlm {
        fn model_name(&self) -> &str {
            "canned"
        }

        async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            Ok(CompletionResponse {
                content: self.reply.clone(),
                input_tokens: 0,
                output_tokens: 0,
                finish_reason: FinishReason::Stop,
                response_id: None,
            })
        }
    }

    #[tokio::test]
    async fn mock_source_samples_distinct_profiles() {
        let source = MockLeadSource::seeded(7);
        let leads = source.produce(&request(5)).await.unwrap();
        assert_eq!(leads.len(), 5);

        let usernames: HashSet<_> = leads.iter().map(|l| l.username.clone()).collect();
        assert_eq!(usernames.len(), 5);
        assert!(leads.iter().all(|l| !l.username.starts_with('@')));
    }

    #[tokio::test]
    async fn mock_source_caps_at_fixture_size_and_uses_fresh_ids() {
        let source = MockLeadSource::seeded(1);
        let first = source.produce(&request(50)).await.unwrap();
        let second = source.produce(&request(50)).await.unwrap();
        assert_eq!(first.len(), MOCK_PROFILES.len());

        let first_ids: HashSet<_> = first.iter().map(|l| l.id.clone()).collect();
        assert!(second.iter().all(|l| !first_ids.contains(&l.id)));
    }

    #[tokio::test]
    async fn llm_source_parses_and_sanitizes() {
        let reply = r#"```json
{"leads": [
  {"id": "1", "name": "Jo Fit", "username": "@jofit", "bio": "Lifting daily", "avatarUrl": "https://evil.example/a.png"},
  {"name": "", "username": "runner_k", "bio": "Marathons"},
  {"name": "No Handle", "username": " ", "bio": "skip me"}
]}
```"#;
        let source = LlmLeadSource::new(Arc::new(CannedLlm {
            reply: reply.to_string(),
        }));

        let leads = source.produce(&request(8)).await.unwrap();
        assert_eq!(leads.len(), 2);
        assert_eq!(leads[0].username, "jofit");
        assert_eq!(leads[0].avatar_url, PLACEHOLDER_AVATAR_URL);
        assert_ne!(leads[0].id, "1");
        assert_eq!(leads[1].name, "runner_k");
    }

    #[tokio::test]
    async fn llm_source_respects_count() {
        let reply = r#"{"leads": [{"username": "a"}, {"username": "b"}, {"username": "c"}]}"#;
        let source = LlmLeadSource::new(Arc::new(CannedLlm {
            reply: reply.to_string(),
        }));
        assert_eq!(source.produce(&request(2)).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn llm_source_rejects_unusable_output() {
        let source = LlmLeadSource::new(Arc::new(CannedLlm {
            reply: "I can't help with that.".to_string(),
        }));
        let err = source.produce(&request(3)).await.unwrap_err();
        assert!(matches!(err, LlmError::InvalidResponse { .. }));
    }
}
