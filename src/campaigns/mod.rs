//! Campaigns: lead import, the optimistic campaign board and extraction runs.

pub mod board;
pub mod controller;
pub mod extraction;
pub mod import;
pub mod lead_source;
pub mod model;
pub mod runs;

pub use board::{BoardEntry, CampaignBoard};
pub use controller::LeadImportController;
pub use extraction::{Checkpoint, ExtractionController, ProgressDriver, RunState};
pub use import::UsernameSource;
pub use lead_source::{LeadSource, LlmLeadSource, MockLeadSource};
pub use model::{BoardEvent, Campaign, CampaignRef, Lead, SyncState};
pub use runs::RunRegistry;
