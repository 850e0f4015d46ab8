//! Opener generation: per-lead AI messages and the campaign start batch.

pub mod batch;
pub mod generator;
pub mod personalize;

pub use batch::{BatchReport, LeadOutcome, OpenerBatch, Outcome};
pub use generator::{GeneratorConfig, LlmOpenerGenerator, OpenerGenerator};
pub use personalize::{LlmPersonalizer, MessagePersonalizer};
