//! Lead Outreach: campaign import, lead extraction and AI opener generation.

pub mod api;
pub mod campaigns;
pub mod config;
pub mod error;
pub mod llm;
pub mod opener;
pub mod outbox;
pub mod session;
pub mod store;

pub use error::{Error, Result};
pub use session::Session;
