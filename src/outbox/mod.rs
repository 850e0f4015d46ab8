//! Outbox: persisted, generated opening messages.

pub mod model;
pub mod writer;

pub use model::{NewOutboxMessage, OutboxMessage};
pub use writer::{OutboxWriter, WriteOutcome, WriteResult};
