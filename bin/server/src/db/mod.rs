//! Postgres implementations of the chime stores.
//!
//! This module provides:
//! - Events keyed by `(bucket, event_id)`, with a conditional claim
//! - Actor records, with conditional create and lock
//!
//! Structured fields (conversation, event lists, message id ring, stats,
//! children) are stored as `jsonb`.

pub mod actor;
pub mod event;

pub use actor::PgActorStore;
pub use event::PgEventStore;

use chime_store::StoreError;

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend {
        reason: e.to_string(),
    }
}

fn serialization(e: serde_json::Error) -> StoreError {
    StoreError::Serialization {
        reason: e.to_string(),
    }
}
