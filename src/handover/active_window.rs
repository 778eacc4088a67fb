//! At most one active handover per (patient, from-shift, to-shift, window date).
//!
//! The partial unique index on `handovers` is the real guarantee. The
//! pre-check only exists to name the existing handover in the error; a
//! concurrent creator can still slip past it, in which case the index
//! violation is mapped to the same `DuplicateActiveHandover`.

use uuid::Uuid;

use super::HandoverError;
use crate::db::{DatabaseError, HandoverStore};
use crate::models::{Handover, HandoverWindowKey};

pub fn check_no_active_overlap<S: HandoverStore + ?Sized>(
    store: &S,
    key: &HandoverWindowKey,
) -> Result<(), HandoverError> {
    match store.find_active(key)? {
        None => Ok(()),
        Some(existing) => {
            tracing::warn!(
                existing_id = %existing.id,
                window = %key,
                "Active handover already exists for window"
            );
            Err(HandoverError::DuplicateActiveHandover {
                key: key.clone(),
                existing_id: Some(existing.id),
            })
        }
    }
}

/// Insert a new handover, translating a unique-index hit into the domain error.
pub fn insert_exclusive<S: HandoverStore + ?Sized>(
    store: &S,
    handover: &Handover,
) -> Result<Uuid, HandoverError> {
    match store.insert(handover) {
        Ok(id) => Ok(id),
        Err(DatabaseError::UniqueViolation(detail)) => {
            let key = handover.window_key();
            tracing::warn!(window = %key, detail = %detail, "Active window claimed concurrently");
            Err(HandoverError::DuplicateActiveHandover {
                key,
                existing_id: None,
            })
        }
        Err(e) => Err(e.into()),
    }
}
