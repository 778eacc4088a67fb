//! Optimistic concurrency token carried by every handover row.
//!
//! Callers present the version they last observed; the store's write only
//! matches a row still at that version. A write that matches nothing is
//! classified by re-reading the row.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::HandoverError;
use crate::models::Handover;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// Version of a freshly created handover.
    pub const INITIAL: Version = Version(1);

    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> i64 {
        self.0
    }

    /// The version a successful transition produces.
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fail fast when the caller's view is already stale.
pub fn ensure_current(handover: &Handover, expected: Version) -> Result<(), HandoverError> {
    if handover.version == expected {
        Ok(())
    } else {
        Err(HandoverError::VersionConflict {
            handover_id: handover.id,
            expected,
            actual: handover.version,
        })
    }
}

/// Explain a conditional write that affected zero rows, given a fresh read.
///
/// No row means the handover is gone (or never existed); any row means
/// someone else's write landed first.
pub fn classify_missed_write(
    handover_id: Uuid,
    expected: Version,
    reread: Option<&Handover>,
) -> HandoverError {
    match reread {
        None => HandoverError::NotFound(handover_id),
        Some(current) => HandoverError::VersionConflict {
            handover_id,
            expected,
            actual: current.version,
        },
    }
}
