//! Repository layer: the persistence boundary for handover records.
//!
//! Untyped rows never leave this module: every read decodes into a
//! `Handover` and every write takes typed values.

mod handover;

use chrono::NaiveDate;
use uuid::Uuid;

use super::DatabaseError;
use crate::handover::lifecycle::HandoverPatch;
use crate::handover::version::Version;
use crate::models::{Handover, HandoverWindowKey};

pub use handover::*;

/// Storage operations the lifecycle core needs from a handover store.
///
/// Implementations must enforce the active-window uniqueness rule themselves
/// (returning `DatabaseError::UniqueViolation` from `insert`) and make
/// `conditional_update` a single atomic compare-and-set on `version`.
pub trait HandoverStore: Send + Sync {
    fn insert(&self, handover: &Handover) -> Result<Uuid, DatabaseError>;

    fn get_by_id(&self, id: &Uuid) -> Result<Option<Handover>, DatabaseError>;

    /// The non-terminal handover occupying `key`, if any.
    fn find_active(&self, key: &HandoverWindowKey) -> Result<Option<Handover>, DatabaseError>;

    /// Write `patch` and bump the version iff the row is still at `expected`.
    /// Returns the number of rows affected (0 or 1).
    fn conditional_update(
        &self,
        id: &Uuid,
        expected: Version,
        patch: &HandoverPatch,
    ) -> Result<usize, DatabaseError>;

    /// `Ready` handovers whose window date is strictly before `date`.
    fn list_ready_before(&self, date: NaiveDate) -> Result<Vec<Handover>, DatabaseError>;
}
