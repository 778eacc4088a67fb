//! Handover lifecycle core.
//!
//! Creation resolves the shift window, checks the active-window rule and
//! inserts a `Draft`. Every later change goes through `lifecycle::apply`,
//! which validates the guard table and writes with a compare-and-set on the
//! row version. Nothing here locks rows or retries on its own.

pub mod active_window;
pub mod lifecycle;
pub mod service;
pub mod shift_boundary;
pub mod version;

use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::{HandoverStatus, HandoverWindowKey, TransitionKind};
use version::Version;

pub use lifecycle::{HandoverPatch, TransitionCommand};
pub use service::{CreateHandover, ExpirySweep, HandoverService, TransitionRequest};
pub use shift_boundary::{ResolvedWindow, ShiftProvider, ShiftRotation};

// ═══════════════════════════════════════════════════════════
// Error types
// ═══════════════════════════════════════════════════════════

/// Errors from handover creation and transitions.
#[derive(Debug, thiserror::Error)]
pub enum HandoverError {
    #[error("Cannot {kind} handover {handover_id} in state {state}: {reason}")]
    InvalidTransition {
        handover_id: Uuid,
        kind: TransitionKind,
        state: HandoverStatus,
        reason: &'static str,
    },
    #[error("Handover {handover_id} was modified concurrently: expected version {expected}, current version {actual}")]
    VersionConflict {
        handover_id: Uuid,
        expected: Version,
        actual: Version,
    },
    #[error("Handover not found: {0}")]
    NotFound(Uuid),
    #[error("An active handover already exists for {key}")]
    DuplicateActiveHandover {
        key: HandoverWindowKey,
        /// Known when the pre-check caught it; `None` when the unique index did.
        existing_id: Option<Uuid>,
    },
    #[error("Shift configuration missing: {0}")]
    ShiftConfigurationMissing(String),
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Coarse outcome for the endpoint layer's status mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    NotFound,
    Conflict,
    BadRequest,
    Internal,
}

impl HandoverError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NotFound(_) => ErrorClass::NotFound,
            Self::VersionConflict { .. } | Self::DuplicateActiveHandover { .. } => {
                ErrorClass::Conflict
            }
            Self::InvalidTransition { .. } | Self::ShiftConfigurationMissing(_) => {
                ErrorClass::BadRequest
            }
            Self::Database(_) => ErrorClass::Internal,
        }
    }
}
