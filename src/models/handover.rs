use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::HandoverStatus;
use crate::handover::version::Version;

/// Derived, non-persisted value: which handoff opportunity a handover belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShiftWindow {
    pub window_date: NaiveDate,
    pub from_shift_id: String,
    pub to_shift_id: String,
}

impl ShiftWindow {
    pub fn key_for(&self, patient_id: Uuid) -> HandoverWindowKey {
        HandoverWindowKey {
            patient_id,
            from_shift_id: self.from_shift_id.clone(),
            to_shift_id: self.to_shift_id.clone(),
            window_date: self.window_date,
        }
    }
}

/// The tuple at most one active handover may occupy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HandoverWindowKey {
    pub patient_id: Uuid,
    pub from_shift_id: String,
    pub to_shift_id: String,
    pub window_date: NaiveDate,
}

impl std::fmt::Display for HandoverWindowKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "patient {} {}→{} on {}",
            self.patient_id, self.from_shift_id, self.to_shift_id, self.window_date
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Handover {
    pub id: Uuid,
    pub assignment_id: Uuid,
    pub patient_id: Uuid,
    pub from_shift_id: String,
    pub to_shift_id: String,
    pub window_date: NaiveDate,
    pub shift_label: String,
    pub responsible_physician_id: Uuid,
    pub receiver_id: Option<Uuid>,
    /// Mirrors `derived_status()`; stored for listing queries.
    pub status: HandoverStatus,
    pub ready_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub expired_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub version: Version,
    pub created_at: DateTime<Utc>,
    pub created_by: Uuid,
    pub updated_at: DateTime<Utc>,
    pub updated_by: Uuid,
}

/// A violated data-model invariant, reported when decoding or checking a row.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantViolation {
    #[error("{0} terminal timestamps are set, at most one is allowed")]
    MultipleTerminalStamps(usize),
    #[error("{later} is set without {earlier}")]
    MissingPrerequisite {
        earlier: &'static str,
        later: &'static str,
    },
    #[error("{later} precedes {earlier}")]
    OutOfOrder {
        earlier: &'static str,
        later: &'static str,
    },
    #[error("{field} must be null for {state} handovers")]
    UnexpectedStamp {
        field: &'static str,
        state: &'static str,
    },
    #[error("status label {label} disagrees with timestamps ({derived})")]
    StatusMismatch {
        label: HandoverStatus,
        derived: HandoverStatus,
    },
}

impl Handover {
    /// A fresh handover in `Draft` at the initial version.
    #[allow(clippy::too_many_arguments)]
    pub fn draft(
        assignment_id: Uuid,
        patient_id: Uuid,
        window: &ShiftWindow,
        shift_label: String,
        responsible_physician_id: Uuid,
        receiver_id: Option<Uuid>,
        actor_id: Uuid,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            assignment_id,
            patient_id,
            from_shift_id: window.from_shift_id.clone(),
            to_shift_id: window.to_shift_id.clone(),
            window_date: window.window_date,
            shift_label,
            responsible_physician_id,
            receiver_id,
            status: HandoverStatus::Draft,
            ready_at: None,
            started_at: None,
            accepted_at: None,
            completed_at: None,
            cancelled_at: None,
            rejected_at: None,
            expired_at: None,
            rejection_reason: None,
            version: Version::INITIAL,
            created_at: now,
            created_by: actor_id,
            updated_at: now,
            updated_by: actor_id,
        }
    }

    pub fn window_key(&self) -> HandoverWindowKey {
        HandoverWindowKey {
            patient_id: self.patient_id,
            from_shift_id: self.from_shift_id.clone(),
            to_shift_id: self.to_shift_id.clone(),
            window_date: self.window_date,
        }
    }

    fn terminal_stamps(&self) -> [(&'static str, Option<DateTime<Utc>>); 4] {
        [
            ("completed_at", self.completed_at),
            ("cancelled_at", self.cancelled_at),
            ("rejected_at", self.rejected_at),
            ("expired_at", self.expired_at),
        ]
    }

    fn progress_stamps(&self) -> [(&'static str, Option<DateTime<Utc>>); 3] {
        [
            ("ready_at", self.ready_at),
            ("started_at", self.started_at),
            ("accepted_at", self.accepted_at),
        ]
    }

    /// Active means all four terminal timestamps are null.
    pub fn is_active(&self) -> bool {
        self.terminal_stamps().iter().all(|(_, at)| at.is_none())
    }

    /// The state implied by the timestamps alone.
    pub fn derived_status(&self) -> HandoverStatus {
        if self.completed_at.is_some() {
            HandoverStatus::Completed
        } else if self.cancelled_at.is_some() {
            HandoverStatus::Cancelled
        } else if self.rejected_at.is_some() {
            HandoverStatus::Rejected
        } else if self.expired_at.is_some() {
            HandoverStatus::Expired
        } else if self.accepted_at.is_some() {
            HandoverStatus::Accepted
        } else if self.started_at.is_some() {
            HandoverStatus::InProgress
        } else if self.ready_at.is_some() {
            HandoverStatus::Ready
        } else {
            HandoverStatus::Draft
        }
    }

    /// Latest lifecycle stamp of any kind, if one exists.
    pub fn latest_stamp(&self) -> Option<DateTime<Utc>> {
        self.progress_stamps()
            .into_iter()
            .chain(self.terminal_stamps())
            .filter_map(|(_, at)| at)
            .max()
    }

    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        let terminal: Vec<_> = self
            .terminal_stamps()
            .into_iter()
            .filter_map(|(name, at)| at.map(|at| (name, at)))
            .collect();
        if terminal.len() > 1 {
            return Err(InvariantViolation::MultipleTerminalStamps(terminal.len()));
        }

        // ready_at -> started_at -> accepted_at -> completed_at
        let chain = [
            ("ready_at", self.ready_at),
            ("started_at", self.started_at),
            ("accepted_at", self.accepted_at),
            ("completed_at", self.completed_at),
        ];
        for pair in chain.windows(2) {
            let (earlier, earlier_at) = pair[0];
            let (later, later_at) = pair[1];
            match (earlier_at, later_at) {
                (None, Some(_)) => {
                    return Err(InvariantViolation::MissingPrerequisite { earlier, later })
                }
                (Some(e), Some(l)) if l < e => {
                    return Err(InvariantViolation::OutOfOrder { earlier, later })
                }
                _ => {}
            }
        }

        if self.cancelled_at.is_some() && self.started_at.is_some() {
            return Err(InvariantViolation::UnexpectedStamp {
                field: "started_at",
                state: "cancelled",
            });
        }
        if self.rejected_at.is_some() && self.accepted_at.is_some() {
            return Err(InvariantViolation::UnexpectedStamp {
                field: "accepted_at",
                state: "rejected",
            });
        }
        if self.expired_at.is_some() {
            if self.ready_at.is_none() {
                return Err(InvariantViolation::MissingPrerequisite {
                    earlier: "ready_at",
                    later: "expired_at",
                });
            }
            if self.started_at.is_some() {
                return Err(InvariantViolation::UnexpectedStamp {
                    field: "started_at",
                    state: "expired",
                });
            }
        }

        if let Some(&(terminal_name, terminal_at)) = terminal.first() {
            for (name, at) in self.progress_stamps() {
                if at.is_some_and(|at| terminal_at < at) {
                    return Err(InvariantViolation::OutOfOrder {
                        earlier: name,
                        later: terminal_name,
                    });
                }
            }
        }

        let derived = self.derived_status();
        if derived != self.status {
            return Err(InvariantViolation::StatusMismatch {
                label: self.status,
                derived,
            });
        }
        Ok(())
    }
}
