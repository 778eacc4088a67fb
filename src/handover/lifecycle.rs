//! Handover lifecycle state machine.
//!
//! ```text
//! Draft ──ready──▶ Ready ──start──▶ InProgress ──accept──▶ Accepted ──complete──▶ Completed
//!   ▲                │ │                 │
//!   └─return_for─────┘ │                 │
//!        _changes      ├──expire──▶ Expired
//! Draft/Ready ──cancel──▶ Cancelled
//! Draft/Ready/InProgress ──reject──▶ Rejected
//! ```
//!
//! The state is read from the timestamps; the stored status label only
//! mirrors it. `plan` is pure and holds the whole guard table. `apply`
//! performs the single read plus conditional write against a store.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::version::{self, Version};
use super::HandoverError;
use crate::db::HandoverStore;
use crate::models::{Handover, HandoverStatus, TransitionKind};

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

/// One requested transition, with the instant and actor made explicit.
#[derive(Debug, Clone)]
pub struct TransitionCommand {
    pub kind: TransitionKind,
    pub actor_id: Uuid,
    /// Only meaningful for `Reject`.
    pub reason: Option<String>,
    pub at: DateTime<Utc>,
}

impl TransitionCommand {
    pub fn new(kind: TransitionKind, actor_id: Uuid, at: DateTime<Utc>) -> Self {
        Self {
            kind,
            actor_id,
            reason: None,
            at,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Lifecycle column values after a transition.
///
/// Written in one conditional UPDATE; the store bumps the version itself.
#[derive(Debug, Clone, PartialEq)]
pub struct HandoverPatch {
    pub status: HandoverStatus,
    pub receiver_id: Option<Uuid>,
    pub ready_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub expired_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub updated_by: Uuid,
}

impl HandoverPatch {
    /// Start from the handover's current columns.
    pub fn from_current(handover: &Handover, actor_id: Uuid, at: DateTime<Utc>) -> Self {
        Self {
            status: handover.status,
            receiver_id: handover.receiver_id,
            ready_at: handover.ready_at,
            started_at: handover.started_at,
            accepted_at: handover.accepted_at,
            completed_at: handover.completed_at,
            cancelled_at: handover.cancelled_at,
            rejected_at: handover.rejected_at,
            expired_at: handover.expired_at,
            rejection_reason: handover.rejection_reason.clone(),
            updated_at: at,
            updated_by: actor_id,
        }
    }

    /// Mirror a successful write onto an in-memory copy, version included.
    pub fn apply_to(&self, handover: &mut Handover) {
        handover.status = self.status;
        handover.receiver_id = self.receiver_id;
        handover.ready_at = self.ready_at;
        handover.started_at = self.started_at;
        handover.accepted_at = self.accepted_at;
        handover.completed_at = self.completed_at;
        handover.cancelled_at = self.cancelled_at;
        handover.rejected_at = self.rejected_at;
        handover.expired_at = self.expired_at;
        handover.rejection_reason = self.rejection_reason.clone();
        handover.updated_at = self.updated_at;
        handover.updated_by = self.updated_by;
        handover.version = handover.version.next();
    }
}

// ═══════════════════════════════════════════════════════════
// Guard table
// ═══════════════════════════════════════════════════════════

/// States a transition may be requested from.
pub fn allowed_from(kind: TransitionKind) -> &'static [HandoverStatus] {
    use HandoverStatus::*;
    match kind {
        TransitionKind::Ready => &[Draft],
        TransitionKind::Start => &[Ready],
        TransitionKind::Accept => &[InProgress],
        TransitionKind::Complete => &[Accepted],
        TransitionKind::Cancel => &[Draft, Ready],
        TransitionKind::Reject => &[Draft, Ready, InProgress],
        TransitionKind::ReturnForChanges => &[Ready],
        TransitionKind::Expire => &[Ready],
    }
}

/// State a successful transition lands in.
pub fn target_state(kind: TransitionKind) -> HandoverStatus {
    match kind {
        TransitionKind::Ready => HandoverStatus::Ready,
        TransitionKind::Start => HandoverStatus::InProgress,
        TransitionKind::Accept => HandoverStatus::Accepted,
        TransitionKind::Complete => HandoverStatus::Completed,
        TransitionKind::Cancel => HandoverStatus::Cancelled,
        TransitionKind::Reject => HandoverStatus::Rejected,
        TransitionKind::ReturnForChanges => HandoverStatus::Draft,
        TransitionKind::Expire => HandoverStatus::Expired,
    }
}

/// Validate `command` against the handover and compute the columns to write.
pub fn plan(handover: &Handover, command: &TransitionCommand) -> Result<HandoverPatch, HandoverError> {
    let state = handover.derived_status();
    let kind = command.kind;
    let invalid = |reason: &'static str| HandoverError::InvalidTransition {
        handover_id: handover.id,
        kind,
        state,
        reason,
    };

    if state.is_terminal() {
        return Err(invalid("handover is in a terminal state"));
    }
    if !allowed_from(kind).contains(&state) {
        return Err(invalid("not allowed from current state"));
    }

    // Never stamp earlier than what is already recorded.
    let at = match handover.latest_stamp() {
        Some(last) if command.at < last => last,
        _ => command.at,
    };
    let mut patch = HandoverPatch::from_current(handover, command.actor_id, at);

    match kind {
        TransitionKind::Ready => {
            if handover.ready_at.is_some() {
                return Err(invalid("ready_at is already set"));
            }
            patch.ready_at = Some(at);
        }
        TransitionKind::Start => {
            if handover.started_at.is_some() {
                return Err(invalid("started_at is already set"));
            }
            patch.started_at = Some(at);
        }
        TransitionKind::Accept => {
            if handover.started_at.is_none() {
                return Err(invalid("handover has not been started"));
            }
            if handover.accepted_at.is_some() {
                return Err(invalid("accepted_at is already set"));
            }
            patch.accepted_at = Some(at);
            patch.receiver_id = handover.receiver_id.or(Some(command.actor_id));
        }
        TransitionKind::Complete => {
            if handover.accepted_at.is_none() {
                return Err(invalid("handover has not been accepted"));
            }
            if handover.completed_at.is_some() {
                return Err(invalid("completed_at is already set"));
            }
            patch.completed_at = Some(at);
        }
        TransitionKind::Cancel => {
            if handover.accepted_at.is_some() {
                return Err(invalid("handover was already accepted"));
            }
            if handover.cancelled_at.is_some() {
                return Err(invalid("handover is already cancelled"));
            }
            patch.cancelled_at = Some(at);
        }
        TransitionKind::Reject => {
            if handover.accepted_at.is_some() {
                return Err(invalid("handover was already accepted"));
            }
            if handover.rejected_at.is_some() {
                return Err(invalid("handover is already rejected"));
            }
            patch.rejected_at = Some(at);
            patch.rejection_reason = command
                .reason
                .as_deref()
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string);
        }
        TransitionKind::ReturnForChanges => {
            patch.ready_at = None;
        }
        TransitionKind::Expire => {
            if handover.expired_at.is_some() {
                return Err(invalid("handover is already expired"));
            }
            patch.expired_at = Some(at);
        }
    }

    patch.status = target_state(kind);
    Ok(patch)
}

// ═══════════════════════════════════════════════════════════
// Engine entry point
// ═══════════════════════════════════════════════════════════

/// Apply one transition: read, check version, plan, conditional write.
///
/// On success the returned handover carries the new version (`expected + 1`).
/// On any error the stored row is unchanged.
pub fn apply<S: HandoverStore + ?Sized>(
    store: &S,
    handover_id: Uuid,
    expected: Version,
    command: &TransitionCommand,
) -> Result<Handover, HandoverError> {
    let mut handover = store
        .get_by_id(&handover_id)?
        .ok_or(HandoverError::NotFound(handover_id))?;

    if let Err(e) = version::ensure_current(&handover, expected) {
        tracing::warn!(
            handover_id = %handover_id,
            expected = %expected,
            actual = %handover.version,
            kind = command.kind.as_str(),
            "Stale version on transition"
        );
        return Err(e);
    }

    let patch = match plan(&handover, command) {
        Ok(patch) => patch,
        Err(e) => {
            tracing::debug!(handover_id = %handover_id, error = %e, "Transition rejected by guard");
            return Err(e);
        }
    };

    let rows = store.conditional_update(&handover_id, expected, &patch)?;
    if rows == 0 {
        let reread = store.get_by_id(&handover_id)?;
        let err = version::classify_missed_write(handover_id, expected, reread.as_ref());
        tracing::warn!(
            handover_id = %handover_id,
            expected = %expected,
            kind = command.kind.as_str(),
            error = %err,
            "Conditional write lost the race"
        );
        return Err(err);
    }

    let from = handover.status;
    patch.apply_to(&mut handover);
    tracing::info!(
        handover_id = %handover_id,
        kind = command.kind.as_str(),
        from = from.as_str(),
        to = handover.status.as_str(),
        version = %handover.version,
        actor_id = %command.actor_id,
        "Handover transition applied"
    );
    Ok(handover)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteHandoverStore;
    use crate::models::ShiftWindow;
    use chrono::{Duration, NaiveDate, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 10, 18, 0, 0).unwrap()
    }

    fn draft() -> Handover {
        let window = ShiftWindow {
            window_date: NaiveDate::from_ymd_opt(2025, 1, 10).unwrap(),
            from_shift_id: "day".into(),
            to_shift_id: "night".into(),
        };
        let actor = Uuid::new_v4();
        Handover::draft(
            Uuid::new_v4(),
            Uuid::new_v4(),
            &window,
            "Day → Night".into(),
            actor,
            None,
            actor,
            t0(),
        )
    }

    fn cmd(kind: TransitionKind, minutes: i64) -> TransitionCommand {
        TransitionCommand::new(kind, Uuid::new_v4(), t0() + Duration::minutes(minutes))
    }

    /// Drive a fresh handover into `state` through legal transitions.
    fn in_state(state: HandoverStatus) -> Handover {
        let path: &[TransitionKind] = match state {
            HandoverStatus::Draft => &[],
            HandoverStatus::Ready => &[TransitionKind::Ready],
            HandoverStatus::InProgress => &[TransitionKind::Ready, TransitionKind::Start],
            HandoverStatus::Accepted => &[
                TransitionKind::Ready,
                TransitionKind::Start,
                TransitionKind::Accept,
            ],
            HandoverStatus::Completed => &[
                TransitionKind::Ready,
                TransitionKind::Start,
                TransitionKind::Accept,
                TransitionKind::Complete,
            ],
            HandoverStatus::Cancelled => &[TransitionKind::Cancel],
            HandoverStatus::Rejected => &[TransitionKind::Reject],
            HandoverStatus::Expired => &[TransitionKind::Ready, TransitionKind::Expire],
        };
        let mut h = draft();
        for (i, kind) in path.iter().enumerate() {
            let patch = plan(&h, &cmd(*kind, i as i64 + 1)).unwrap();
            patch.apply_to(&mut h);
        }
        assert_eq!(h.derived_status(), state);
        h
    }

    #[test]
    fn transition_table_is_complete() {
        for &state in HandoverStatus::ALL {
            for &kind in TransitionKind::ALL {
                let h = in_state(state);
                let result = plan(&h, &cmd(kind, 60));
                let legal = !state.is_terminal() && allowed_from(kind).contains(&state);
                match result {
                    Ok(patch) => {
                        assert!(legal, "{kind} from {state} should be invalid");
                        assert_eq!(patch.status, target_state(kind));
                    }
                    Err(HandoverError::InvalidTransition { state: s, kind: k, .. }) => {
                        assert!(!legal, "{kind} from {state} should be legal");
                        assert_eq!((s, k), (state, kind));
                    }
                    Err(other) => panic!("unexpected error {other:?}"),
                }
            }
        }
    }

    #[test]
    fn ready_stamps_ready_at() {
        let h = draft();
        let patch = plan(&h, &cmd(TransitionKind::Ready, 5)).unwrap();
        assert_eq!(patch.status, HandoverStatus::Ready);
        assert_eq!(patch.ready_at, Some(t0() + Duration::minutes(5)));
    }

    #[test]
    fn complete_from_draft_is_invalid() {
        let h = draft();
        assert!(matches!(
            plan(&h, &cmd(TransitionKind::Complete, 5)),
            Err(HandoverError::InvalidTransition { state: HandoverStatus::Draft, .. })
        ));
    }

    #[test]
    fn cancel_after_accept_is_invalid() {
        let h = in_state(HandoverStatus::Accepted);
        assert!(matches!(
            plan(&h, &cmd(TransitionKind::Cancel, 60)),
            Err(HandoverError::InvalidTransition { kind: TransitionKind::Cancel, .. })
        ));
    }

    #[test]
    fn return_for_changes_clears_ready_at() {
        let mut h = in_state(HandoverStatus::Ready);
        let patch = plan(&h, &cmd(TransitionKind::ReturnForChanges, 30)).unwrap();
        patch.apply_to(&mut h);
        assert_eq!(h.status, HandoverStatus::Draft);
        assert!(h.ready_at.is_none());
        assert!(h.check_invariants().is_ok());
        // And it can be marked ready again.
        assert!(plan(&h, &cmd(TransitionKind::Ready, 40)).is_ok());
    }

    #[test]
    fn accept_records_receiver_when_missing() {
        let h = in_state(HandoverStatus::InProgress);
        let accept = cmd(TransitionKind::Accept, 60);
        let patch = plan(&h, &accept).unwrap();
        assert_eq!(patch.receiver_id, Some(accept.actor_id));

        let mut assigned = in_state(HandoverStatus::InProgress);
        let receiver = Uuid::new_v4();
        assigned.receiver_id = Some(receiver);
        let patch = plan(&assigned, &accept).unwrap();
        assert_eq!(patch.receiver_id, Some(receiver));
    }

    #[test]
    fn reject_keeps_trimmed_reason() {
        let h = in_state(HandoverStatus::InProgress);
        let patch = plan(&h, &cmd(TransitionKind::Reject, 60).with_reason("  missing labs ")).unwrap();
        assert_eq!(patch.rejection_reason.as_deref(), Some("missing labs"));
        assert_eq!(patch.status, HandoverStatus::Rejected);

        let patch = plan(&h, &cmd(TransitionKind::Reject, 60).with_reason("   ")).unwrap();
        assert!(patch.rejection_reason.is_none());
    }

    #[test]
    fn stamp_is_clamped_to_latest_existing_stamp() {
        let h = in_state(HandoverStatus::InProgress);
        let last = h.latest_stamp().unwrap();
        let patch = plan(&h, &cmd(TransitionKind::Accept, -120)).unwrap();
        assert_eq!(patch.accepted_at, Some(last));
    }

    /// Every sequence of up to five transitions keeps the data-model invariants.
    #[test]
    fn arbitrary_sequences_keep_invariants() {
        fn walk(h: &Handover, depth: usize, step: i64) {
            assert!(h.check_invariants().is_ok(), "{h:?}");
            if depth == 0 {
                return;
            }
            for &kind in TransitionKind::ALL {
                let mut next = h.clone();
                match plan(&next, &cmd(kind, step)) {
                    Ok(patch) => {
                        patch.apply_to(&mut next);
                        assert_eq!(next.version, h.version.next());
                        walk(&next, depth - 1, step + 1);
                    }
                    Err(_) => assert_eq!(next, *h),
                }
            }
        }
        walk(&draft(), 5, 1);
    }

    #[test]
    fn apply_persists_and_increments_version() {
        let store = SqliteHandoverStore::open_in_memory().unwrap();
        let h = draft();
        store.insert(&h).unwrap();

        let updated = apply(&store, h.id, Version::INITIAL, &cmd(TransitionKind::Ready, 5)).unwrap();
        assert_eq!(updated.version, Version::new(2));
        assert_eq!(updated.status, HandoverStatus::Ready);
        assert!(updated.ready_at.is_some());
        assert_eq!(store.get_by_id(&h.id).unwrap(), Some(updated));
    }

    #[test]
    fn apply_with_stale_version_changes_nothing() {
        let store = SqliteHandoverStore::open_in_memory().unwrap();
        let h = draft();
        store.insert(&h).unwrap();

        let err = apply(&store, h.id, Version::new(7), &cmd(TransitionKind::Ready, 5)).unwrap_err();
        assert!(matches!(err, HandoverError::VersionConflict { .. }));
        assert_eq!(store.get_by_id(&h.id).unwrap(), Some(h));
    }

    #[test]
    fn apply_invalid_transition_changes_nothing() {
        let store = SqliteHandoverStore::open_in_memory().unwrap();
        let h = draft();
        store.insert(&h).unwrap();

        let err = apply(&store, h.id, Version::INITIAL, &cmd(TransitionKind::Complete, 5)).unwrap_err();
        assert!(matches!(err, HandoverError::InvalidTransition { .. }));
        assert_eq!(store.get_by_id(&h.id).unwrap().unwrap().version, Version::INITIAL);
    }

    #[test]
    fn apply_on_unknown_id_is_not_found() {
        let store = SqliteHandoverStore::open_in_memory().unwrap();
        let id = Uuid::new_v4();
        assert!(matches!(
            apply(&store, id, Version::INITIAL, &cmd(TransitionKind::Ready, 5)),
            Err(HandoverError::NotFound(missing)) if missing == id
        ));
    }
}
