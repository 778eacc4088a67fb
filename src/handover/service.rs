//! Caller-facing handover operations.
//!
//! The endpoint layer calls these with an explicit `now` and actor; the
//! service converts `now` to the site's wall clock for shift resolution and
//! stamps transitions in UTC. No retries happen here: a `VersionConflict`
//! goes back to the caller, who re-reads and decides.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use uuid::Uuid;

use super::active_window;
use super::lifecycle::{self, TransitionCommand};
use super::shift_boundary::{self, ResolvedWindow, ShiftProvider, ShiftRotation};
use super::version::Version;
use super::HandoverError;
use crate::config::{ConfigError, HandoverSettings};
use crate::db::HandoverStore;
use crate::models::{Handover, TransitionKind};

// ═══════════════════════════════════════════════════════════
// Requests and results
// ═══════════════════════════════════════════════════════════

/// Request to open a handover for one patient assignment.
#[derive(Debug, Clone)]
pub struct CreateHandover {
    pub assignment_id: Uuid,
    pub patient_id: Uuid,
    pub from_shift_id: String,
    pub actor_id: Uuid,
    /// Defaults to the actor.
    pub responsible_physician_id: Option<Uuid>,
    pub receiver_id: Option<Uuid>,
    /// Defaults to "<from shift> → <to shift>".
    pub shift_label: Option<String>,
}

impl CreateHandover {
    pub fn new(
        assignment_id: Uuid,
        patient_id: Uuid,
        from_shift_id: impl Into<String>,
        actor_id: Uuid,
    ) -> Self {
        Self {
            assignment_id,
            patient_id,
            from_shift_id: from_shift_id.into(),
            actor_id,
            responsible_physician_id: None,
            receiver_id: None,
            shift_label: None,
        }
    }

    pub fn with_responsible_physician(mut self, physician_id: Uuid) -> Self {
        self.responsible_physician_id = Some(physician_id);
        self
    }

    pub fn with_receiver(mut self, receiver_id: Uuid) -> Self {
        self.receiver_id = Some(receiver_id);
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.shift_label = Some(label.into());
        self
    }
}

/// Request to move a handover through one lifecycle step.
#[derive(Debug, Clone)]
pub struct TransitionRequest {
    pub handover_id: Uuid,
    pub expected_version: Version,
    pub kind: TransitionKind,
    pub actor_id: Uuid,
    pub reason: Option<String>,
}

impl TransitionRequest {
    pub fn new(
        handover_id: Uuid,
        expected_version: Version,
        kind: TransitionKind,
        actor_id: Uuid,
    ) -> Self {
        Self {
            handover_id,
            expected_version,
            kind,
            actor_id,
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Outcome of one expiry sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpirySweep {
    /// Handovers with a window date before this were eligible.
    pub cutoff: Option<NaiveDate>,
    pub expired: Vec<Uuid>,
    /// Changed by someone else between listing and expiring.
    pub skipped: Vec<Uuid>,
}

// ═══════════════════════════════════════════════════════════
// HandoverService
// ═══════════════════════════════════════════════════════════

pub struct HandoverService<S, P> {
    store: S,
    shifts: P,
    site_offset: FixedOffset,
    expiry_grace: Duration,
}

impl<S: HandoverStore> HandoverService<S, ShiftRotation> {
    pub fn from_settings(store: S, settings: &HandoverSettings) -> Result<Self, ConfigError> {
        settings.validate()?;
        Ok(Self::new(
            store,
            settings.rotation()?,
            settings.site_offset()?,
            settings.expiry_grace_days,
        ))
    }
}

impl<S: HandoverStore, P: ShiftProvider> HandoverService<S, P> {
    pub fn new(store: S, shifts: P, site_offset: FixedOffset, expiry_grace_days: i64) -> Self {
        Self {
            store,
            shifts,
            site_offset,
            expiry_grace: Duration::days(expiry_grace_days),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// `now` on the hospital wall clock.
    pub fn local_time(&self, now: DateTime<Utc>) -> NaiveDateTime {
        now.with_timezone(&self.site_offset).naive_local()
    }

    pub fn resolve_window(
        &self,
        from_shift_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ResolvedWindow, HandoverError> {
        shift_boundary::resolve(&self.shifts, self.local_time(now), from_shift_id)
    }

    /// Open a `Draft` handover for the window `now` falls in.
    pub fn create_handover(
        &self,
        request: CreateHandover,
        now: DateTime<Utc>,
    ) -> Result<Handover, HandoverError> {
        let resolved = self.resolve_window(&request.from_shift_id, now)?;
        let key = resolved.window.key_for(request.patient_id);
        active_window::check_no_active_overlap(&self.store, &key)?;

        let label = request
            .shift_label
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| resolved.default_label());

        let handover = Handover::draft(
            request.assignment_id,
            request.patient_id,
            &resolved.window,
            label,
            request.responsible_physician_id.unwrap_or(request.actor_id),
            request.receiver_id,
            request.actor_id,
            now,
        );
        active_window::insert_exclusive(&self.store, &handover)?;

        tracing::info!(
            handover_id = %handover.id,
            patient_id = %handover.patient_id,
            window = %key,
            actor_id = %request.actor_id,
            "Handover created"
        );
        Ok(handover)
    }

    pub fn transition(
        &self,
        request: TransitionRequest,
        now: DateTime<Utc>,
    ) -> Result<Handover, HandoverError> {
        let command = TransitionCommand {
            kind: request.kind,
            actor_id: request.actor_id,
            reason: request.reason,
            at: now,
        };
        lifecycle::apply(
            &self.store,
            request.handover_id,
            request.expected_version,
            &command,
        )
    }

    pub fn get(&self, handover_id: Uuid) -> Result<Handover, HandoverError> {
        self.store
            .get_by_id(&handover_id)?
            .ok_or(HandoverError::NotFound(handover_id))
    }

    /// Expire every `Ready` handover whose window is older than the grace period.
    ///
    /// Rows another actor changed in the meantime are skipped, not retried.
    pub fn expire_stale(
        &self,
        now: DateTime<Utc>,
        actor_id: Uuid,
    ) -> Result<ExpirySweep, HandoverError> {
        let today = self.local_time(now).date();
        let cutoff = today - self.expiry_grace;
        let mut sweep = ExpirySweep {
            cutoff: Some(cutoff),
            ..ExpirySweep::default()
        };

        for handover in self.store.list_ready_before(cutoff)? {
            let command = TransitionCommand::new(TransitionKind::Expire, actor_id, now);
            match lifecycle::apply(&self.store, handover.id, handover.version, &command) {
                Ok(expired) => sweep.expired.push(expired.id),
                Err(
                    HandoverError::VersionConflict { .. }
                    | HandoverError::InvalidTransition { .. }
                    | HandoverError::NotFound(_),
                ) => sweep.skipped.push(handover.id),
                Err(e) => return Err(e),
            }
        }

        tracing::info!(
            %cutoff,
            expired = sweep.expired.len(),
            skipped = sweep.skipped.len(),
            "Expiry sweep finished"
        );
        Ok(sweep)
    }
}
