use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::HandoverStore;
use crate::db::{open_database, open_memory_database, DatabaseError};
use crate::handover::lifecycle::HandoverPatch;
use crate::handover::version::Version;
use crate::models::*;

const HANDOVER_COLUMNS: &str = "id, assignment_id, patient_id, from_shift_id, to_shift_id,
     window_date, shift_label, responsible_physician_id, receiver_id, status,
     ready_at, started_at, accepted_at, completed_at, cancelled_at, rejected_at, expired_at,
     rejection_reason, version, created_at, created_by, updated_at, updated_by";

// ═══════════════════════════════════════════
// Connection-level operations
// ═══════════════════════════════════════════

pub fn insert_handover(conn: &Connection, handover: &Handover) -> Result<(), DatabaseError> {
    conn.execute(
        &format!(
            "INSERT INTO handovers ({HANDOVER_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                     ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23)"
        ),
        params![
            handover.id.to_string(),
            handover.assignment_id.to_string(),
            handover.patient_id.to_string(),
            handover.from_shift_id,
            handover.to_shift_id,
            handover.window_date.to_string(),
            handover.shift_label,
            handover.responsible_physician_id.to_string(),
            handover.receiver_id.map(|id| id.to_string()),
            handover.status.as_str(),
            handover.ready_at.as_ref().map(encode_timestamp),
            handover.started_at.as_ref().map(encode_timestamp),
            handover.accepted_at.as_ref().map(encode_timestamp),
            handover.completed_at.as_ref().map(encode_timestamp),
            handover.cancelled_at.as_ref().map(encode_timestamp),
            handover.rejected_at.as_ref().map(encode_timestamp),
            handover.expired_at.as_ref().map(encode_timestamp),
            handover.rejection_reason,
            handover.version.get(),
            encode_timestamp(&handover.created_at),
            handover.created_by.to_string(),
            encode_timestamp(&handover.updated_at),
            handover.updated_by.to_string(),
        ],
    )
    .map_err(DatabaseError::from_write)?;
    Ok(())
}

pub fn get_handover(conn: &Connection, id: &Uuid) -> Result<Option<Handover>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {HANDOVER_COLUMNS} FROM handovers WHERE id = ?1"),
            params![id.to_string()],
            read_row,
        )
        .optional()?;
    row.map(handover_from_row).transpose()
}

pub fn find_active_handover(
    conn: &Connection,
    key: &HandoverWindowKey,
) -> Result<Option<Handover>, DatabaseError> {
    let row = conn
        .query_row(
            &format!(
                "SELECT {HANDOVER_COLUMNS} FROM handovers
                 WHERE patient_id = ?1 AND from_shift_id = ?2 AND to_shift_id = ?3
                   AND window_date = ?4
                   AND completed_at IS NULL AND cancelled_at IS NULL
                   AND rejected_at IS NULL AND expired_at IS NULL"
            ),
            params![
                key.patient_id.to_string(),
                key.from_shift_id,
                key.to_shift_id,
                key.window_date.to_string(),
            ],
            read_row,
        )
        .optional()?;
    row.map(handover_from_row).transpose()
}

/// Compare-and-set on `version`: writes the lifecycle columns and bumps the
/// version in one statement, or touches nothing.
pub fn update_handover_if_version(
    conn: &Connection,
    id: &Uuid,
    expected: Version,
    patch: &HandoverPatch,
) -> Result<usize, DatabaseError> {
    let rows = conn
        .execute(
            "UPDATE handovers SET
                status = ?3, receiver_id = ?4,
                ready_at = ?5, started_at = ?6, accepted_at = ?7, completed_at = ?8,
                cancelled_at = ?9, rejected_at = ?10, expired_at = ?11,
                rejection_reason = ?12, updated_at = ?13, updated_by = ?14,
                version = version + 1
             WHERE id = ?1 AND version = ?2",
            params![
                id.to_string(),
                expected.get(),
                patch.status.as_str(),
                patch.receiver_id.map(|id| id.to_string()),
                patch.ready_at.as_ref().map(encode_timestamp),
                patch.started_at.as_ref().map(encode_timestamp),
                patch.accepted_at.as_ref().map(encode_timestamp),
                patch.completed_at.as_ref().map(encode_timestamp),
                patch.cancelled_at.as_ref().map(encode_timestamp),
                patch.rejected_at.as_ref().map(encode_timestamp),
                patch.expired_at.as_ref().map(encode_timestamp),
                patch.rejection_reason,
                encode_timestamp(&patch.updated_at),
                patch.updated_by.to_string(),
            ],
        )
        .map_err(DatabaseError::from_write)?;
    Ok(rows)
}

pub fn list_ready_handovers_before(
    conn: &Connection,
    date: NaiveDate,
) -> Result<Vec<Handover>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {HANDOVER_COLUMNS} FROM handovers
         WHERE status = ?1 AND window_date < ?2
         ORDER BY window_date ASC, created_at ASC"
    ))?;
    let rows = stmt.query_map(
        params![HandoverStatus::Ready.as_str(), date.to_string()],
        read_row,
    )?;

    let mut handovers = Vec::new();
    for row in rows {
        handovers.push(handover_from_row(row?)?);
    }
    Ok(handovers)
}

// ═══════════════════════════════════════════
// SqliteHandoverStore
// ═══════════════════════════════════════════

/// `HandoverStore` over a single SQLite connection.
///
/// Several stores may open the same database file; the version check and the
/// partial unique index keep them consistent.
pub struct SqliteHandoverStore {
    conn: Mutex<Connection>,
}

impl SqliteHandoverStore {
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        Ok(Self::from_connection(open_database(path)?))
    }

    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Ok(Self::from_connection(open_memory_database()?))
    }

    /// Wrap an already-migrated connection.
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, DatabaseError> {
        self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)
    }
}

impl HandoverStore for SqliteHandoverStore {
    fn insert(&self, handover: &Handover) -> Result<Uuid, DatabaseError> {
        insert_handover(&*self.lock()?, handover)?;
        Ok(handover.id)
    }

    fn get_by_id(&self, id: &Uuid) -> Result<Option<Handover>, DatabaseError> {
        get_handover(&*self.lock()?, id)
    }

    fn find_active(&self, key: &HandoverWindowKey) -> Result<Option<Handover>, DatabaseError> {
        find_active_handover(&*self.lock()?, key)
    }

    fn conditional_update(
        &self,
        id: &Uuid,
        expected: Version,
        patch: &HandoverPatch,
    ) -> Result<usize, DatabaseError> {
        update_handover_if_version(&*self.lock()?, id, expected, patch)
    }

    fn list_ready_before(&self, date: NaiveDate) -> Result<Vec<Handover>, DatabaseError> {
        list_ready_handovers_before(&*self.lock()?, date)
    }
}

// ═══════════════════════════════════════════
// Row mapping
// ═══════════════════════════════════════════

fn encode_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn decode_timestamp(field: &str, value: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(value)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| DatabaseError::ConstraintViolation(format!("Invalid {field} '{value}': {e}")))
}

fn decode_optional_timestamp(
    field: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, DatabaseError> {
    value.map(|v| decode_timestamp(field, &v)).transpose()
}

fn decode_uuid(field: &str, value: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(value)
        .map_err(|e| DatabaseError::ConstraintViolation(format!("Invalid {field} '{value}': {e}")))
}

// Internal row type for Handover mapping
struct HandoverRow {
    id: String,
    assignment_id: String,
    patient_id: String,
    from_shift_id: String,
    to_shift_id: String,
    window_date: String,
    shift_label: String,
    responsible_physician_id: String,
    receiver_id: Option<String>,
    status: String,
    ready_at: Option<String>,
    started_at: Option<String>,
    accepted_at: Option<String>,
    completed_at: Option<String>,
    cancelled_at: Option<String>,
    rejected_at: Option<String>,
    expired_at: Option<String>,
    rejection_reason: Option<String>,
    version: i64,
    created_at: String,
    created_by: String,
    updated_at: String,
    updated_by: String,
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<HandoverRow> {
    Ok(HandoverRow {
        id: row.get(0)?,
        assignment_id: row.get(1)?,
        patient_id: row.get(2)?,
        from_shift_id: row.get(3)?,
        to_shift_id: row.get(4)?,
        window_date: row.get(5)?,
        shift_label: row.get(6)?,
        responsible_physician_id: row.get(7)?,
        receiver_id: row.get(8)?,
        status: row.get(9)?,
        ready_at: row.get(10)?,
        started_at: row.get(11)?,
        accepted_at: row.get(12)?,
        completed_at: row.get(13)?,
        cancelled_at: row.get(14)?,
        rejected_at: row.get(15)?,
        expired_at: row.get(16)?,
        rejection_reason: row.get(17)?,
        version: row.get(18)?,
        created_at: row.get(19)?,
        created_by: row.get(20)?,
        updated_at: row.get(21)?,
        updated_by: row.get(22)?,
    })
}

fn handover_from_row(row: HandoverRow) -> Result<Handover, DatabaseError> {
    let handover = Handover {
        id: decode_uuid("id", &row.id)?,
        assignment_id: decode_uuid("assignment_id", &row.assignment_id)?,
        patient_id: decode_uuid("patient_id", &row.patient_id)?,
        from_shift_id: row.from_shift_id,
        to_shift_id: row.to_shift_id,
        window_date: NaiveDate::parse_from_str(&row.window_date, "%Y-%m-%d").map_err(|e| {
            DatabaseError::ConstraintViolation(format!(
                "Invalid window_date '{}': {e}",
                row.window_date
            ))
        })?,
        shift_label: row.shift_label,
        responsible_physician_id: decode_uuid(
            "responsible_physician_id",
            &row.responsible_physician_id,
        )?,
        receiver_id: row
            .receiver_id
            .map(|id| decode_uuid("receiver_id", &id))
            .transpose()?,
        status: HandoverStatus::from_str(&row.status)?,
        ready_at: decode_optional_timestamp("ready_at", row.ready_at)?,
        started_at: decode_optional_timestamp("started_at", row.started_at)?,
        accepted_at: decode_optional_timestamp("accepted_at", row.accepted_at)?,
        completed_at: decode_optional_timestamp("completed_at", row.completed_at)?,
        cancelled_at: decode_optional_timestamp("cancelled_at", row.cancelled_at)?,
        rejected_at: decode_optional_timestamp("rejected_at", row.rejected_at)?,
        expired_at: decode_optional_timestamp("expired_at", row.expired_at)?,
        rejection_reason: row.rejection_reason,
        version: Version::new(row.version),
        created_at: decode_timestamp("created_at", &row.created_at)?,
        created_by: decode_uuid("created_by", &row.created_by)?,
        updated_at: decode_timestamp("updated_at", &row.updated_at)?,
        updated_by: decode_uuid("updated_by", &row.updated_by)?,
    };

    handover
        .check_invariants()
        .map_err(|e| DatabaseError::ConstraintViolation(format!("handover {}: {e}", handover.id)))?;
    Ok(handover)
}
