//! Shift boundary resolution: which window a handover belongs to and which
//! shift receives it.
//!
//! Works on the hospital's local wall clock. The window date is the day the
//! originating shift began, so a night shift keeps the date of its evening
//! start after midnight. Outside the shift's hours, the closest preceding
//! start of that shift is used. The receiving shift is the next one in
//! rotation order, wrapping after the last.

use std::collections::HashSet;

use chrono::NaiveDateTime;

use super::HandoverError;
use crate::config::ConfigError;
use crate::models::{ShiftDefinition, ShiftWindow};

/// Source of shift configuration.
pub trait ShiftProvider: Send + Sync {
    fn get_shift(&self, shift_id: &str) -> Option<ShiftDefinition>;

    /// All shifts, ordered by `order_index`.
    fn rotation(&self) -> Vec<ShiftDefinition>;
}

/// Immutable in-memory rotation, typically loaded from settings.
#[derive(Debug, Clone)]
pub struct ShiftRotation {
    shifts: Vec<ShiftDefinition>,
}

impl ShiftRotation {
    pub fn new(mut shifts: Vec<ShiftDefinition>) -> Result<Self, ConfigError> {
        if shifts.is_empty() {
            return Err(ConfigError::Invalid("shift rotation is empty".into()));
        }
        let mut ids = HashSet::new();
        let mut indexes = HashSet::new();
        for shift in shifts.iter() {
            if shift.id.trim().is_empty() {
                return Err(ConfigError::Invalid("shift id must not be empty".into()));
            }
            if !ids.insert(shift.id.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate shift id '{}'", shift.id)));
            }
            if !indexes.insert(shift.order_index) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate order_index {} (shift '{}')",
                    shift.order_index, shift.id
                )));
            }
        }
        shifts.sort_by_key(|s| s.order_index);
        Ok(Self { shifts })
    }

    pub fn shifts(&self) -> &[ShiftDefinition] {
        &self.shifts
    }
}

impl ShiftProvider for ShiftRotation {
    fn get_shift(&self, shift_id: &str) -> Option<ShiftDefinition> {
        self.shifts.iter().find(|s| s.id == shift_id).cloned()
    }

    fn rotation(&self) -> Vec<ShiftDefinition> {
        self.shifts.clone()
    }
}

/// Resolver output: the window plus what the caller needs for labelling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedWindow {
    pub window: ShiftWindow,
    pub from_shift_name: String,
    pub to_shift_name: String,
    /// Whether `now` fell inside the originating shift's hours.
    pub within_shift: bool,
}

impl ResolvedWindow {
    pub fn default_label(&self) -> String {
        format!("{} → {}", self.from_shift_name, self.to_shift_name)
    }
}

/// Resolve the handover window for `current_shift_id` at local time `now`.
///
/// Pure apart from reading shift configuration: same inputs, same output.
pub fn resolve<P: ShiftProvider + ?Sized>(
    shifts: &P,
    now: NaiveDateTime,
    current_shift_id: &str,
) -> Result<ResolvedWindow, HandoverError> {
    let missing = || HandoverError::ShiftConfigurationMissing(current_shift_id.to_string());

    let current = shifts.get_shift(current_shift_id).ok_or_else(missing)?;
    let rotation = shifts.rotation();
    let position = rotation
        .iter()
        .position(|s| s.id == current.id)
        .ok_or_else(missing)?;
    let successor = &rotation[(position + 1) % rotation.len()];

    let within_shift = current.contains(now.time());
    let window_date = current.latest_start_date(now);

    tracing::debug!(
        shift = %current.id,
        successor = %successor.id,
        %window_date,
        within_shift,
        "Resolved handover window"
    );

    Ok(ResolvedWindow {
        window: ShiftWindow {
            window_date,
            from_shift_id: current.id.clone(),
            to_shift_id: successor.id.clone(),
        },
        from_shift_name: current.name.clone(),
        to_shift_name: successor.name.clone(),
        within_shift,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};

    fn shift(id: &str, start: u32, end: u32, order_index: u32) -> ShiftDefinition {
        ShiftDefinition {
            id: id.into(),
            name: format!("{}{}", id[..1].to_uppercase(), &id[1..]),
            start_time: NaiveTime::from_hms_opt(start, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(end, 0, 0).unwrap(),
            order_index,
        }
    }

    fn three_shift_rotation() -> ShiftRotation {
        ShiftRotation::new(vec![
            shift("night", 22, 6, 2),
            shift("day", 6, 14, 0),
            shift("evening", 14, 22, 1),
        ])
        .unwrap()
    }

    fn local(day: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, day)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, day).unwrap()
    }

    #[test]
    fn rotation_is_sorted_by_order_index() {
        let ids: Vec<_> = three_shift_rotation()
            .shifts()
            .iter()
            .map(|s| s.id.clone())
            .collect();
        assert_eq!(ids, ["day", "evening", "night"]);
    }

    #[test]
    fn day_shift_hands_over_to_successor_same_date() {
        let r = resolve(&three_shift_rotation(), local(10, 13, 0), "day").unwrap();
        assert_eq!(r.window.window_date, d(10));
        assert_eq!(r.window.from_shift_id, "day");
        assert_eq!(r.window.to_shift_id, "evening");
        assert!(r.within_shift);
        assert_eq!(r.default_label(), "Day → Evening");
    }

    #[test]
    fn night_shift_after_midnight_keeps_start_date() {
        // 02:30 in the night that began on the 10th.
        let r = resolve(&three_shift_rotation(), local(11, 2, 30), "night").unwrap();
        assert_eq!(r.window.window_date, d(10));
        assert!(r.within_shift);
    }

    #[test]
    fn night_shift_before_midnight_uses_today() {
        let r = resolve(&three_shift_rotation(), local(10, 23, 15), "night").unwrap();
        assert_eq!(r.window.window_date, d(10));
    }

    #[test]
    fn last_shift_wraps_to_first() {
        let r = resolve(&three_shift_rotation(), local(10, 23, 0), "night").unwrap();
        assert_eq!(r.window.to_shift_id, "day");
    }

    #[test]
    fn outside_hours_falls_back_to_preceding_start() {
        let rotation = three_shift_rotation();
        // Day shift is 06–14; at 20:00 its latest start was 06:00 today.
        let late = resolve(&rotation, local(10, 20, 0), "day").unwrap();
        assert!(!late.within_shift);
        assert_eq!(late.window.window_date, d(10));
        // At 05:00 the latest start was yesterday's 06:00.
        let early = resolve(&rotation, local(10, 5, 0), "day").unwrap();
        assert!(!early.within_shift);
        assert_eq!(early.window.window_date, d(9));
    }

    #[test]
    fn start_instant_belongs_to_new_window() {
        let r = resolve(&three_shift_rotation(), local(10, 22, 0), "night").unwrap();
        assert_eq!(r.window.window_date, d(10));
        assert!(r.within_shift);
    }

    #[test]
    fn single_shift_rotation_hands_over_to_itself() {
        let rotation = ShiftRotation::new(vec![shift("all", 8, 8, 0)]).unwrap();
        let r = resolve(&rotation, local(10, 3, 0), "all").unwrap();
        assert_eq!(r.window.to_shift_id, "all");
        assert_eq!(r.window.window_date, d(9));
    }

    #[test]
    fn unknown_shift_is_configuration_missing() {
        let err = resolve(&three_shift_rotation(), local(10, 9, 0), "weekend").unwrap_err();
        assert!(matches!(err, HandoverError::ShiftConfigurationMissing(id) if id == "weekend"));
    }

    #[test]
    fn resolve_is_deterministic() {
        let rotation = three_shift_rotation();
        for (now, id) in [
            (local(10, 2, 30), "night"),
            (local(10, 13, 59), "day"),
            (local(10, 14, 0), "evening"),
            (local(10, 21, 0), "day"),
        ] {
            let first = resolve(&rotation, now, id).unwrap();
            for _ in 0..5 {
                assert_eq!(resolve(&rotation, now, id).unwrap(), first);
            }
        }
    }

    #[test]
    fn rotation_rejects_bad_configuration() {
        assert!(ShiftRotation::new(vec![]).is_err());
        assert!(ShiftRotation::new(vec![shift("day", 7, 19, 0), shift("day", 19, 7, 1)]).is_err());
        assert!(ShiftRotation::new(vec![shift("day", 7, 19, 0), shift("night", 19, 7, 0)]).is_err());
    }
}
