use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// One configured shift in the rotation, as times of day on the hospital wall clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftDefinition {
    pub id: String,
    pub name: String,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    /// Position in the rotation; the successor is the next larger index, wrapping.
    pub order_index: u32,
}

impl ShiftDefinition {
    /// End earlier than (or equal to) start means the shift spans midnight.
    pub fn is_overnight(&self) -> bool {
        self.end_time <= self.start_time
    }

    /// Whether a local time of day falls in `[start, end)`.
    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.start_time == self.end_time {
            // 24h shift
            return true;
        }
        if self.is_overnight() {
            time >= self.start_time || time < self.end_time
        } else {
            time >= self.start_time && time < self.end_time
        }
    }

    /// Calendar date of the latest start of this shift at or before `now`.
    pub fn latest_start_date(&self, now: NaiveDateTime) -> NaiveDate {
        let today = now.date();
        if now.time() >= self.start_time {
            today
        } else {
            today - Duration::days(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shift(start: (u32, u32), end: (u32, u32)) -> ShiftDefinition {
        ShiftDefinition {
            id: "s".into(),
            name: "S".into(),
            start_time: NaiveTime::from_hms_opt(start.0, start.1, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(end.0, end.1, 0).unwrap(),
            order_index: 0,
        }
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn day_shift_contains_half_open_range() {
        let day = shift((7, 0), (19, 0));
        assert!(!day.is_overnight());
        assert!(day.contains(t(7, 0)));
        assert!(day.contains(t(18, 59)));
        assert!(!day.contains(t(19, 0)));
        assert!(!day.contains(t(6, 59)));
    }

    #[test]
    fn night_shift_wraps_midnight() {
        let night = shift((22, 0), (6, 0));
        assert!(night.is_overnight());
        assert!(night.contains(t(23, 30)));
        assert!(night.contains(t(2, 30)));
        assert!(!night.contains(t(6, 0)));
        assert!(!night.contains(t(12, 0)));
    }

    #[test]
    fn equal_start_and_end_is_a_full_day() {
        let all_day = shift((8, 0), (8, 0));
        assert!(all_day.contains(t(3, 0)));
        assert!(all_day.contains(t(8, 0)));
    }

    #[test]
    fn latest_start_date_rolls_back_before_start() {
        let night = shift((22, 0), (6, 0));
        let d = NaiveDate::from_ymd_opt(2025, 1, 10).unwrap();
        let late = d.and_hms_opt(23, 0, 0).unwrap();
        let early = d.and_hms_opt(2, 30, 0).unwrap();
        assert_eq!(night.latest_start_date(late), d);
        assert_eq!(
            night.latest_start_date(early),
            NaiveDate::from_ymd_opt(2025, 1, 9).unwrap()
        );
    }
}
