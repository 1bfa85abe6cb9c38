use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// How a fired reminder re-arms itself. `Reminder::recurrence` stores this
/// as a JSON string so `openmates-hotcache` doesn't need to know the shape;
/// `None` means a one-shot reminder that stays `Fired` after delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Recurrence {
    Interval { every_secs: i64 },
    Daily { hour: u8, minute: u8 },
    /// ISO weekday numbering: 0=Monday … 6=Sunday.
    Weekly { day: u8, hour: u8, minute: u8 },
}

impl Recurrence {
    pub fn to_stored(self) -> String {
        serde_json::to_string(&self).expect("Recurrence always serializes")
    }

    pub fn from_stored(s: &str) -> Option<Self> {
        serde_json::from_str(s).ok()
    }
}

/// Computes the next `trigger_at` (epoch millis) strictly after `from_millis`.
///
/// Day/hour/minute rollover arithmetic for `Daily` and `Weekly`, operating
/// on epoch millis directly since `Reminder::trigger_at` is the millis form
/// `HotCache` stores.
pub fn next_trigger_at(recurrence: Recurrence, from_millis: i64) -> Option<i64> {
    let from = Utc.timestamp_millis_opt(from_millis).single()?;

    let next = match recurrence {
        Recurrence::Interval { every_secs } => from + Duration::seconds(every_secs),

        Recurrence::Daily { hour, minute } => {
            let candidate = Utc
                .with_ymd_and_hms(from.year(), from.month(), from.day(), hour as u32, minute as u32, 0)
                .single()?;
            if candidate > from {
                candidate
            } else {
                candidate + Duration::days(1)
            }
        }

        Recurrence::Weekly { day, hour, minute } => {
            let today_dow = from.weekday().num_days_from_monday() as i64;
            let target_dow = (day as i64).clamp(0, 6);
            let days_ahead = target_dow - today_dow;

            let candidate_day = if days_ahead < 0 {
                from + Duration::days(7 + days_ahead)
            } else {
                from + Duration::days(days_ahead)
            };

            let candidate = Utc
                .with_ymd_and_hms(
                    candidate_day.year(),
                    candidate_day.month(),
                    candidate_day.day(),
                    hour as u32,
                    minute as u32,
                    0,
                )
                .single()?;

            if candidate > from {
                candidate
            } else {
                let push = if days_ahead <= 0 { 7 } else { 7 - days_ahead };
                candidate + Duration::days(push)
            }
        }
    };

    Some(next.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn stored_round_trips() {
        let r = Recurrence::Daily { hour: 9, minute: 30 };
        assert_eq!(Recurrence::from_stored(&r.to_stored()), Some(r));
    }

    #[test]
    fn from_stored_rejects_garbage() {
        assert_eq!(Recurrence::from_stored("not json"), None);
    }

    #[test]
    fn interval_advances_by_exact_offset() {
        let from = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap().timestamp_millis();
        let next = next_trigger_at(Recurrence::Interval { every_secs: 3600 }, from).unwrap();
        assert_eq!(next - from, 3_600_000);
    }

    #[test]
    fn daily_rolls_to_tomorrow_once_todays_slot_has_passed() {
        let from = Utc.with_ymd_and_hms(2026, 1, 1, 10, 0, 0).unwrap().timestamp_millis();
        let next = next_trigger_at(Recurrence::Daily { hour: 9, minute: 0 }, from).unwrap();
        let next_dt = Utc.timestamp_millis_opt(next).unwrap();
        assert_eq!(next_dt.day(), 2);
        assert_eq!(next_dt.hour(), 9);
    }

    #[test]
    fn weekly_lands_on_requested_weekday() {
        // 2026-01-01 is a Thursday (dow 3).
        let from = Utc.with_ymd_and_hms(2026, 1, 1, 8, 0, 0).unwrap().timestamp_millis();
        let next = next_trigger_at(Recurrence::Weekly { day: 0, hour: 9, minute: 0 }, from).unwrap();
        let next_dt = Utc.timestamp_millis_opt(next).unwrap();
        assert_eq!(next_dt.weekday().num_days_from_monday(), 0);
        assert!(next_dt.timestamp_millis() > from);
    }
}
