use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;

/// Returns the current time in the configured timezone.
pub fn now_in_timezone(tz: &Tz) -> DateTime<Tz> {
    Utc::now().with_timezone(tz)
}

/// Returns today's date in the configured timezone.
pub fn today_local(tz: &Tz) -> NaiveDate {
    now_in_timezone(tz).date_naive()
}

/// The backend stores naive UTC timestamps.
pub fn naive_utc_to_utc(naive: NaiveDateTime) -> DateTime<Utc> {
    naive.and_utc()
}

/// Whole minutes worked between two instants, expressed in hours.
pub fn elapsed_hours(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    let minutes = (end - start).num_minutes().max(0);
    minutes as f64 / 60.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn now_in_timezone_returns_datetime_in_tz() {
        let tz = chrono_tz::Asia::Tokyo;
        let result = now_in_timezone(&tz);
        assert_eq!(result.timezone(), tz);
    }

    #[test]
    fn today_local_follows_timezone() {
        let utc_today = today_local(&chrono_tz::UTC);
        let tokyo_today = today_local(&chrono_tz::Asia::Tokyo);
        let diff = (tokyo_today - utc_today).num_days();
        assert!((0..=1).contains(&diff));
    }

    #[test]
    fn naive_timestamps_are_read_as_utc() {
        let naive = NaiveDate::from_ymd_opt(2025, 1, 2)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        assert_eq!(
            naive_utc_to_utc(naive),
            Utc.with_ymd_and_hms(2025, 1, 2, 9, 0, 0).unwrap()
        );
    }

    #[test]
    fn elapsed_hours_counts_minutes() {
        let start = Utc.with_ymd_and_hms(2025, 1, 2, 9, 0, 0).unwrap();
        assert_eq!(elapsed_hours(start, start + chrono::Duration::hours(2)), 2.0);
        assert_eq!(elapsed_hours(start, start + chrono::Duration::minutes(90)), 1.5);
        assert_eq!(elapsed_hours(start, start - chrono::Duration::hours(1)), 0.0);
    }
}
