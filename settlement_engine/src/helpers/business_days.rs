use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};
use log::warn;

/// Saturdays, Sundays and listed public holidays do not count towards a settlement hold.
pub fn is_business_day(date: NaiveDate, holidays: &[NaiveDate]) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !holidays.contains(&date)
}

/// Walks `days` business days forward from `start`, keeping the time of day intact. An order
/// placed on a Friday with a three day hold lands on the following Wednesday, since the weekend
/// does not count.
pub fn add_business_days(start: DateTime<Utc>, days: i64, holidays: &[NaiveDate]) -> DateTime<Utc> {
    let mut remaining = days.max(0);
    let mut current = start;
    while remaining > 0 {
        current += Duration::days(1);
        if is_business_day(current.date_naive(), holidays) {
            remaining -= 1;
        }
    }
    current
}

/// Public holidays from the `MSL_PUBLIC_HOLIDAYS` environment variable, as a comma-separated
/// list of `YYYY-MM-DD` dates. Missing or empty means weekends are the only non-business days.
pub fn public_holidays() -> Vec<NaiveDate> {
    std::env::var("MSL_PUBLIC_HOLIDAYS").map(|v| parse_holiday_list(&v)).unwrap_or_default()
}

pub fn parse_holiday_list(value: &str) -> Vec<NaiveDate> {
    value
        .split(',')
        .filter_map(|entry| {
            let entry = entry.trim();
            if entry.is_empty() {
                return None;
            }
            match NaiveDate::parse_from_str(entry, "%Y-%m-%d") {
                Ok(date) => Some(date),
                Err(e) => {
                    warn!("Ignoring invalid public holiday entry '{entry}': {e}");
                    None
                },
            }
        })
        .collect()
}

#[cfg(test)]
mod test {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn friday_plus_three_business_days_is_wednesday() {
        // 2024-06-14 is a Friday
        let placed = Utc.with_ymd_and_hms(2024, 6, 14, 9, 30, 0).unwrap();
        let scheduled = add_business_days(placed, 3, &[]);
        assert_eq!(scheduled, Utc.with_ymd_and_hms(2024, 6, 19, 9, 30, 0).unwrap());
        assert_eq!(scheduled.weekday(), Weekday::Wed);
    }

    #[test]
    fn holidays_push_the_schedule_out() {
        let placed = Utc.with_ymd_and_hms(2024, 6, 14, 9, 30, 0).unwrap();
        // the following Monday is a holiday, so Wednesday becomes Thursday
        let holidays = vec![NaiveDate::from_ymd_opt(2024, 6, 17).unwrap()];
        let scheduled = add_business_days(placed, 3, &holidays);
        assert_eq!(scheduled, Utc.with_ymd_and_hms(2024, 6, 20, 9, 30, 0).unwrap());
        assert_eq!(scheduled.weekday(), Weekday::Thu);
    }

    #[test]
    fn zero_days_keeps_the_start_instant() {
        let placed = Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap();
        assert_eq!(add_business_days(placed, 0, &[]), placed);
        assert_eq!(add_business_days(placed, -2, &[]), placed);
    }

    #[test]
    fn weekend_placement_counts_from_the_next_business_day() {
        // Saturday placement with a one day hold settles on Monday
        let placed = Utc.with_ymd_and_hms(2024, 6, 15, 8, 0, 0).unwrap();
        let scheduled = add_business_days(placed, 1, &[]);
        assert_eq!(scheduled.weekday(), Weekday::Mon);
        assert_eq!(scheduled.date_naive(), NaiveDate::from_ymd_opt(2024, 6, 17).unwrap());
    }

    #[test]
    fn holiday_lists_parse_leniently() {
        let holidays = parse_holiday_list("2024-10-01, bogus, ,2024-12-25");
        assert_eq!(holidays, vec![
            NaiveDate::from_ymd_opt(2024, 10, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 12, 25).unwrap(),
        ]);
    }
}
