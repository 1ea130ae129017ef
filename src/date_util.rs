use chrono::{Datelike, Duration, NaiveDate};

/// Get the last day of a given month.
pub fn last_day_of_month(year: i32, month: u32) -> NaiveDate {
    if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1).unwrap() - Duration::days(1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1).unwrap() - Duration::days(1)
    }
}

/// Get the quarter (1-4) for a given date.
pub fn quarter_of(d: NaiveDate) -> u8 {
    ((d.month() - 1) / 3 + 1) as u8
}

/// Quarter (1-4) for a month number (1-12).
pub fn quarter_of_month(month: u32) -> u8 {
    ((month - 1) / 3 + 1) as u8
}

/// Format a year/month pair as the `YYYY-MM` key used by series points.
pub fn month_key(year: i32, month: u32) -> String {
    format!("{year}-{month:02}")
}

/// Parse a `YYYY-MM` key back into (year, month). Also accepts full
/// `YYYY-MM-DD` dates, ignoring the day.
pub fn parse_month_key(key: &str) -> Option<(i32, u32)> {
    let mut parts = key.splitn(3, '-');
    let year = parts.next()?.parse::<i32>().ok()?;
    let month = parts.next()?.parse::<u32>().ok()?;
    if (1..=12).contains(&month) {
        Some((year, month))
    } else {
        None
    }
}

/// The month immediately before (year, month).
pub fn prior_month(year: i32, month: u32) -> (i32, u32) {
    if month == 1 {
        (year - 1, 12)
    } else {
        (year, month - 1)
    }
}

/// First day of the month before the month containing `d`.
pub fn first_of_prior_month(d: NaiveDate) -> NaiveDate {
    let (y, m) = prior_month(d.year(), d.month());
    NaiveDate::from_ymd_opt(y, m, 1).unwrap()
}

/// Every (year, month) from the month of `start` through the month of `end`,
/// inclusive. Empty when `end` precedes `start`.
pub fn months_between(start: NaiveDate, end: NaiveDate) -> Vec<(i32, u32)> {
    let mut out = Vec::new();
    let (mut y, mut m) = (start.year(), start.month());
    while (y, m) <= (end.year(), end.month()) {
        out.push((y, m));
        if m == 12 {
            y += 1;
            m = 1;
        } else {
            m += 1;
        }
    }
    out
}

/// Format a date as the `YYYY-MM-DD` text stored in the warehouse.
pub fn date_key(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_day_of_month() {
        assert_eq!(
            last_day_of_month(2025, 1),
            NaiveDate::from_ymd_opt(2025, 1, 31).unwrap()
        );
        assert_eq!(
            last_day_of_month(2024, 2),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        ); // Leap year
        assert_eq!(
            last_day_of_month(2025, 12),
            NaiveDate::from_ymd_opt(2025, 12, 31).unwrap()
        );
    }

    #[test]
    fn test_quarter_of() {
        assert_eq!(quarter_of(NaiveDate::from_ymd_opt(2026, 3, 31).unwrap()), 1);
        assert_eq!(quarter_of(NaiveDate::from_ymd_opt(2026, 4, 1).unwrap()), 2);
        assert_eq!(quarter_of(NaiveDate::from_ymd_opt(2026, 12, 31).unwrap()), 4);
        assert_eq!(quarter_of_month(9), 3);
        assert_eq!(quarter_of_month(10), 4);
    }

    #[test]
    fn test_month_keys() {
        assert_eq!(month_key(2026, 3), "2026-03");
        assert_eq!(parse_month_key("2026-03"), Some((2026, 3)));
        assert_eq!(parse_month_key("2026-11-30"), Some((2026, 11)));
        assert_eq!(parse_month_key("2026-13"), None);
        assert_eq!(parse_month_key("garbage"), None);
    }

    #[test]
    fn test_prior_month_wraps_year() {
        assert_eq!(prior_month(2026, 1), (2025, 12));
        assert_eq!(prior_month(2026, 7), (2026, 6));
        assert_eq!(
            first_of_prior_month(NaiveDate::from_ymd_opt(2026, 1, 20).unwrap()),
            NaiveDate::from_ymd_opt(2025, 12, 1).unwrap()
        );
    }

    #[test]
    fn test_months_between() {
        let start = NaiveDate::from_ymd_opt(2025, 11, 15).unwrap();
        let end = NaiveDate::from_ymd_opt(2026, 2, 1).unwrap();
        assert_eq!(
            months_between(start, end),
            vec![(2025, 11), (2025, 12), (2026, 1), (2026, 2)]
        );
        assert!(months_between(end, start).is_empty());
    }
}
