use std::sync::LazyLock;

use chrono::{Datelike, Duration, Months, NaiveDate};
use regex::Regex;

use crate::date_util::quarter_of;
use crate::error::{Error, Result};
use crate::registry::Cadence;

static RE_QUARTER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{4})-Q([1-4])$").unwrap());
static RE_MONTH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{2})$").unwrap());

/// Trailing window used to find the latest point of a snapshot metric.
pub const SNAPSHOT_LOOKBACK_DAYS: u32 = 365;

/// Years accepted for reporting windows.
pub const YEAR_RANGE: std::ops::RangeInclusive<i32> = 1900..=9999;

/// Reject years outside [`YEAR_RANGE`].
pub fn check_year(year: i32) -> Result<i32> {
    if YEAR_RANGE.contains(&year) {
        Ok(year)
    } else {
        Err(Error::PeriodParse(format!(
            "year {year} out of range ({}..={})",
            YEAR_RANGE.start(),
            YEAR_RANGE.end()
        )))
    }
}

fn first_of_month(year: i32, month: u32) -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(check_year(year)?, month, 1)
        .ok_or_else(|| Error::PeriodParse(format!("invalid month: {year}-{month:02}")))
}

fn end_of_month(year: i32, month: u32) -> Result<NaiveDate> {
    first_of_month(year, month)?
        .checked_add_months(Months::new(1))
        .and_then(|d| d.pred_opt())
        .ok_or_else(|| Error::PeriodParse(format!("invalid month: {year}-{month:02}")))
}

/// A reporting window for metric values and series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Period {
    Year(i32),
    Quarter(i32, u8),
    Month(i32, u8),
    Rolling(u32, NaiveDate),
    YearToDate(i32),
    QuarterToDate(i32, u8),
    MonthToDate(i32, u8),
}

impl Period {
    /// Parse a period string relative to today.
    ///
    /// Supported formats:
    /// - `2026` — year
    /// - `2026-Q1` — quarter
    /// - `2026-01` — month
    /// - `90d` — rolling last N days
    /// - `ytd`, `qtd`, `mtd` — to-date windows of the current year/quarter/month
    pub fn parse(s: &str) -> Result<Self> {
        Self::parse_as_of(s, chrono::Local::now().date_naive())
    }

    /// Parse a period string relative to `today`.
    pub fn parse_as_of(s: &str, today: NaiveDate) -> Result<Self> {
        let s = s.trim();

        match s.to_lowercase().as_str() {
            "ytd" => return Ok(Period::YearToDate(today.year())),
            "qtd" => return Ok(Period::QuarterToDate(today.year(), quarter_of(today))),
            "mtd" => return Ok(Period::MonthToDate(today.year(), today.month() as u8)),
            _ => {}
        }

        // Rolling: "30d", "90d", etc.
        if s.ends_with('d') || s.ends_with('D') {
            if let Ok(n) = s[..s.len() - 1].parse::<u32>() {
                if n > 0 {
                    return Ok(Period::Rolling(n, today));
                }
            }
        }

        if let Some(rest) = s.strip_suffix("-ytd") {
            let year: i32 = rest
                .parse()
                .map_err(|_| Error::PeriodParse(format!("invalid year: {s}")))?;
            return Ok(Period::YearToDate(check_year(year)?));
        }

        if s.len() == 4 {
            if let Ok(year) = s.parse::<i32>() {
                return Ok(Period::Year(check_year(year)?));
            }
        }

        if let Some(caps) = RE_QUARTER.captures(s) {
            if let (Ok(year), Ok(q)) = (caps[1].parse::<i32>(), caps[2].parse::<u8>()) {
                return Ok(Period::Quarter(check_year(year)?, q));
            }
        }

        if let Some(caps) = RE_MONTH.captures(s) {
            if let (Ok(year), Ok(month)) = (caps[1].parse::<i32>(), caps[2].parse::<u8>()) {
                if (1..=12).contains(&month) {
                    return Ok(Period::Month(check_year(year)?, month));
                }
            }
        }

        Err(Error::PeriodParse(format!("unrecognized period: {s}")))
    }

    /// The window a metric's current value is computed over.
    ///
    /// Flow metrics accumulate from the start of their cadence period up to
    /// `as_of`; snapshot metrics look back far enough to find the latest
    /// snapshot.
    pub fn for_cadence(cadence: Cadence, as_of: NaiveDate) -> Self {
        match cadence {
            Cadence::Monthly => Period::MonthToDate(as_of.year(), as_of.month() as u8),
            Cadence::Quarterly => Period::QuarterToDate(as_of.year(), quarter_of(as_of)),
            Cadence::Annual => Period::YearToDate(as_of.year()),
            Cadence::Snapshot => Period::Rolling(SNAPSHOT_LOOKBACK_DAYS, as_of),
        }
    }

    /// Convert to a canonical key string.
    pub fn to_key(&self) -> String {
        match self {
            Period::Year(y) => format!("{y}"),
            Period::Quarter(y, q) => format!("{y}-Q{q}"),
            Period::Month(y, m) => format!("{y}-{m:02}"),
            Period::Rolling(n, _) => format!("{n}d"),
            Period::YearToDate(y) => format!("{y}-ytd"),
            Period::QuarterToDate(y, q) => format!("{y}-Q{q}-td"),
            Period::MonthToDate(y, m) => format!("{y}-{m:02}-td"),
        }
    }

    /// Date range (inclusive start, inclusive end) relative to today.
    pub fn date_range(&self) -> Result<(NaiveDate, NaiveDate)> {
        self.date_range_as_of(chrono::Local::now().date_naive())
    }

    /// Date range (inclusive start, inclusive end); to-date periods end at
    /// `as_of`. Fails for years outside [`YEAR_RANGE`] or invalid quarters
    /// and months.
    pub fn date_range_as_of(&self, as_of: NaiveDate) -> Result<(NaiveDate, NaiveDate)> {
        let quarter_start = |q: u8| -> Result<u32> {
            if (1..=4).contains(&q) {
                Ok((q as u32 - 1) * 3 + 1)
            } else {
                Err(Error::PeriodParse(format!("invalid quarter: Q{q}")))
            }
        };
        match self {
            Period::Year(y) => Ok((first_of_month(*y, 1)?, end_of_month(*y, 12)?)),
            Period::Quarter(y, q) => {
                let start_month = quarter_start(*q)?;
                Ok((first_of_month(*y, start_month)?, end_of_month(*y, start_month + 2)?))
            }
            Period::Month(y, m) => Ok((first_of_month(*y, *m as u32)?, end_of_month(*y, *m as u32)?)),
            Period::Rolling(n, end) => {
                let start = end
                    .checked_sub_signed(Duration::days(*n as i64 - 1))
                    .ok_or_else(|| Error::PeriodParse(format!("{n}d before {end} is out of range")))?;
                Ok((start, *end))
            }
            Period::YearToDate(y) => Ok((first_of_month(*y, 1)?, as_of)),
            Period::QuarterToDate(y, q) => Ok((first_of_month(*y, quarter_start(*q)?)?, as_of)),
            Period::MonthToDate(y, m) => Ok((first_of_month(*y, *m as u32)?, as_of)),
        }
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_key())
    }
}
