use chrono::{Datelike, Duration, NaiveDate};

use crate::config::ComparisonMode;

/// Search performance data lags a few days behind; windows end before that.
pub const FRESHNESS_LAG_DAYS: i64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Period A is the recent window, period B the baseline it is compared to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodRanges {
    pub period_a: DateRange,
    pub period_b: DateRange,
}

/// Derive both comparison windows from a reference date.
/// For the rolling modes the windows are adjacent and gap-free; for
/// year-over-year the baseline is the same calendar window a year back.
pub fn compute_date_ranges(mode: ComparisonMode, today: NaiveDate) -> PeriodRanges {
    let end = today - Duration::days(FRESHNESS_LAG_DAYS);
    match mode {
        ComparisonMode::Days28 => adjacent_windows(end, 28),
        ComparisonMode::Days90 => adjacent_windows(end, 90),
        ComparisonMode::YearOverYear => {
            let a_start = end - Duration::days(89);
            PeriodRanges {
                period_a: DateRange { start: a_start, end },
                period_b: DateRange {
                    start: shift_back_one_year(a_start),
                    end: shift_back_one_year(end),
                },
            }
        }
    }
}

fn adjacent_windows(end: NaiveDate, days: i64) -> PeriodRanges {
    let a_start = end - Duration::days(days - 1);
    let b_end = a_start - Duration::days(1);
    let b_start = b_end - Duration::days(days - 1);
    PeriodRanges {
        period_a: DateRange { start: a_start, end },
        period_b: DateRange { start: b_start, end: b_end },
    }
}

/// Calendar shift, not day arithmetic. Feb 29 deliberately clamps to
/// Feb 28 rather than rolling forward into Mar 1.
fn shift_back_one_year(d: NaiveDate) -> NaiveDate {
    let year = d.year() - 1;
    NaiveDate::from_ymd_opt(year, d.month(), d.day())
        .unwrap_or_else(|| NaiveDate::from_ymd_opt(year, 2, 28).unwrap())
}
