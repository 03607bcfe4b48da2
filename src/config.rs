use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;

use crate::dates::{compute_date_ranges, DateRange, PeriodRanges};

/// How the two comparison windows are derived from today's date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonMode {
    /// Last 28 days vs the 28 days immediately before.
    Days28,
    /// Last 90 days vs the 90 days immediately before.
    Days90,
    /// Last 90 days vs the same window one year earlier.
    YearOverYear,
}

impl ComparisonMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonMode::Days28 => "28d",
            ComparisonMode::Days90 => "90d",
            ComparisonMode::YearOverYear => "yoy",
        }
    }
}

impl fmt::Display for ComparisonMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComparisonMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "28d" => Ok(ComparisonMode::Days28),
            "90d" => Ok(ComparisonMode::Days90),
            "yoy" => Ok(ComparisonMode::YearOverYear),
            other => Err(anyhow::anyhow!(
                "unknown comparison mode '{}' (expected 28d, 90d, or yoy)",
                other
            )),
        }
    }
}

/// Settings for one audit run. Explicit period dates, when present,
/// override the window computed from the comparison mode.
#[derive(Debug, Clone)]
pub struct AuditConfig {
    pub site_url: String,
    pub comparison_mode: ComparisonMode,
    pub period_a_start: Option<NaiveDate>,
    pub period_a_end: Option<NaiveDate>,
    pub period_b_start: Option<NaiveDate>,
    pub period_b_end: Option<NaiveDate>,
    /// Minimum baseline impressions a page needs to stay a candidate.
    pub impression_threshold: u32,
    /// Minimum clicks drop in percent, e.g. 20 keeps pages at -20% or worse.
    pub clicks_drop_threshold: u32,
    /// Substring a URL must contain to count as a blog page. Empty disables.
    pub blog_url_pattern: String,
    /// Comma-separated topic patterns flagged as important. Empty disables.
    pub topic_patterns: String,
}

impl AuditConfig {
    /// Final comparison windows: computed from the mode, then each bound
    /// replaced by its explicit override when one was given.
    pub fn resolved_ranges(&self, today: NaiveDate) -> PeriodRanges {
        let computed = compute_date_ranges(self.comparison_mode, today);
        PeriodRanges {
            period_a: DateRange {
                start: self.period_a_start.unwrap_or(computed.period_a.start),
                end: self.period_a_end.unwrap_or(computed.period_a.end),
            },
            period_b: DateRange {
                start: self.period_b_start.unwrap_or(computed.period_b.start),
                end: self.period_b_end.unwrap_or(computed.period_b.end),
            },
        }
    }
}
