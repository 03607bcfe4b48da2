use std::collections::{HashMap, HashSet};

use crate::gsc::SearchAnalyticsRow;

/// One page with metrics from both comparison periods.
/// Suffix A is the recent window, suffix B the baseline.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub url: String,
    pub clicks_a: f64,
    pub clicks_b: f64,
    pub clicks_diff_percent: f64,
    pub impressions_a: f64,
    pub impressions_b: f64,
    pub impressions_diff: f64,
    pub position_a: f64,
    pub position_b: f64,
    pub position_diff: f64,
    pub ctr_a: f64,
    pub ctr_b: f64,
    pub ctr_diff: f64,
    pub is_important: bool,
    pub topic_match: Option<String>,
    /// Reserved for a later keyword-level pass; nothing sets it yet.
    pub has_cannibalization: bool,
}

/// Join both periods on page URL. A page present in only one period gets
/// zeroes for the other side. Output order is first-seen order: every
/// recent-period page, then baseline-only pages.
pub fn merge_periods(recent: &[SearchAnalyticsRow], baseline: &[SearchAnalyticsRow]) -> Vec<Candidate> {
    let map_a = index_by_url(recent);
    let map_b = index_by_url(baseline);

    let mut urls: Vec<&str> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    for row in recent.iter().chain(baseline) {
        if let Some(url) = row.keys.first() {
            if seen.insert(url.as_str()) {
                urls.push(url.as_str());
            }
        }
    }

    urls.into_iter()
        .map(|url| {
            let a = map_a.get(url);
            let b = map_b.get(url);
            let clicks_a = a.map_or(0.0, |r| r.clicks);
            let clicks_b = b.map_or(0.0, |r| r.clicks);
            let impressions_a = a.map_or(0.0, |r| r.impressions);
            let impressions_b = b.map_or(0.0, |r| r.impressions);
            let position_a = a.map_or(0.0, |r| r.position);
            let position_b = b.map_or(0.0, |r| r.position);
            let ctr_a = a.map_or(0.0, |r| r.ctr);
            let ctr_b = b.map_or(0.0, |r| r.ctr);

            Candidate {
                url: url.to_string(),
                clicks_a,
                clicks_b,
                clicks_diff_percent: percent_change(clicks_a, clicks_b),
                impressions_a,
                impressions_b,
                impressions_diff: percent_change(impressions_a, impressions_b),
                position_a,
                position_b,
                // Positive means the page slipped down the results
                position_diff: position_a - position_b,
                ctr_a,
                ctr_b,
                ctr_diff: ctr_a - ctr_b,
                is_important: false,
                topic_match: None,
                has_cannibalization: false,
            }
        })
        .collect()
}

fn index_by_url(rows: &[SearchAnalyticsRow]) -> HashMap<&str, &SearchAnalyticsRow> {
    rows.iter()
        .filter_map(|r| r.keys.first().map(|k| (k.as_str(), r)))
        .collect()
}

/// Relative change in percent. A zero baseline yields 0 rather than a
/// division blowup, so brand-new pages read as "no change".
fn percent_change(recent: f64, baseline: f64) -> f64 {
    if baseline > 0.0 {
        (recent - baseline) / baseline * 100.0
    } else {
        0.0
    }
}
