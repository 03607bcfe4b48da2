use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::AuditConfig;
use crate::dates::{DateRange, PeriodRanges};
use crate::merge::{merge_periods, Candidate};

const API_BASE: &str = "https://searchconsole.googleapis.com/webmasters/v3";

/// The API caps a single query at 25k rows; larger results are paginated.
pub const MAX_ROWS_PER_PAGE: usize = 25_000;

/// One row of search performance data. `keys` holds the dimension values,
/// the page URL first for page-dimension queries.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchAnalyticsRow {
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default)]
    pub clicks: f64,
    #[serde(default)]
    pub impressions: f64,
    #[serde(default)]
    pub ctr: f64,
    #[serde(default)]
    pub position: f64,
}

/// A search-performance property visible to the current token.
#[derive(Debug, Clone, Deserialize)]
pub struct GscSite {
    #[serde(rename = "siteUrl", default)]
    pub site_url: String,
    #[serde(rename = "permissionLevel", default = "unverified")]
    pub permission_level: String,
}

fn unverified() -> String {
    "siteUnverifiedUser".to_string()
}

/// One page of a search analytics query. `start_row` is the zero-based
/// offset of the first row wanted.
#[async_trait]
pub trait SearchAnalyticsSource {
    async fn query_page(
        &self,
        site_url: &str,
        range: DateRange,
        dimensions: &[&str],
        row_limit: usize,
        start_row: usize,
    ) -> Result<Vec<SearchAnalyticsRow>>;
}

/// Drain every page of one period. Pages are sequential because each offset
/// depends on the previous page; the loop ends at the first short page.
pub async fn fetch_all_rows(
    source: &impl SearchAnalyticsSource,
    site_url: &str,
    range: DateRange,
    row_limit: usize,
) -> Result<Vec<SearchAnalyticsRow>> {
    let mut all = Vec::new();
    let mut start_row = 0usize;
    loop {
        let page = source
            .query_page(site_url, range, &["page"], row_limit, start_row)
            .await?;
        debug!("Page at offset {}: {} rows", start_row, page.len());
        let short = page.len() < row_limit;
        all.extend(page);
        if short {
            break;
        }
        start_row += row_limit;
    }
    Ok(all)
}

/// Fetch both comparison windows concurrently and merge them into per-page
/// candidates. Either period failing fails the comparison.
pub async fn fetch_and_compare(
    source: &impl SearchAnalyticsSource,
    config: &AuditConfig,
    today: NaiveDate,
) -> Result<(Vec<Candidate>, PeriodRanges)> {
    let ranges = config.resolved_ranges(today);
    info!(
        "Comparing {} .. {} against {} .. {}",
        ranges.period_a.start, ranges.period_a.end, ranges.period_b.start, ranges.period_b.end
    );

    let (rows_a, rows_b) = tokio::try_join!(
        async {
            fetch_all_rows(source, &config.site_url, ranges.period_a, MAX_ROWS_PER_PAGE)
                .await
                .context("Recent period fetch failed")
        },
        async {
            fetch_all_rows(source, &config.site_url, ranges.period_b, MAX_ROWS_PER_PAGE)
                .await
                .context("Baseline period fetch failed")
        },
    )?;
    info!(
        "Fetched {} recent rows, {} baseline rows",
        rows_a.len(),
        rows_b.len()
    );

    Ok((merge_periods(&rows_a, &rows_b), ranges))
}

// ── HTTP client ──

/// Error for a non-2xx response: status plus a short body excerpt.
fn api_rejection(what: &str, status: reqwest::StatusCode, body: &str) -> anyhow::Error {
    let excerpt = crate::truncate(body.trim(), 200);
    if excerpt.is_empty() {
        anyhow::anyhow!("{} was rejected: {}", what, status)
    } else {
        anyhow::anyhow!("{} was rejected: {}: {}", what, status, excerpt)
    }
}

pub struct GscClient {
    http: reqwest::Client,
    access_token: String,
    base_url: String,
}

impl GscClient {
    pub fn new(access_token: String) -> Self {
        GscClient {
            http: reqwest::Client::new(),
            access_token,
            base_url: API_BASE.to_string(),
        }
    }

    /// Build a client from the GSC_ACCESS_TOKEN environment variable.
    pub fn from_env() -> Result<Self> {
        let token = std::env::var("GSC_ACCESS_TOKEN")
            .map_err(|_| anyhow::anyhow!("GSC_ACCESS_TOKEN environment variable must be set"))?;
        Ok(GscClient::new(token))
    }

    /// All properties the token can read, unverified ones included.
    pub async fn list_sites(&self) -> Result<Vec<GscSite>> {
        #[derive(Deserialize)]
        struct SitesResponse {
            #[serde(rename = "siteEntry", default)]
            site_entry: Vec<GscSite>,
        }

        let url = format!("{}/sites", self.base_url);
        let resp = self
            .http
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .context("Failed to reach the site listing endpoint")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(api_rejection("Site listing request", status, &text));
        }
        let body: SitesResponse = resp.json().await.context("Malformed site listing response")?;
        Ok(body.site_entry)
    }
}

#[async_trait]
impl SearchAnalyticsSource for GscClient {
    async fn query_page(
        &self,
        site_url: &str,
        range: DateRange,
        dimensions: &[&str],
        row_limit: usize,
        start_row: usize,
    ) -> Result<Vec<SearchAnalyticsRow>> {
        #[derive(Deserialize)]
        struct QueryResponse {
            #[serde(default)]
            rows: Vec<SearchAnalyticsRow>,
        }

        let url = format!(
            "{}/sites/{}/searchAnalytics/query",
            self.base_url,
            urlencoding::encode(site_url)
        );
        let body = serde_json::json!({
            "startDate": range.start.to_string(),
            "endDate": range.end.to_string(),
            "dimensions": dimensions,
            "rowLimit": row_limit,
            "startRow": start_row,
            "dataState": "final",
        });

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Query request failed for {}", site_url))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(api_rejection(&format!("Query for {}", site_url), status, &text));
        }
        let parsed: QueryResponse = resp
            .json()
            .await
            .with_context(|| format!("Malformed query response for {}", site_url))?;
        Ok(parsed.rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ComparisonMode;
    use std::sync::Mutex;

    /// Serves a scripted sequence of page results and records requested
    /// offsets. Once the script runs out, every request gets an empty page.
    struct ScriptedSource {
        pages: Mutex<Vec<Result<Vec<SearchAnalyticsRow>>>>,
        offsets: Mutex<Vec<usize>>,
    }

    impl ScriptedSource {
        fn new(pages: Vec<Vec<SearchAnalyticsRow>>) -> Self {
            ScriptedSource {
                pages: Mutex::new(pages.into_iter().map(Ok).collect()),
                offsets: Mutex::new(Vec::new()),
            }
        }

        /// Like `new`, but the first request after the scripted pages fails.
        fn failing_after(pages: Vec<Vec<SearchAnalyticsRow>>, message: &'static str) -> Self {
            let source = ScriptedSource::new(pages);
            source.pages.lock().unwrap().push(Err(anyhow::anyhow!(message)));
            source
        }
    }

    #[async_trait]
    impl SearchAnalyticsSource for ScriptedSource {
        async fn query_page(
            &self,
            _site_url: &str,
            _range: DateRange,
            _dimensions: &[&str],
            _row_limit: usize,
            start_row: usize,
        ) -> Result<Vec<SearchAnalyticsRow>> {
            self.offsets.lock().unwrap().push(start_row);
            let mut pages = self.pages.lock().unwrap();
            if pages.is_empty() {
                Ok(Vec::new())
            } else {
                pages.remove(0)
            }
        }
    }

    fn rows(n: usize, tag: &str) -> Vec<SearchAnalyticsRow> {
        (0..n)
            .map(|i| SearchAnalyticsRow {
                keys: vec![format!("https://x.com/{}/{}", tag, i)],
                clicks: 1.0,
                impressions: 10.0,
                ctr: 0.1,
                position: 5.0,
            })
            .collect()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn range() -> DateRange {
        DateRange {
            start: date(2026, 5, 1),
            end: date(2026, 7, 29),
        }
    }

    fn base_config() -> AuditConfig {
        AuditConfig {
            site_url: "sc-domain:x.com".into(),
            comparison_mode: ComparisonMode::Days90,
            period_a_start: None,
            period_a_end: None,
            period_b_start: None,
            period_b_end: None,
            impression_threshold: 500,
            clicks_drop_threshold: 20,
            blog_url_pattern: "/blog/".into(),
            topic_patterns: String::new(),
        }
    }

    #[tokio::test]
    async fn single_short_page_stops() {
        let source = ScriptedSource::new(vec![rows(3, "p")]);
        let got = fetch_all_rows(&source, "sc-domain:x.com", range(), 10).await.unwrap();
        assert_eq!(got.len(), 3);
        assert_eq!(*source.offsets.lock().unwrap(), vec![0]);
    }

    #[tokio::test]
    async fn full_pages_advance_offset_by_limit() {
        let source = ScriptedSource::new(vec![rows(10, "a"), rows(10, "b"), rows(4, "c")]);
        let got = fetch_all_rows(&source, "sc-domain:x.com", range(), 10).await.unwrap();
        assert_eq!(got.len(), 24);
        assert_eq!(*source.offsets.lock().unwrap(), vec![0, 10, 20]);
    }

    #[tokio::test]
    async fn exact_multiple_needs_trailing_empty_page() {
        let source = ScriptedSource::new(vec![rows(10, "a"), Vec::new()]);
        let got = fetch_all_rows(&source, "sc-domain:x.com", range(), 10).await.unwrap();
        assert_eq!(got.len(), 10);
        assert_eq!(*source.offsets.lock().unwrap(), vec![0, 10]);
    }

    #[tokio::test]
    async fn empty_result_is_fine() {
        let source = ScriptedSource::new(vec![]);
        let got = fetch_all_rows(&source, "sc-domain:x.com", range(), 10).await.unwrap();
        assert!(got.is_empty());
    }

    #[tokio::test]
    async fn compares_both_periods_and_merges() {
        // Each period is one short page; recent drains first, then baseline.
        let source = ScriptedSource::new(vec![rows(2, "recent"), rows(1, "baseline")]);
        let (candidates, ranges) = fetch_and_compare(&source, &base_config(), date(2026, 8, 1))
            .await
            .unwrap();

        assert_eq!(candidates.len(), 3);
        assert_eq!(source.offsets.lock().unwrap().len(), 2);
        assert_eq!(ranges.period_a.end, date(2026, 7, 29));
        // The baseline-only page gets zeroes on the recent side
        assert_eq!(candidates[2].url, "https://x.com/baseline/0");
        assert_eq!(candidates[2].clicks_a, 0.0);
        assert_eq!(candidates[2].clicks_b, 1.0);
    }

    #[tokio::test]
    async fn one_failed_period_fails_the_comparison() {
        let source = ScriptedSource::failing_after(vec![rows(1, "recent")], "token expired");
        let err = fetch_and_compare(&source, &base_config(), date(2026, 8, 1))
            .await
            .unwrap_err();

        let msg = format!("{:#}", err);
        assert!(msg.contains("Baseline period"));
        assert!(msg.contains("token expired"));
    }

    #[test]
    fn rejection_keeps_status_and_body() {
        let err = api_rejection(
            "Query for sc-domain:x.com",
            reqwest::StatusCode::FORBIDDEN,
            r#"{"error":{"code":403,"message":"Quota exceeded"}}"#,
        );
        let msg = err.to_string();
        assert!(msg.contains("403 Forbidden"));
        assert!(msg.contains("Quota exceeded"));
    }

    #[test]
    fn rejection_truncates_long_bodies() {
        let body = "x".repeat(1000);
        let msg = api_rejection("Site listing request", reqwest::StatusCode::INTERNAL_SERVER_ERROR, &body)
            .to_string();
        assert!(msg.ends_with("..."));
        assert!(msg.len() < 280);
    }

    #[test]
    fn rejection_without_body_is_status_only() {
        let msg = api_rejection("Site listing request", reqwest::StatusCode::UNAUTHORIZED, "  ")
            .to_string();
        assert_eq!(msg, "Site listing request was rejected: 401 Unauthorized");
    }
}
