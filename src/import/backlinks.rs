use std::collections::HashSet;

use rayon::prelude::*;

use crate::matcher::normalize_url;

use super::table::{cell, clean_cell, parse_num, Table};

/// One lost backlink pointing at a page under audit.
#[derive(Debug, Clone)]
pub struct ParsedBacklink {
    pub referring_url: String,
    pub referring_title: String,
    pub domain_rating: f64,
    pub target_url: String,
    pub lost_status: String,
    pub drop_reason: String,
    pub first_seen: String,
    pub last_seen: String,
    pub lost_date: String,
}

#[derive(Debug, Clone, Copy)]
pub struct BacklinkStats {
    pub total: usize,
    /// Distinct target pages after URL normalization.
    pub target_pages: usize,
}

/// Keep backlinks whose target is one of the audited pages (or a page under
/// one) and that actually went lost. Rows missing a target or a lost status
/// are noise in the export and get dropped.
pub fn transform_backlinks(table: &Table, candidate_urls: &[String]) -> Vec<ParsedBacklink> {
    let referring_col = table.column_index("Referring page URL");
    let title_col = table.column_index("Referring page title");
    let rating_col = table.column_index("Domain rating");
    let target_col = table.column_index("Target URL");
    let status_col = table.column_index("Lost status");
    let reason_col = table.column_index("Drop reason");
    let first_seen_col = table.column_index("First seen");
    let last_seen_col = table.column_index("Last seen");
    let lost_col = table.column_index("Lost");

    let normalized_candidates: Vec<String> =
        candidate_urls.iter().map(|u| normalize_url(u)).collect();

    let mut links: Vec<ParsedBacklink> = table
        .rows
        .par_iter()
        .filter_map(|row| {
            let target_url = clean_cell(cell(row, target_col));
            if target_url.is_empty() {
                return None;
            }

            let target = normalize_url(&target_url);
            let targets_audited_page = normalized_candidates
                .iter()
                .any(|c| target == *c || target.starts_with(c.as_str()));
            if !targets_audited_page {
                return None;
            }

            let lost_status = clean_cell(cell(row, status_col));
            if lost_status.is_empty() {
                return None;
            }

            Some(ParsedBacklink {
                referring_url: clean_cell(cell(row, referring_col)),
                referring_title: clean_cell(cell(row, title_col)),
                domain_rating: parse_num(cell(row, rating_col)),
                target_url,
                lost_status,
                drop_reason: clean_cell(cell(row, reason_col)),
                first_seen: clean_cell(cell(row, first_seen_col)),
                last_seen: clean_cell(cell(row, last_seen_col)),
                lost_date: clean_cell(cell(row, lost_col)),
            })
        })
        .collect();

    links.sort_by(|a, b| b.domain_rating.total_cmp(&a.domain_rating));
    links
}

pub fn backlink_stats(backlinks: &[ParsedBacklink]) -> BacklinkStats {
    let target_pages: HashSet<String> =
        backlinks.iter().map(|b| normalize_url(&b.target_url)).collect();
    BacklinkStats {
        total: backlinks.len(),
        target_pages: target_pages.len(),
    }
}
