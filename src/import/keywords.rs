use rayon::prelude::*;

use crate::matcher::match_keyword_to_page;
use crate::scoring::{classify_junk, value_score};

use super::table::{cell, clean_cell, parse_num, Table};

/// A keyword the site lost ground on, scored and matched to a page.
#[derive(Debug, Clone)]
pub struct LostKeyword {
    pub keyword: String,
    pub volume: f64,
    pub position: f64,
    pub position_before: f64,
    pub traffic: f64,
    pub traffic_change: f64,
    pub kd: Option<f64>,
    pub value_score: f64,
    pub is_junk: bool,
    pub junk_reason: Option<String>,
    pub is_selected: bool,
    /// Best-matching candidate page, when the matcher found one.
    pub candidate_url: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct KeywordMatchStats {
    pub total: usize,
    pub matched: usize,
    pub unmatched: usize,
}

/// Turn a classified organic-keywords table into scored lost keywords.
/// Rows are independent, so the per-row work is parallel; the final sort
/// makes the output order deterministic regardless of scheduling.
pub fn transform_keywords(table: &Table, candidate_urls: &[String]) -> Vec<LostKeyword> {
    let keyword_col = table.column_index("Keyword");
    let volume_col = table.column_index("Volume");
    let traffic_col = table.column_index("Current organic traffic");
    let traffic_change_col = table.column_index("Organic traffic change");
    let prev_position_col = table.column_index("Previous average position");
    let cur_position_col = table.column_index("Current average position");
    let kd_col = table.column_index("Keyword Difficulty");
    let kd_short_col = table.column_index("KD");

    let mut keywords: Vec<LostKeyword> = table
        .rows
        .par_iter()
        .filter_map(|row| {
            let keyword = clean_cell(cell(row, keyword_col));
            if keyword.is_empty() {
                return None;
            }

            let volume = parse_num(cell(row, volume_col));
            let traffic = parse_num(cell(row, traffic_col));
            let traffic_change = parse_num(cell(row, traffic_change_col));
            let position_before = parse_num(cell(row, prev_position_col));
            let position = parse_num(cell(row, cur_position_col));

            // Long-form column preferred; a blank cell falls through to "KD"
            let kd = cell(row, kd_col)
                .filter(|v| !v.is_empty())
                .or_else(|| cell(row, kd_short_col).filter(|v| !v.is_empty()))
                .map(|v| parse_num(Some(v)));

            let score = value_score(volume, traffic_change, position_before, kd);
            let junk_reason = classify_junk(volume, kd);
            let candidate_url = match_keyword_to_page(&keyword, candidate_urls).map(str::to_string);

            Some(LostKeyword {
                keyword,
                volume,
                position,
                position_before,
                traffic,
                traffic_change,
                kd,
                value_score: score,
                is_junk: junk_reason.is_some(),
                junk_reason: junk_reason.map(str::to_string),
                is_selected: junk_reason.is_none(),
                candidate_url,
            })
        })
        .collect();

    keywords.sort_by(|a, b| b.value_score.total_cmp(&a.value_score));
    keywords
}

pub fn match_stats(keywords: &[LostKeyword]) -> KeywordMatchStats {
    let matched = keywords.iter().filter(|k| k.candidate_url.is_some()).count();
    KeywordMatchStats {
        total: keywords.len(),
        matched,
        unmatched: keywords.len() - matched,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "Keyword,Volume,Current organic traffic,Organic traffic change,Previous average position,Current average position";

    fn candidates(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|u| u.to_string()).collect()
    }

    #[test]
    fn scores_and_sorts_descending() {
        let csv = format!(
            "{}\nbig keyword,2000,50,-400,10,25\nsmall keyword,300,5,-20,30,40\n",
            HEADER
        );
        let table = Table::parse(&csv);
        let kws = transform_keywords(&table, &[]);
        assert_eq!(kws.len(), 2);
        assert_eq!(kws[0].keyword, "big keyword");
        // 2000*0.4 + 400*0.5 + 10*0.1 = 1001
        assert_eq!(kws[0].value_score, 1001.0);
        assert!(kws[0].value_score > kws[1].value_score);
    }

    #[test]
    fn no_kd_column_means_no_kd() {
        let csv = format!("{}\nsome keyword,500,10,-50,12,20\n", HEADER);
        let kws = transform_keywords(&Table::parse(&csv), &[]);
        assert_eq!(kws[0].kd, None);
    }

    #[test]
    fn kd_column_feeds_penalty_and_junk() {
        let csv = format!(
            "{},KD\neasy keyword,1000,20,-200,15,30,10\nhard keyword,1000,20,-200,15,30,70\n",
            HEADER
        );
        let kws = transform_keywords(&Table::parse(&csv), &[]);
        let easy = kws.iter().find(|k| k.keyword == "easy keyword").unwrap();
        let hard = kws.iter().find(|k| k.keyword == "hard keyword").unwrap();
        assert_eq!(easy.value_score, 501.0);
        assert_eq!(hard.value_score, 498.0);
        assert!(!easy.is_junk);
        assert!(hard.is_junk);
        assert!(!hard.is_selected);
    }

    #[test]
    fn long_form_kd_header_wins() {
        let csv = format!("{},Keyword Difficulty\nsome keyword,1000,20,-200,15,30,40\n", HEADER);
        let kws = transform_keywords(&Table::parse(&csv), &[]);
        assert_eq!(kws[0].kd, Some(40.0));
    }

    #[test]
    fn blank_keyword_rows_are_skipped() {
        let csv = format!("{}\n,500,10,-50,12,20\nreal keyword,500,10,-50,12,20\n", HEADER);
        let kws = transform_keywords(&Table::parse(&csv), &[]);
        assert_eq!(kws.len(), 1);
        assert_eq!(kws[0].keyword, "real keyword");
    }

    #[test]
    fn junk_keywords_start_deselected() {
        let csv = format!("{}\ntiny keyword,50,1,-5,40,50\n", HEADER);
        let kws = transform_keywords(&Table::parse(&csv), &[]);
        assert!(kws[0].is_junk);
        assert!(!kws[0].is_selected);
        assert!(kws[0].junk_reason.as_deref().unwrap().starts_with("Volume"));
    }

    #[test]
    fn matches_against_candidate_pages() {
        let csv = format!(
            "{}\nheadless cms migration,900,40,-100,8,18\nunrelated topic,900,40,-100,8,18\n",
            HEADER
        );
        let urls = candidates(&["https://x.com/blog/headless-cms-migration-guide"]);
        let kws = transform_keywords(&Table::parse(&csv), &urls);
        let matched = kws.iter().find(|k| k.keyword == "headless cms migration").unwrap();
        let unmatched = kws.iter().find(|k| k.keyword == "unrelated topic").unwrap();
        assert_eq!(
            matched.candidate_url.as_deref(),
            Some("https://x.com/blog/headless-cms-migration-guide")
        );
        assert_eq!(unmatched.candidate_url, None);
    }

    #[test]
    fn thousands_separators_in_volume() {
        let csv = format!("{}\nbig keyword,\"12,500\",40,-100,8,18\n", HEADER);
        let kws = transform_keywords(&Table::parse(&csv), &[]);
        assert_eq!(kws[0].volume, 12500.0);
    }

    #[test]
    fn stats_split_matched_and_unmatched() {
        let csv = format!(
            "{}\nheadless cms migration,900,40,-100,8,18\nunrelated topic,900,40,-100,8,18\n",
            HEADER
        );
        let urls = candidates(&["https://x.com/blog/headless-cms-migration-guide"]);
        let kws = transform_keywords(&Table::parse(&csv), &urls);
        let stats = match_stats(&kws);
        assert_eq!(stats.total, 2);
        assert_eq!(stats.matched, 1);
        assert_eq!(stats.unmatched, 1);
    }

    #[test]
    fn real_export_shape() {
        let csv = std::fs::read_to_string("tests/fixtures/organic-keywords.csv").unwrap();
        let table = Table::parse(&csv);
        assert_eq!(
            crate::import::classify_table(&table),
            Ok(crate::import::FileType::OrganicKeywords)
        );

        let urls = candidates(&[
            "https://acme.dev/blog/headless-cms-migration-guide",
            "https://acme.dev/blog/jamstack-seo-checklist",
        ]);
        let kws = transform_keywords(&table, &urls);

        // Six data rows, one with a blank keyword
        assert_eq!(kws.len(), 5);
        assert_eq!(kws[0].keyword, "static site generator comparison");
        assert_eq!(kws[0].volume, 2900.0);
        assert_eq!(kws[1].keyword, "headless cms migration");
        assert_eq!(kws[1].value_score, 1000.0);
        assert_eq!(
            kws[1].candidate_url.as_deref(),
            Some("https://acme.dev/blog/headless-cms-migration-guide")
        );

        assert_eq!(kws.iter().filter(|k| k.is_junk).count(), 2);
        let stats = match_stats(&kws);
        assert_eq!(stats.matched, 2);
        assert_eq!(stats.unmatched, 3);
    }
}
