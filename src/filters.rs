use crate::config::AuditConfig;
use crate::matcher::url_path_lower;
use crate::merge::Candidate;

/// Row counts after each stage, for the fetch summary.
#[derive(Debug, Clone, Copy)]
pub struct FilterSummary {
    pub total_raw: usize,
    pub after_fragments: usize,
    pub after_pattern: usize,
    pub after_thresholds: usize,
    pub important: usize,
}

/// Run every stage in order and return the surviving candidates sorted for
/// review. Each stage consumes its input and returns a fresh list.
pub fn apply_all(candidates: Vec<Candidate>, config: &AuditConfig) -> (Vec<Candidate>, FilterSummary) {
    let total_raw = candidates.len();

    let kept = drop_fragment_urls(candidates);
    let after_fragments = kept.len();

    let kept = keep_matching_pattern(kept, &config.blog_url_pattern);
    let after_pattern = kept.len();

    let kept = keep_significant_drops(kept, config.impression_threshold, config.clicks_drop_threshold);
    let after_thresholds = kept.len();

    let kept = annotate_topics(kept, &config.topic_patterns);
    let kept = sort_for_review(kept);
    let important = kept.iter().filter(|c| c.is_important).count();

    let summary = FilterSummary {
        total_raw,
        after_fragments,
        after_pattern,
        after_thresholds,
        important,
    };
    (kept, summary)
}

/// Fragment URLs are in-page anchors, not separate content.
pub fn drop_fragment_urls(candidates: Vec<Candidate>) -> Vec<Candidate> {
    candidates.into_iter().filter(|c| !c.url.contains('#')).collect()
}

/// Keep URLs containing the pattern, case-insensitive. A blank pattern
/// keeps everything.
pub fn keep_matching_pattern(candidates: Vec<Candidate>, pattern: &str) -> Vec<Candidate> {
    if pattern.trim().is_empty() {
        return candidates;
    }
    let needle = pattern.to_lowercase();
    candidates
        .into_iter()
        .filter(|c| c.url.to_lowercase().contains(&needle))
        .collect()
}

/// Keep pages that had enough baseline impressions to matter and whose
/// clicks fell at least as far as the drop threshold.
pub fn keep_significant_drops(
    candidates: Vec<Candidate>,
    impression_threshold: u32,
    clicks_drop_threshold: u32,
) -> Vec<Candidate> {
    let min_impressions = impression_threshold as f64;
    let max_diff = -(clicks_drop_threshold as f64);
    candidates
        .into_iter()
        .filter(|c| c.impressions_b >= min_impressions && c.clicks_diff_percent <= max_diff)
        .collect()
}

/// Flag candidates whose slug mentions one of the operator's focus topics.
/// Each pattern is tried both hyphenated and with spaces removed; the first
/// pattern that hits wins. A blank pattern list leaves everything untouched.
pub fn annotate_topics(candidates: Vec<Candidate>, patterns_string: &str) -> Vec<Candidate> {
    let patterns: Vec<String> = patterns_string
        .split(',')
        .map(|p| p.trim().to_lowercase())
        .filter(|p| !p.is_empty())
        .collect();
    if patterns.is_empty() {
        return candidates;
    }

    candidates
        .into_iter()
        .map(|mut c| {
            let slug = url_path_lower(&c.url);
            for pattern in &patterns {
                let words: Vec<&str> = pattern.split_whitespace().collect();
                let hyphenated = words.join("-");
                let joined = words.join("");
                if slug.contains(&hyphenated) || slug.contains(&joined) {
                    c.is_important = true;
                    c.topic_match = Some(pattern.clone());
                    break;
                }
            }
            c
        })
        .collect()
}

/// Important pages first, then by severity of the clicks drop.
pub fn sort_for_review(mut candidates: Vec<Candidate>) -> Vec<Candidate> {
    candidates.sort_by(|a, b| {
        b.is_important
            .cmp(&a.is_important)
            .then_with(|| a.clicks_diff_percent.total_cmp(&b.clicks_diff_percent))
    });
    candidates
}
