use std::sync::LazyLock;

use regex::Regex;
use url::Url;

static NON_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9\s-]").unwrap());
static SEPARATOR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\s-]+").unwrap());

/// A keyword must share at least this fraction of its tokens with a slug.
const MIN_OVERLAP: f64 = 0.4;

/// Lower-case, strip everything but letters/digits/spaces/hyphens, split on
/// space and hyphen runs. Single-character leftovers ("a", "s") are noise.
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let cleaned = NON_TOKEN_RE.replace_all(&lowered, "");
    SEPARATOR_RE
        .split(&cleaned)
        .filter(|t| t.len() > 1)
        .map(str::to_string)
        .collect()
}

/// URL path, lower-cased, with at most one trailing slash removed.
/// Strings that do not parse as absolute URLs degrade to themselves.
pub fn normalize_url(url: &str) -> String {
    let path = match Url::parse(url) {
        Ok(u) => u.path().to_string(),
        Err(_) => url.to_string(),
    };
    let path = path.strip_suffix('/').unwrap_or(&path);
    path.to_lowercase()
}

/// URL path lower-cased with the trailing slash kept, for substring checks.
pub fn url_path_lower(url: &str) -> String {
    match Url::parse(url) {
        Ok(u) => u.path().to_lowercase(),
        Err(_) => url.to_lowercase(),
    }
}

fn slug_tokens(url: &str) -> Vec<String> {
    let path = normalize_url(url);
    let slug = path.rsplit('/').next().unwrap_or("");
    tokenize(slug)
}

/// Pick the page a keyword most plausibly belonged to: score each URL by the
/// fraction of keyword tokens present in its final path segment, keep the
/// best strictly-greater score (first seen wins ties), and only accept a
/// winner at 40% coverage or better.
pub fn match_keyword_to_page<'a>(keyword: &str, candidate_urls: &'a [String]) -> Option<&'a str> {
    let kw_tokens = tokenize(keyword);
    if kw_tokens.is_empty() {
        return None;
    }

    let mut best_url: Option<&str> = None;
    let mut best_score = 0.0f64;

    for url in candidate_urls {
        let slug = slug_tokens(url);
        if slug.is_empty() {
            continue;
        }
        let matches = kw_tokens.iter().filter(|t| slug.contains(*t)).count();
        let score = matches as f64 / kw_tokens.len() as f64;
        if score > best_score {
            best_score = score;
            best_url = Some(url.as_str());
        }
    }

    if best_score >= MIN_OVERLAP {
        best_url
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|u| u.to_string()).collect()
    }

    #[test]
    fn tokenize_basics() {
        assert_eq!(tokenize("Headless CMS Migration"), vec!["headless", "cms", "migration"]);
        assert_eq!(tokenize("what's a CDN?"), vec!["whats", "cdn"]);
        assert_eq!(tokenize("e-commerce re-platforming"), vec!["commerce", "re", "platforming"]);
    }

    #[test]
    fn tokenize_drops_single_chars() {
        assert_eq!(tokenize("a b seo"), vec!["seo"]);
        assert!(tokenize("a & b").is_empty());
    }

    #[test]
    fn normalize_strips_one_trailing_slash() {
        assert_eq!(normalize_url("https://x.com/Blog/Post/"), "/blog/post");
        assert_eq!(normalize_url("https://x.com/blog//"), "/blog/");
        assert_eq!(normalize_url("https://x.com/"), "");
    }

    #[test]
    fn normalize_unparseable_falls_back() {
        assert_eq!(normalize_url("not a url/"), "not a url");
        assert_eq!(normalize_url("/relative/path"), "/relative/path");
    }

    #[test]
    fn full_overlap_matches() {
        let candidates = urls(&[
            "https://x.com/blog/headless-cms-migration-guide",
            "https://x.com/blog/unrelated-post",
        ]);
        let hit = match_keyword_to_page("headless cms migration", &candidates);
        assert_eq!(hit, Some("https://x.com/blog/headless-cms-migration-guide"));
    }

    #[test]
    fn no_overlap_returns_none() {
        let candidates = urls(&["https://x.com/blog/headless-cms-migration-guide"]);
        assert_eq!(match_keyword_to_page("unrelated topic", &candidates), None);
    }

    #[test]
    fn below_threshold_returns_none() {
        // 1 of 3 tokens = 0.33, under the 0.4 floor
        let candidates = urls(&["https://x.com/blog/migration-checklist"]);
        assert_eq!(match_keyword_to_page("headless cms migration", &candidates), None);
    }

    #[test]
    fn threshold_boundary_accepts() {
        // 2 of 5 tokens = exactly 0.4
        let candidates = urls(&["https://x.com/blog/pricing-guide"]);
        let hit = match_keyword_to_page("saas pricing guide best tools", &candidates);
        assert_eq!(hit, Some("https://x.com/blog/pricing-guide"));
    }

    #[test]
    fn first_seen_wins_ties() {
        let candidates = urls(&[
            "https://x.com/blog/cms-guide",
            "https://x.com/blog/guide-cms",
        ]);
        let hit = match_keyword_to_page("cms guide", &candidates);
        assert_eq!(hit, Some("https://x.com/blog/cms-guide"));
    }

    #[test]
    fn empty_keyword_matches_nothing() {
        let candidates = urls(&["https://x.com/blog/post"]);
        assert_eq!(match_keyword_to_page("", &candidates), None);
        assert_eq!(match_keyword_to_page("& !", &candidates), None);
    }

    #[test]
    fn trailing_slash_does_not_hide_slug() {
        let candidates = urls(&["https://x.com/blog/headless-cms-migration/"]);
        let hit = match_keyword_to_page("headless cms migration", &candidates);
        assert_eq!(hit, Some("https://x.com/blog/headless-cms-migration/"));
    }
}
