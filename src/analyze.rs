use anyhow::Result;
use async_trait::async_trait;
use chrono::Datelike;
use serde::Serialize;

use crate::import::keywords::LostKeyword;
use crate::matcher::normalize_url;
use crate::merge::Candidate;

/// Everything the analyzer gets to see for one page: the page's comparison
/// metrics plus the selected keywords matched to it.
pub struct PageContext<'a> {
    pub candidate: &'a Candidate,
    pub keywords: &'a [LostKeyword],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Effort {
    Small,
    Medium,
    Large,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Likelihood {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ShouldUpdate {
    Yes,
    Doubtful,
    #[serde(rename = "No - low value keys")]
    NoLowValueKeys,
    #[serde(rename = "No - intent shifted")]
    NoIntentShifted,
}

impl ShouldUpdate {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShouldUpdate::Yes => "Yes",
            ShouldUpdate::Doubtful => "Doubtful",
            ShouldUpdate::NoLowValueKeys => "No - low value keys",
            ShouldUpdate::NoIntentShifted => "No - intent shifted",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAction {
    pub section: String,
    pub action: String,
    pub details: String,
    pub why: String,
}

/// The analyzer's full answer for one page. Serialized as-is into the
/// session store.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageVerdict {
    pub candidate_url: String,
    pub worse_points: Vec<String>,
    pub strengths: Vec<String>,
    pub what_to_add_or_update: Vec<UpdateAction>,
    pub suggested_title: String,
    pub suggested_meta: String,
    pub update_plan_summary: String,
    pub estimated_effort: Effort,
    pub priority: u32,
    pub recovery_likelihood: Likelihood,
    pub intent_shifted: bool,
    pub consolidate_with: Option<String>,
    pub should_update: ShouldUpdate,
}

/// Verdict producer for one page at a time. The pipeline only depends on
/// this boundary, not on where verdicts come from.
#[async_trait]
pub trait ContentAnalyzer {
    async fn analyze(&self, page: &PageContext<'_>) -> Result<PageVerdict>;
}

/// Deterministic stand-in that derives a verdict from the numbers alone.
/// It exists so the whole pipeline runs end to end without an external
/// model; the rules are simple cutoffs, not editorial judgment.
pub struct SimulatedAnalyzer;

#[async_trait]
impl ContentAnalyzer for SimulatedAnalyzer {
    async fn analyze(&self, page: &PageContext<'_>) -> Result<PageVerdict> {
        Ok(simulate_verdict(page))
    }
}

fn simulate_verdict(page: &PageContext<'_>) -> PageVerdict {
    let c = page.candidate;
    let viable: Vec<&LostKeyword> = page.keywords.iter().filter(|k| !k.is_junk).collect();
    let total_value: f64 = viable.iter().map(|k| k.value_score).sum();
    let intent_shifted = c.position_diff > 20.0;

    let should_update = if viable.is_empty() {
        ShouldUpdate::NoLowValueKeys
    } else if intent_shifted {
        ShouldUpdate::NoIntentShifted
    } else if total_value < 200.0 {
        ShouldUpdate::Doubtful
    } else {
        ShouldUpdate::Yes
    };

    let recovery_likelihood = if c.position_diff <= 5.0 {
        Likelihood::High
    } else if c.position_diff <= 15.0 {
        Likelihood::Medium
    } else {
        Likelihood::Low
    };

    let estimated_effort = if viable.len() <= 3 {
        Effort::Small
    } else if viable.len() <= 8 {
        Effort::Medium
    } else {
        Effort::Large
    };

    let priority = if total_value >= 1000.0 {
        1
    } else if total_value >= 500.0 {
        2
    } else if total_value >= 200.0 {
        3
    } else {
        4
    };

    let mut worse_points = vec![
        format!(
            "Clicks fell {:.1}% against the baseline period",
            c.clicks_diff_percent.abs()
        ),
        format!(
            "Average position moved from {:.1} to {:.1}",
            c.position_b, c.position_a
        ),
    ];
    if !page.keywords.is_empty() {
        worse_points.push(format!("{} tracked keywords lost ground", page.keywords.len()));
    }

    let mut strengths = Vec::new();
    if c.impressions_a > 0.0 {
        strengths.push(format!(
            "Still earning {:.0} impressions in the recent period",
            c.impressions_a
        ));
    }
    if let Some(topic) = &c.topic_match {
        strengths.push(format!("Covers the focus topic \"{}\"", topic));
    }

    let slug_words = slug_title(&c.url);
    let what_to_add_or_update = viable
        .iter()
        .take(3)
        .map(|k| UpdateAction {
            section: "Body".to_string(),
            action: "Expand".to_string(),
            details: format!("Cover \"{}\" directly", k.keyword),
            why: format!("Lost keyword with value score {:.1}", k.value_score),
        })
        .collect();

    PageVerdict {
        candidate_url: c.url.clone(),
        worse_points,
        strengths,
        what_to_add_or_update,
        suggested_title: format!("{} ({} update)", slug_words, chrono::Utc::now().year()),
        suggested_meta: format!(
            "Updated guide to {}. Covers what changed and what to do now.",
            slug_words.to_lowercase()
        ),
        update_plan_summary: format!(
            "Refresh targeting {} viable keywords worth {:.0} combined value",
            viable.len(),
            total_value
        ),
        estimated_effort,
        priority,
        recovery_likelihood,
        intent_shifted,
        consolidate_with: None,
        should_update,
    }
}

/// Turn the URL's last path segment into title-ish words.
fn slug_title(url: &str) -> String {
    let path = normalize_url(url);
    let slug = path.rsplit('/').next().unwrap_or("");
    let words: Vec<String> = slug
        .split('-')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect();
    if words.is_empty() {
        "This Page".to_string()
    } else {
        words.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(url: &str, position_diff: f64) -> Candidate {
        Candidate {
            url: url.to_string(),
            clicks_a: 40.0,
            clicks_b: 100.0,
            clicks_diff_percent: -60.0,
            impressions_a: 900.0,
            impressions_b: 1500.0,
            impressions_diff: -40.0,
            position_a: 8.0 + position_diff,
            position_b: 8.0,
            position_diff,
            ctr_a: 0.04,
            ctr_b: 0.07,
            ctr_diff: -0.03,
            is_important: false,
            topic_match: None,
            has_cannibalization: false,
        }
    }

    fn keyword(text: &str, score: f64, junk: bool) -> LostKeyword {
        LostKeyword {
            keyword: text.to_string(),
            volume: 500.0,
            position: 20.0,
            position_before: 8.0,
            traffic: 30.0,
            traffic_change: -100.0,
            kd: None,
            value_score: score,
            is_junk: junk,
            junk_reason: junk.then(|| "Volume < 100 - insufficient search demand".to_string()),
            is_selected: !junk,
            candidate_url: None,
        }
    }

    fn ctx<'a>(c: &'a Candidate, kws: &'a [LostKeyword]) -> PageContext<'a> {
        PageContext { candidate: c, keywords: kws }
    }

    #[test]
    fn no_viable_keywords_means_low_value() {
        let c = candidate("https://x.com/blog/cms-guide", 3.0);
        let kws = vec![keyword("tiny", 10.0, true)];
        let v = simulate_verdict(&ctx(&c, &kws));
        assert_eq!(v.should_update, ShouldUpdate::NoLowValueKeys);
    }

    #[test]
    fn strong_keywords_mean_yes() {
        let c = candidate("https://x.com/blog/cms-guide", 3.0);
        let kws = vec![keyword("cms guide", 450.0, false)];
        let v = simulate_verdict(&ctx(&c, &kws));
        assert_eq!(v.should_update, ShouldUpdate::Yes);
        assert_eq!(v.recovery_likelihood, Likelihood::High);
        assert_eq!(v.estimated_effort, Effort::Small);
        assert!(!v.intent_shifted);
    }

    #[test]
    fn big_position_slide_reads_as_intent_shift() {
        let c = candidate("https://x.com/blog/cms-guide", 25.0);
        let kws = vec![keyword("cms guide", 450.0, false)];
        let v = simulate_verdict(&ctx(&c, &kws));
        assert_eq!(v.should_update, ShouldUpdate::NoIntentShifted);
        assert!(v.intent_shifted);
        assert_eq!(v.recovery_likelihood, Likelihood::Low);
    }

    #[test]
    fn verdict_is_deterministic() {
        let c = candidate("https://x.com/blog/cms-guide", 3.0);
        let kws = vec![keyword("cms guide", 450.0, false)];
        let a = simulate_verdict(&ctx(&c, &kws));
        let b = simulate_verdict(&ctx(&c, &kws));
        assert_eq!(a.priority, b.priority);
        assert_eq!(a.should_update, b.should_update);
        assert_eq!(a.update_plan_summary, b.update_plan_summary);
    }

    #[test]
    fn verdict_url_echoes_candidate() {
        let c = candidate("https://x.com/blog/cms-guide", 3.0);
        let v = simulate_verdict(&ctx(&c, &[]));
        assert_eq!(v.candidate_url, "https://x.com/blog/cms-guide");
        assert_eq!(v.consolidate_with, None);
    }

    #[test]
    fn should_update_labels() {
        assert_eq!(ShouldUpdate::NoLowValueKeys.as_str(), "No - low value keys");
        assert_eq!(ShouldUpdate::NoIntentShifted.as_str(), "No - intent shifted");
    }

    #[test]
    fn verdict_serializes_with_camel_case_keys() {
        let c = candidate("https://x.com/blog/cms-guide", 3.0);
        let kws = vec![keyword("cms guide", 450.0, false)];
        let v = simulate_verdict(&ctx(&c, &kws));
        let json = serde_json::to_string(&v).unwrap();
        assert!(json.contains("\"candidateUrl\""));
        assert!(json.contains("\"shouldUpdate\":\"Yes\""));
        assert!(json.contains("\"recoveryLikelihood\":\"High\""));
    }

    #[test]
    fn slug_title_words() {
        assert_eq!(slug_title("https://x.com/blog/headless-cms-guide"), "Headless Cms Guide");
        assert_eq!(slug_title("https://x.com/"), "This Page");
    }
}
