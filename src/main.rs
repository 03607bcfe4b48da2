mod analyze;
mod config;
mod dates;
mod db;
mod filters;
mod gsc;
mod import;
mod matcher;
mod merge;
mod scoring;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::warn;

use analyze::ContentAnalyzer;
use config::{AuditConfig, ComparisonMode};

#[derive(Parser)]
#[command(name = "decay_audit", about = "Find blog pages losing search traffic and triage what to recover")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List search-performance properties the access token can read
    Sites,
    /// Fetch both comparison periods, filter candidates, start a new audit
    Fetch {
        /// Property URL, e.g. "sc-domain:example.com" or "https://example.com/"
        #[arg(long)]
        site: String,
        /// Comparison mode: 28d, 90d, or yoy
        #[arg(long, default_value = "90d")]
        mode: ComparisonMode,
        /// Override the computed start of the recent period (YYYY-MM-DD)
        #[arg(long)]
        period_a_start: Option<NaiveDate>,
        /// Override the computed end of the recent period
        #[arg(long)]
        period_a_end: Option<NaiveDate>,
        /// Override the computed start of the baseline period
        #[arg(long)]
        period_b_start: Option<NaiveDate>,
        /// Override the computed end of the baseline period
        #[arg(long)]
        period_b_end: Option<NaiveDate>,
        /// Minimum baseline impressions for a page to stay in
        #[arg(long, default_value = "500")]
        min_impressions: u32,
        /// Minimum clicks drop in percent
        #[arg(long, default_value = "20")]
        min_drop: u32,
        /// Substring a blog URL must contain (empty keeps everything)
        #[arg(long, default_value = "/blog/")]
        blog_pattern: String,
        /// Comma-separated topic patterns to flag as important
        #[arg(long, default_value = "")]
        topics: String,
    },
    /// Review stored candidates; toggle which pages are in the audit
    Pages {
        /// Mark a candidate URL selected (repeatable)
        #[arg(long)]
        select: Vec<String>,
        /// Mark a candidate URL unselected (repeatable)
        #[arg(long)]
        deselect: Vec<String>,
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },
    /// Import a CSV export (organic keywords or lost backlinks)
    Import {
        /// Path to the export file
        file: PathBuf,
    },
    /// Review scored keywords; toggle which ones to chase
    Keywords {
        /// Only keywords matched to this candidate URL
        #[arg(long)]
        url: Option<String>,
        /// Only keywords without a matched page
        #[arg(long)]
        unassigned: bool,
        /// Only junk keywords
        #[arg(long)]
        junk: bool,
        /// Select a keyword by its text (repeatable)
        #[arg(long)]
        select: Vec<String>,
        /// Deselect a keyword by its text (repeatable)
        #[arg(long)]
        deselect: Vec<String>,
        /// Select every keyword currently visible under the filters
        #[arg(long, conflicts_with = "deselect_all")]
        select_all: bool,
        /// Deselect every keyword currently visible under the filters
        #[arg(long)]
        deselect_all: bool,
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },
    /// List imported lost backlinks pointing at audited pages
    Backlinks {
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },
    /// Produce a verdict for every selected page
    Analyze,
    /// Show session statistics
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Sites => {
            let client = gsc::GscClient::from_env()?;
            let sites = client.list_sites().await?;
            if sites.is_empty() {
                println!("No properties visible to this token.");
                return Ok(());
            }
            println!("{:<52} | {}", "Property", "Permission");
            println!("{}", "-".repeat(76));
            for s in &sites {
                println!("{:<52} | {}", truncate(&s.site_url, 52), s.permission_level);
            }
            println!("\n{} properties", sites.len());
            Ok(())
        }
        Commands::Fetch {
            site,
            mode,
            period_a_start,
            period_a_end,
            period_b_start,
            period_b_end,
            min_impressions,
            min_drop,
            blog_pattern,
            topics,
        } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let config = AuditConfig {
                site_url: site,
                comparison_mode: mode,
                period_a_start,
                period_a_end,
                period_b_start,
                period_b_end,
                impression_threshold: min_impressions,
                clicks_drop_threshold: min_drop,
                blog_url_pattern: blog_pattern,
                topic_patterns: topics,
            };
            let client = gsc::GscClient::from_env()?;
            let today = chrono::Utc::now().date_naive();

            let pb = indicatif::ProgressBar::new_spinner();
            pb.set_style(
                indicatif::ProgressStyle::default_spinner()
                    .template("{spinner:.green} {msg} [{elapsed_precise}]")?,
            );
            pb.set_message(format!("Querying both periods for {}", config.site_url));
            pb.enable_steady_tick(Duration::from_millis(100));
            let (merged, ranges) = gsc::fetch_and_compare(&client, &config, today).await?;
            pb.finish_and_clear();

            let (kept, summary) = filters::apply_all(merged, &config);
            let audit_id = db::insert_audit(&conn, &config, &ranges, summary.total_raw)?;
            db::save_candidates(&conn, audit_id, &kept)?;
            let preselected = db::selected_candidate_urls(&conn, audit_id)?.len();

            println!("Audit #{}: {} ({})", audit_id, config.site_url, config.comparison_mode);
            println!("  Period A {} .. {}", ranges.period_a.start, ranges.period_a.end);
            println!("  Period B {} .. {}", ranges.period_b.start, ranges.period_b.end);
            println!(
                "  {} raw pages, {} after dropping fragments, {} matching \"{}\", {} past thresholds",
                summary.total_raw, summary.after_fragments, summary.after_pattern,
                config.blog_url_pattern, summary.after_thresholds
            );
            println!(
                "  Stored {} candidates ({} important, {} preselected). Review with 'pages'.",
                kept.len(),
                summary.important,
                preselected
            );
            Ok(())
        }
        Commands::Pages { select, deselect, limit } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let Some(audit) = db::latest_audit(&conn)? else {
                println!("No audit yet. Run 'fetch' first.");
                return Ok(());
            };

            for url in &select {
                if db::set_candidate_selected(&conn, audit.id, url, true)? == 0 {
                    warn!("No candidate with URL {}", url);
                }
            }
            for url in &deselect {
                if db::set_candidate_selected(&conn, audit.id, url, false)? == 0 {
                    warn!("No candidate with URL {}", url);
                }
            }

            let rows = db::fetch_candidates(&conn, audit.id)?;
            if rows.is_empty() {
                println!("Audit #{} has no candidates. Run 'fetch' again.", audit.id);
                return Ok(());
            }

            println!(
                "Audit #{}: {} | A {} .. {} | B {} .. {}",
                audit.id, audit.site_url,
                audit.period_a_start, audit.period_a_end,
                audit.period_b_start, audit.period_b_end
            );

            // Compact, readable table
            println!(
                "{:>3} | {:<48} | {:>8} | {:>8} | {:>7} | {:>6} | {:<3} | {:<16}",
                "#", "URL", "Clicks A", "Clicks B", "Drop %", "Pos +", "Sel", "Topic"
            );
            println!("{}", "-".repeat(116));
            for (i, (c, selected)) in rows.iter().take(limit).enumerate() {
                let topic = c.topic_match.as_deref().unwrap_or("");
                println!(
                    "{:>3} | {:<48} | {:>8.0} | {:>8.0} | {:>7.1} | {:>6.1} | {:<3} | {:<16}",
                    i + 1,
                    truncate(&c.url, 48),
                    c.clicks_a,
                    c.clicks_b,
                    c.clicks_diff_percent,
                    c.position_diff,
                    if *selected { "*" } else { "" },
                    truncate(topic, 16)
                );
            }

            let selected_count = rows.iter().filter(|(_, s)| *s).count();
            println!(
                "\n{} candidates | {} selected | toggle with --select/--deselect <url>",
                rows.len(),
                selected_count
            );
            Ok(())
        }
        Commands::Import { file } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let Some(audit) = db::latest_audit(&conn)? else {
                println!("No audit yet. Run 'fetch' first.");
                return Ok(());
            };

            let bytes = std::fs::read(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let text = String::from_utf8_lossy(&bytes);
            let table = import::table::Table::parse(&text);
            let file_type = import::classify_table(&table)
                .with_context(|| format!("Rejected {}", file.display()))?;
            println!("{}: {} export, {} rows", file.display(), file_type, table.rows.len());

            let candidate_urls = db::selected_candidate_urls(&conn, audit.id)?;
            if candidate_urls.is_empty() {
                warn!("No pages selected; nothing will match. Select pages first with 'pages --select'.");
            }

            match file_type {
                import::FileType::OrganicKeywords => {
                    let t = Instant::now();
                    let keywords = import::keywords::transform_keywords(&table, &candidate_urls);
                    let stats = import::keywords::match_stats(&keywords);
                    let junk = keywords.iter().filter(|k| k.is_junk).count();
                    db::replace_keywords(&conn, audit.id, &keywords)?;
                    println!(
                        "Imported {} keywords in {:.1}s: {} matched to pages, {} unassigned, {} junk.",
                        stats.total,
                        t.elapsed().as_secs_f64(),
                        stats.matched,
                        stats.unmatched,
                        junk
                    );
                    println!("Junk keywords start deselected. Review with 'keywords'.");
                }
                import::FileType::Backlinks => {
                    let links = import::backlinks::transform_backlinks(&table, &candidate_urls);
                    let stats = import::backlinks::backlink_stats(&links);
                    db::replace_backlinks(&conn, audit.id, &links)?;
                    println!(
                        "Imported {} lost backlinks across {} target pages.",
                        stats.total, stats.target_pages
                    );
                }
            }
            Ok(())
        }
        Commands::Keywords {
            url,
            unassigned,
            junk,
            select,
            deselect,
            select_all,
            deselect_all,
            limit,
        } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let Some(audit) = db::latest_audit(&conn)? else {
                println!("No audit yet. Run 'fetch' first.");
                return Ok(());
            };

            for k in &select {
                if db::set_keyword_selected(&conn, audit.id, k, true)? == 0 {
                    warn!("No keyword \"{}\"", k);
                }
            }
            for k in &deselect {
                if db::set_keyword_selected(&conn, audit.id, k, false)? == 0 {
                    warn!("No keyword \"{}\"", k);
                }
            }

            if select_all || deselect_all {
                let all = db::fetch_keywords(&conn, audit.id)?;
                let visible: Vec<String> = all
                    .iter()
                    .filter(|k| keyword_visible(k, url.as_deref(), unassigned, junk))
                    .map(|k| k.keyword.clone())
                    .collect();
                let changed =
                    db::set_keywords_selected_many(&conn, audit.id, &visible, select_all)?;
                println!("Toggled {} keywords.", changed);
            }

            let rows = db::fetch_keywords(&conn, audit.id)?;
            if rows.is_empty() {
                println!("No keywords yet. Import an organic-keywords export first.");
                return Ok(());
            }
            let shown: Vec<_> = rows
                .iter()
                .filter(|k| keyword_visible(k, url.as_deref(), unassigned, junk))
                .collect();

            println!(
                "{:>3} | {:<28} | {:>7} | {:>8} | {:>8} | {:>4} | {:<4} | {:<3} | {:<36}",
                "#", "Keyword", "Volume", "Score", "Traffic", "KD", "Junk", "Sel", "Page"
            );
            println!("{}", "-".repeat(120));
            for (i, k) in shown.iter().take(limit).enumerate() {
                let kd = k.kd.map(|v| format!("{:.0}", v)).unwrap_or_else(|| "-".into());
                let page = k.candidate_url.as_deref().unwrap_or("unassigned");
                println!(
                    "{:>3} | {:<28} | {:>7.0} | {:>8.1} | {:>8.0} | {:>4} | {:<4} | {:<3} | {:<36}",
                    i + 1,
                    truncate(&k.keyword, 28),
                    k.volume,
                    k.value_score,
                    k.traffic_change,
                    kd,
                    if k.is_junk { "yes" } else { "" },
                    if k.is_selected { "*" } else { "" },
                    truncate(page, 36)
                );
            }

            let selected_count = rows.iter().filter(|k| k.is_selected).count();
            let junk_count = rows.iter().filter(|k| k.is_junk).count();
            println!(
                "\n{} keywords ({} shown) | {} selected | {} junk",
                rows.len(),
                shown.len().min(limit),
                selected_count,
                junk_count
            );
            Ok(())
        }
        Commands::Backlinks { limit } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let Some(audit) = db::latest_audit(&conn)? else {
                println!("No audit yet. Run 'fetch' first.");
                return Ok(());
            };
            let rows = db::fetch_backlinks(&conn, audit.id)?;
            if rows.is_empty() {
                println!("No backlinks yet. Import a lost-backlinks export first.");
                return Ok(());
            }

            println!(
                "{:>3} | {:<44} | {:>4} | {:<36} | {:<10} | {:<10}",
                "#", "Referring page", "DR", "Target", "Status", "Lost"
            );
            println!("{}", "-".repeat(122));
            for (i, b) in rows.iter().take(limit).enumerate() {
                println!(
                    "{:>3} | {:<44} | {:>4.0} | {:<36} | {:<10} | {:<10}",
                    i + 1,
                    truncate(&b.referring_url, 44),
                    b.domain_rating,
                    truncate(&b.target_url, 36),
                    truncate(&b.lost_status, 10),
                    truncate(&b.lost_date, 10)
                );
            }
            println!("\n{} lost backlinks", rows.len());
            Ok(())
        }
        Commands::Analyze => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let Some(audit) = db::latest_audit(&conn)? else {
                println!("No audit yet. Run 'fetch' first.");
                return Ok(());
            };

            let candidates = db::fetch_candidates(&conn, audit.id)?;
            let selected: Vec<&merge::Candidate> = candidates
                .iter()
                .filter(|(_, sel)| *sel)
                .map(|(c, _)| c)
                .collect();
            if selected.is_empty() {
                println!("No pages selected. Toggle with 'pages --select <url>'.");
                return Ok(());
            }
            let keywords = db::fetch_keywords(&conn, audit.id)?;

            println!("Analyzing {} selected pages...", selected.len());
            let analyzer = analyze::SimulatedAnalyzer;
            for c in selected {
                let page_keywords: Vec<_> = keywords
                    .iter()
                    .filter(|k| {
                        k.is_selected && k.candidate_url.as_deref() == Some(c.url.as_str())
                    })
                    .cloned()
                    .collect();
                let ctx = analyze::PageContext { candidate: c, keywords: &page_keywords };
                let verdict = analyzer.analyze(&ctx).await?;
                db::save_verdict(&conn, audit.id, &c.url, &serde_json::to_string(&verdict)?)?;

                println!("\n{}", c.url);
                println!(
                    "  Update: {:<22} Priority {} | Effort {:?} | Recovery {:?}",
                    verdict.should_update.as_str(),
                    verdict.priority,
                    verdict.estimated_effort,
                    verdict.recovery_likelihood
                );
                for point in verdict.worse_points.iter().take(2) {
                    println!("    - {}", point);
                }
                println!("  Plan: {}", verdict.update_plan_summary);
            }

            let total = db::fetch_verdicts(&conn, audit.id)?.len();
            println!("\n{} verdicts stored.", total);
            Ok(())
        }
        Commands::Stats => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Audits:              {}", s.audits);
            println!("Candidates:          {}", s.candidates);
            println!("  selected:          {}", s.selected_candidates);
            println!("Keywords:            {}", s.keywords);
            println!("  selected:          {}", s.selected_keywords);
            println!("  junk:              {}", s.junk_keywords);
            println!("Backlinks:           {}", s.backlinks);
            println!("Verdicts:            {}", s.verdicts);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn keyword_visible(
    k: &import::keywords::LostKeyword,
    url: Option<&str>,
    unassigned: bool,
    junk: bool,
) -> bool {
    if let Some(url) = url {
        if k.candidate_url.as_deref() != Some(url) {
            return false;
        }
    }
    if unassigned && k.candidate_url.is_some() {
        return false;
    }
    if junk && !k.is_junk {
        return false;
    }
    true
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
