use anyhow::Result;
use rusqlite::Connection;

use crate::config::AuditConfig;
use crate::dates::PeriodRanges;
use crate::import::backlinks::ParsedBacklink;
use crate::import::keywords::LostKeyword;
use crate::merge::Candidate;

const DB_PATH: &str = "data/audit.sqlite";

/// Important pages whose clicks fell past this mark start out selected.
const PRESELECT_DROP_PERCENT: f64 = -20.0;

pub fn connect() -> Result<Connection> {
    if let Some(dir) = std::path::Path::new(DB_PATH).parent() {
        std::fs::create_dir_all(dir)?;
    }
    let conn = Connection::open(DB_PATH)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS audits (
            id                    INTEGER PRIMARY KEY,
            site_url              TEXT NOT NULL,
            comparison_mode       TEXT NOT NULL,
            period_a_start        TEXT NOT NULL,
            period_a_end          TEXT NOT NULL,
            period_b_start        TEXT NOT NULL,
            period_b_end          TEXT NOT NULL,
            impression_threshold  INTEGER NOT NULL,
            clicks_drop_threshold INTEGER NOT NULL,
            blog_url_pattern      TEXT NOT NULL,
            topic_patterns        TEXT NOT NULL,
            total_raw_pages       INTEGER NOT NULL,
            created_at            TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS candidates (
            id                  INTEGER PRIMARY KEY,
            audit_id            INTEGER NOT NULL REFERENCES audits(id),
            url                 TEXT NOT NULL,
            clicks_a            REAL NOT NULL,
            clicks_b            REAL NOT NULL,
            clicks_diff_percent REAL NOT NULL,
            impressions_a       REAL NOT NULL,
            impressions_b       REAL NOT NULL,
            impressions_diff    REAL NOT NULL,
            position_a          REAL NOT NULL,
            position_b          REAL NOT NULL,
            position_diff       REAL NOT NULL,
            ctr_a               REAL NOT NULL,
            ctr_b               REAL NOT NULL,
            ctr_diff            REAL NOT NULL,
            is_important        BOOLEAN NOT NULL DEFAULT 0,
            topic_match         TEXT,
            has_cannibalization BOOLEAN NOT NULL DEFAULT 0,
            selected            BOOLEAN NOT NULL DEFAULT 0,
            UNIQUE(audit_id, url)
        );
        CREATE INDEX IF NOT EXISTS idx_candidates_audit ON candidates(audit_id);

        CREATE TABLE IF NOT EXISTS keywords (
            id              INTEGER PRIMARY KEY,
            audit_id        INTEGER NOT NULL REFERENCES audits(id),
            keyword         TEXT NOT NULL,
            volume          REAL NOT NULL,
            position        REAL NOT NULL,
            position_before REAL NOT NULL,
            traffic         REAL NOT NULL,
            traffic_change  REAL NOT NULL,
            kd              REAL,
            value_score     REAL NOT NULL,
            is_junk         BOOLEAN NOT NULL,
            junk_reason     TEXT,
            selected        BOOLEAN NOT NULL,
            candidate_url   TEXT,
            UNIQUE(audit_id, keyword)
        );
        CREATE INDEX IF NOT EXISTS idx_keywords_audit ON keywords(audit_id);
        CREATE INDEX IF NOT EXISTS idx_keywords_candidate ON keywords(candidate_url);

        CREATE TABLE IF NOT EXISTS backlinks (
            id              INTEGER PRIMARY KEY,
            audit_id        INTEGER NOT NULL REFERENCES audits(id),
            referring_url   TEXT NOT NULL,
            referring_title TEXT,
            domain_rating   REAL NOT NULL,
            target_url      TEXT NOT NULL,
            lost_status     TEXT NOT NULL,
            drop_reason     TEXT,
            first_seen      TEXT,
            last_seen       TEXT,
            lost_date       TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_backlinks_audit ON backlinks(audit_id);

        CREATE TABLE IF NOT EXISTS verdicts (
            id           INTEGER PRIMARY KEY,
            audit_id     INTEGER NOT NULL REFERENCES audits(id),
            url          TEXT NOT NULL,
            verdict_json TEXT NOT NULL,
            created_at   TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(audit_id, url)
        );
        CREATE INDEX IF NOT EXISTS idx_verdicts_audit ON verdicts(audit_id);
        ",
    )?;
    Ok(())
}

// ── Audits ──

/// A stored audit run. The newest one is the active session.
pub struct AuditRow {
    pub id: i64,
    pub site_url: String,
    pub comparison_mode: String,
    pub period_a_start: String,
    pub period_a_end: String,
    pub period_b_start: String,
    pub period_b_end: String,
    pub impression_threshold: u32,
    pub clicks_drop_threshold: u32,
    pub blog_url_pattern: String,
    pub topic_patterns: String,
    pub total_raw_pages: usize,
    pub created_at: String,
}

pub fn insert_audit(
    conn: &Connection,
    config: &AuditConfig,
    ranges: &PeriodRanges,
    total_raw_pages: usize,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO audits
         (site_url, comparison_mode, period_a_start, period_a_end, period_b_start, period_b_end,
          impression_threshold, clicks_drop_threshold, blog_url_pattern, topic_patterns, total_raw_pages)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        rusqlite::params![
            config.site_url,
            config.comparison_mode.as_str(),
            ranges.period_a.start.to_string(),
            ranges.period_a.end.to_string(),
            ranges.period_b.start.to_string(),
            ranges.period_b.end.to_string(),
            config.impression_threshold,
            config.clicks_drop_threshold,
            config.blog_url_pattern,
            config.topic_patterns,
            total_raw_pages,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn latest_audit(conn: &Connection) -> Result<Option<AuditRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, site_url, comparison_mode, period_a_start, period_a_end,
                period_b_start, period_b_end, impression_threshold, clicks_drop_threshold,
                blog_url_pattern, topic_patterns, total_raw_pages, created_at
         FROM audits ORDER BY id DESC LIMIT 1",
    )?;
    let mut rows = stmt.query_map([], |row| {
        Ok(AuditRow {
            id: row.get(0)?,
            site_url: row.get(1)?,
            comparison_mode: row.get(2)?,
            period_a_start: row.get(3)?,
            period_a_end: row.get(4)?,
            period_b_start: row.get(5)?,
            period_b_end: row.get(6)?,
            impression_threshold: row.get(7)?,
            clicks_drop_threshold: row.get(8)?,
            blog_url_pattern: row.get(9)?,
            topic_patterns: row.get(10)?,
            total_raw_pages: row.get(11)?,
            created_at: row.get(12)?,
        })
    })?;
    match rows.next() {
        Some(row) => Ok(Some(row?)),
        None => Ok(None),
    }
}

// ── Candidates ──

pub fn save_candidates(conn: &Connection, audit_id: i64, candidates: &[Candidate]) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT OR REPLACE INTO candidates
             (audit_id, url, clicks_a, clicks_b, clicks_diff_percent,
              impressions_a, impressions_b, impressions_diff,
              position_a, position_b, position_diff, ctr_a, ctr_b, ctr_diff,
              is_important, topic_match, has_cannibalization, selected)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18)",
        )?;
        for c in candidates {
            let selected = c.is_important && c.clicks_diff_percent < PRESELECT_DROP_PERCENT;
            stmt.execute(rusqlite::params![
                audit_id, c.url, c.clicks_a, c.clicks_b, c.clicks_diff_percent,
                c.impressions_a, c.impressions_b, c.impressions_diff,
                c.position_a, c.position_b, c.position_diff, c.ctr_a, c.ctr_b, c.ctr_diff,
                c.is_important, c.topic_match, c.has_cannibalization, selected,
            ])?;
        }
    }
    tx.commit()?;
    Ok(())
}

/// Candidates in review order (the order they were stored), with selection.
pub fn fetch_candidates(conn: &Connection, audit_id: i64) -> Result<Vec<(Candidate, bool)>> {
    let mut stmt = conn.prepare(
        "SELECT url, clicks_a, clicks_b, clicks_diff_percent,
                impressions_a, impressions_b, impressions_diff,
                position_a, position_b, position_diff, ctr_a, ctr_b, ctr_diff,
                is_important, topic_match, has_cannibalization, selected
         FROM candidates WHERE audit_id = ?1 ORDER BY id",
    )?;
    let rows = stmt
        .query_map([audit_id], |row| {
            Ok((
                Candidate {
                    url: row.get(0)?,
                    clicks_a: row.get(1)?,
                    clicks_b: row.get(2)?,
                    clicks_diff_percent: row.get(3)?,
                    impressions_a: row.get(4)?,
                    impressions_b: row.get(5)?,
                    impressions_diff: row.get(6)?,
                    position_a: row.get(7)?,
                    position_b: row.get(8)?,
                    position_diff: row.get(9)?,
                    ctr_a: row.get(10)?,
                    ctr_b: row.get(11)?,
                    ctr_diff: row.get(12)?,
                    is_important: row.get(13)?,
                    topic_match: row.get(14)?,
                    has_cannibalization: row.get(15)?,
                },
                row.get(16)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// URLs of selected candidates, in stored order. This is the page set
/// keyword matching and backlink filtering run against.
pub fn selected_candidate_urls(conn: &Connection, audit_id: i64) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT url FROM candidates WHERE audit_id = ?1 AND selected = 1 ORDER BY id",
    )?;
    let rows = stmt
        .query_map([audit_id], |row| row.get(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Returns the number of rows changed (0 means no such URL).
pub fn set_candidate_selected(
    conn: &Connection,
    audit_id: i64,
    url: &str,
    selected: bool,
) -> Result<usize> {
    let changed = conn.execute(
        "UPDATE candidates SET selected = ?3 WHERE audit_id = ?1 AND url = ?2",
        rusqlite::params![audit_id, url, selected],
    )?;
    Ok(changed)
}

// ── Keywords ──

/// Replace the audit's keyword set wholesale. Re-importing a fixed export
/// should not leave stale rows behind.
pub fn replace_keywords(conn: &Connection, audit_id: i64, keywords: &[LostKeyword]) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM keywords WHERE audit_id = ?1", [audit_id])?;
    {
        let mut stmt = tx.prepare(
            "INSERT OR REPLACE INTO keywords
             (audit_id, keyword, volume, position, position_before, traffic, traffic_change,
              kd, value_score, is_junk, junk_reason, selected, candidate_url)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13)",
        )?;
        for k in keywords {
            stmt.execute(rusqlite::params![
                audit_id, k.keyword, k.volume, k.position, k.position_before,
                k.traffic, k.traffic_change, k.kd, k.value_score,
                k.is_junk, k.junk_reason, k.is_selected, k.candidate_url,
            ])?;
        }
    }
    tx.commit()?;
    Ok(())
}

/// Keywords by descending value score, the order they were scored in.
pub fn fetch_keywords(conn: &Connection, audit_id: i64) -> Result<Vec<LostKeyword>> {
    let mut stmt = conn.prepare(
        "SELECT keyword, volume, position, position_before, traffic, traffic_change,
                kd, value_score, is_junk, junk_reason, selected, candidate_url
         FROM keywords WHERE audit_id = ?1 ORDER BY value_score DESC, id",
    )?;
    let rows = stmt
        .query_map([audit_id], |row| {
            Ok(LostKeyword {
                keyword: row.get(0)?,
                volume: row.get(1)?,
                position: row.get(2)?,
                position_before: row.get(3)?,
                traffic: row.get(4)?,
                traffic_change: row.get(5)?,
                kd: row.get(6)?,
                value_score: row.get(7)?,
                is_junk: row.get(8)?,
                junk_reason: row.get(9)?,
                is_selected: row.get(10)?,
                candidate_url: row.get(11)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn set_keyword_selected(
    conn: &Connection,
    audit_id: i64,
    keyword: &str,
    selected: bool,
) -> Result<usize> {
    let changed = conn.execute(
        "UPDATE keywords SET selected = ?3 WHERE audit_id = ?1 AND keyword = ?2",
        rusqlite::params![audit_id, keyword, selected],
    )?;
    Ok(changed)
}

/// Bulk toggle for select-all / deselect-all over a visible subset.
pub fn set_keywords_selected_many(
    conn: &Connection,
    audit_id: i64,
    keywords: &[String],
    selected: bool,
) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut changed = 0;
    {
        let mut stmt = tx.prepare(
            "UPDATE keywords SET selected = ?3 WHERE audit_id = ?1 AND keyword = ?2",
        )?;
        for k in keywords {
            changed += stmt.execute(rusqlite::params![audit_id, k, selected])?;
        }
    }
    tx.commit()?;
    Ok(changed)
}

// ── Backlinks ──

pub fn replace_backlinks(
    conn: &Connection,
    audit_id: i64,
    backlinks: &[ParsedBacklink],
) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM backlinks WHERE audit_id = ?1", [audit_id])?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO backlinks
             (audit_id, referring_url, referring_title, domain_rating, target_url,
              lost_status, drop_reason, first_seen, last_seen, lost_date)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)",
        )?;
        for b in backlinks {
            stmt.execute(rusqlite::params![
                audit_id, b.referring_url, b.referring_title, b.domain_rating, b.target_url,
                b.lost_status, b.drop_reason, b.first_seen, b.last_seen, b.lost_date,
            ])?;
        }
    }
    tx.commit()?;
    Ok(())
}

pub fn fetch_backlinks(conn: &Connection, audit_id: i64) -> Result<Vec<ParsedBacklink>> {
    let mut stmt = conn.prepare(
        "SELECT referring_url, referring_title, domain_rating, target_url,
                lost_status, drop_reason, first_seen, last_seen, lost_date
         FROM backlinks WHERE audit_id = ?1 ORDER BY domain_rating DESC, id",
    )?;
    let rows = stmt
        .query_map([audit_id], |row| {
            Ok(ParsedBacklink {
                referring_url: row.get(0)?,
                referring_title: row.get(1)?,
                domain_rating: row.get(2)?,
                target_url: row.get(3)?,
                lost_status: row.get(4)?,
                drop_reason: row.get(5)?,
                first_seen: row.get(6)?,
                last_seen: row.get(7)?,
                lost_date: row.get(8)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Verdicts ──

pub fn save_verdict(conn: &Connection, audit_id: i64, url: &str, verdict_json: &str) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO verdicts (audit_id, url, verdict_json) VALUES (?1, ?2, ?3)",
        rusqlite::params![audit_id, url, verdict_json],
    )?;
    Ok(())
}

pub fn fetch_verdicts(conn: &Connection, audit_id: i64) -> Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare(
        "SELECT url, verdict_json FROM verdicts WHERE audit_id = ?1 ORDER BY id",
    )?;
    let rows = stmt
        .query_map([audit_id], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Stats ──

pub struct Stats {
    pub audits: usize,
    pub candidates: usize,
    pub selected_candidates: usize,
    pub keywords: usize,
    pub selected_keywords: usize,
    pub junk_keywords: usize,
    pub backlinks: usize,
    pub verdicts: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let audits: usize = conn.query_row("SELECT COUNT(*) FROM audits", [], |r| r.get(0))?;
    let candidates: usize = conn.query_row("SELECT COUNT(*) FROM candidates", [], |r| r.get(0))?;
    let selected_candidates: usize = conn.query_row(
        "SELECT COUNT(*) FROM candidates WHERE selected = 1",
        [],
        |r| r.get(0),
    )?;
    let keywords: usize = conn.query_row("SELECT COUNT(*) FROM keywords", [], |r| r.get(0))?;
    let selected_keywords: usize = conn.query_row(
        "SELECT COUNT(*) FROM keywords WHERE selected = 1",
        [],
        |r| r.get(0),
    )?;
    let junk_keywords: usize = conn.query_row(
        "SELECT COUNT(*) FROM keywords WHERE is_junk = 1",
        [],
        |r| r.get(0),
    )?;
    let backlinks: usize = conn.query_row("SELECT COUNT(*) FROM backlinks", [], |r| r.get(0))?;
    let verdicts: usize = conn.query_row("SELECT COUNT(*) FROM verdicts", [], |r| r.get(0))?;
    Ok(Stats {
        audits,
        candidates,
        selected_candidates,
        keywords,
        selected_keywords,
        junk_keywords,
        backlinks,
        verdicts,
    })
}
