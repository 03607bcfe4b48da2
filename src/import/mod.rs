pub mod backlinks;
pub mod keywords;
pub mod table;

use std::fmt;

use thiserror::Error;

use table::{normalize_header, Table};

/// Header cells that identify an organic-keywords export.
pub const ORGANIC_KEYWORDS_MARKERS: [&str; 3] = ["Keyword", "Volume", "Current organic traffic"];
/// Header cells that identify a lost-backlinks export.
pub const BACKLINKS_MARKERS: [&str; 3] = ["Referring page URL", "Domain rating", "Target URL"];

/// The two export schemas the importer understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    OrganicKeywords,
    Backlinks,
}

impl FileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::OrganicKeywords => "organic-keywords",
            FileType::Backlinks => "backlinks",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an export file was rejected before any rows were imported.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ImportError {
    #[error("unrecognized export: headers match neither an organic-keywords file (needs {organic}) nor a backlinks file (needs {backlinks})",
        organic = ORGANIC_KEYWORDS_MARKERS.join(", "),
        backlinks = BACKLINKS_MARKERS.join(", "))]
    UnknownSchema,
    #[error("{file_type} export has a valid header but no data rows")]
    EmptyFile { file_type: FileType },
}

/// Match the normalized header set against both marker lists. Extra columns
/// are fine; every marker of one schema must be present.
pub fn detect_file_type(headers: &[String]) -> Option<FileType> {
    let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();
    let has_all =
        |markers: &[&str]| markers.iter().all(|m| normalized.iter().any(|h| h == m));

    if has_all(&ORGANIC_KEYWORDS_MARKERS) {
        Some(FileType::OrganicKeywords)
    } else if has_all(&BACKLINKS_MARKERS) {
        Some(FileType::Backlinks)
    } else {
        None
    }
}

/// Decide what a parsed table is. An unknown header set and a recognized
/// header with zero data rows are reported as different failures.
pub fn classify_table(table: &Table) -> Result<FileType, ImportError> {
    let file_type = detect_file_type(&table.headers).ok_or(ImportError::UnknownSchema)?;
    if table.rows.is_empty() {
        return Err(ImportError::EmptyFile { file_type });
    }
    Ok(file_type)
}
