/// A parsed tabular export: one header record plus data rows.
/// Rows keep raw cell text; lookups go through the header.
#[derive(Debug)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn parse(input: &str) -> Table {
        let mut records = parse_csv(input);
        if records.is_empty() {
            return Table { headers: Vec::new(), rows: Vec::new() };
        }
        let headers = records.remove(0);
        Table { headers, rows: records }
    }

    /// Index of a column whose normalized header equals `name`.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| normalize_header(h) == name)
    }
}

/// Cell at a precomputed column index. Missing columns and short rows both
/// read as absent.
pub fn cell<'a>(row: &'a [String], idx: Option<usize>) -> Option<&'a str> {
    idx.and_then(|i| row.get(i)).map(String::as_str)
}

/// Header cell with one layer of surrounding quotes stripped and trimmed.
pub fn normalize_header(cell: &str) -> String {
    strip_outer_quotes(cell).trim().to_string()
}

/// Cell text cleaned the same way headers are.
pub fn clean_cell(cell: Option<&str>) -> String {
    match cell {
        Some(raw) => strip_outer_quotes(raw).trim().to_string(),
        None => String::new(),
    }
}

/// Lenient numeric cell: quotes and thousands separators stripped first.
/// Anything that still fails to parse reads as zero.
pub fn parse_num(cell: Option<&str>) -> f64 {
    let Some(raw) = cell else { return 0.0 };
    let cleaned: String = raw.chars().filter(|c| *c != '"' && *c != ',').collect();
    cleaned.trim().parse().unwrap_or(0.0)
}

fn strip_outer_quotes(s: &str) -> &str {
    let s = s.strip_prefix('"').unwrap_or(s);
    s.strip_suffix('"').unwrap_or(s)
}

/// Character-level CSV scan. Handles quoted cells, doubled-quote escapes,
/// CRLF line ends, a leading BOM, and newlines inside quoted cells.
/// Records that are entirely blank are skipped.
fn parse_csv(input: &str) -> Vec<Vec<String>> {
    let input = input.strip_prefix('\u{feff}').unwrap_or(input);

    let mut records: Vec<Vec<String>> = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut cell = String::new();
    let mut in_quotes = false;

    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    cell.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                cell.push(c);
            }
            continue;
        }
        match c {
            '"' if cell.is_empty() => in_quotes = true,
            ',' => record.push(std::mem::take(&mut cell)),
            '\r' => {}
            '\n' => {
                record.push(std::mem::take(&mut cell));
                finish_record(&mut records, &mut record);
            }
            _ => cell.push(c),
        }
    }

    if !cell.is_empty() || !record.is_empty() {
        record.push(cell);
        finish_record(&mut records, &mut record);
    }

    records
}

fn finish_record(records: &mut Vec<Vec<String>>, record: &mut Vec<String>) {
    let rec = std::mem::take(record);
    if rec.iter().all(|c| c.trim().is_empty()) {
        return;
    }
    records.push(rec);
}
