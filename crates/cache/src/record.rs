//! Line-oriented codec for flat records.
//!
//! One record per line, fields separated by `|`. Lines starting with `#` are
//! headers/comments and blank lines are ignored. `\`, `|`, CR and LF inside a
//! field are escaped, as is a `#` that would otherwise open the line, so
//! arbitrary text survives a round-trip.

const SEPARATOR: char = '|';
const ESCAPE: char = '\\';

/// A flat record that can be stored as one cache line.
pub trait Record: Sized {
    /// Field names, written as the `#` header line of a collection file.
    const HEADER: &'static [&'static str];

    fn to_fields(&self) -> Vec<String>;

    /// Returns `None` when the field list does not describe a valid record.
    fn from_fields(fields: &[String]) -> Option<Self>;
}

pub fn encode_line(fields: &[String]) -> String {
    let mut out = String::new();
    for (idx, field) in fields.iter().enumerate() {
        if idx > 0 {
            out.push(SEPARATOR);
        }
        for ch in field.chars() {
            match ch {
                '#' if out.is_empty() => out.push_str("\\#"),
                ESCAPE => out.push_str("\\\\"),
                SEPARATOR => out.push_str("\\p"),
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                other => out.push(other),
            }
        }
    }
    out
}

pub fn decode_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars();
    while let Some(ch) = chars.next() {
        match ch {
            SEPARATOR => fields.push(std::mem::take(&mut current)),
            ESCAPE => match chars.next() {
                Some('\\') => current.push('\\'),
                Some('p') => current.push('|'),
                Some('n') => current.push('\n'),
                Some('r') => current.push('\r'),
                Some('#') => current.push('#'),
                Some(other) => {
                    current.push('\\');
                    current.push(other);
                }
                None => current.push('\\'),
            },
            other => current.push(other),
        }
    }
    fields.push(current);
    fields
}

pub fn render_records<R: Record>(records: &[R]) -> String {
    let mut out = String::new();
    out.push_str("# ");
    out.push_str(&R::HEADER.join("|"));
    out.push('\n');
    for record in records {
        out.push_str(&encode_line(&record.to_fields()));
        out.push('\n');
    }
    out
}

/// Parses a collection file, returning the decoded records and how many
/// lines were skipped as malformed.
pub fn parse_records<R: Record>(text: &str) -> (Vec<R>, usize) {
    let mut records = Vec::new();
    let mut malformed = 0usize;
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields = decode_line(line);
        if fields.len() != R::HEADER.len() {
            log::warn!(
                "Skipping malformed cache line {}: expected {} fields, got {}",
                lineno + 1,
                R::HEADER.len(),
                fields.len()
            );
            malformed += 1;
            continue;
        }
        match R::from_fields(&fields) {
            Some(record) => records.push(record),
            None => {
                log::warn!("Skipping malformed cache line {}", lineno + 1);
                malformed += 1;
            }
        }
    }
    (records, malformed)
}
