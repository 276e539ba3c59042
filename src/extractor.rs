//! Recovers subject rows from free text (typically text pulled out of a PDF
//! marksheet).
//!
//! Each line is tried against a fixed, prioritized list of [`RowRule`]s; the
//! first rule that matches and is not a header line produces the row.

use lazy_static::lazy_static;
use log::debug;
use regex::{Captures, Regex};

use crate::error::IngestError;
use crate::record::SubjectRow;

lazy_static! {
    static ref SGPA_REGEX: Regex = Regex::new(r"(?i)SGPA[:\s]*(\d+\.?\d*)").unwrap();
    static ref DETAILED_REGEX: Regex =
        Regex::new(r"([A-Za-z\s]+)\s+(\d+)\s+(\d+)\s+(\d+)\s+(\d+)\s+(\d+\.?\d*)").unwrap();
    static ref COMPACT_REGEX: Regex =
        Regex::new(r"([A-Za-z\s]+)\s+(\d+)\s+(\d+)\s+(\d+)\s+(\d+)").unwrap();
    static ref LOOSE_REGEX: Regex =
        Regex::new(r"([A-Za-z\s]+).*?(\d+).*?(\d+).*?(\d+).*?(\d+)").unwrap();
}

/// Lines shorter than this are never result rows.
const MIN_LINE_LEN: usize = 10;

/// Words that only appear in table headers.
const HEADER_WORDS: [&str; 5] = ["subject", "course", "marks", "total", "sgpa"];

/// Row-extraction rules, most specific first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowRule {
    /// Subject, CA, ESE, Lab, Total and a per-row SGPA.
    Detailed,
    /// Subject, CA, ESE, Lab and Total separated by whitespace.
    Compact,
    /// Subject followed by any four numbers anywhere on the line.
    Loose,
}

impl RowRule {
    pub const ORDERED: [RowRule; 3] = [RowRule::Detailed, RowRule::Compact, RowRule::Loose];

    fn regex(&self) -> &'static Regex {
        match self {
            RowRule::Detailed => &DETAILED_REGEX,
            RowRule::Compact => &COMPACT_REGEX,
            RowRule::Loose => &LOOSE_REGEX,
        }
    }

    /// Apply the rule to one line. Header lines and blank subjects are
    /// rejected so the next rule gets a chance.
    pub fn apply(&self, line: &str, default_sgpa: f64) -> Option<SubjectRow> {
        let caps = self.regex().captures(line)?;
        let subject = caps.get(1)?.as_str().trim();
        if subject.is_empty() || is_header(subject) {
            return None;
        }
        Some(row_from_captures(subject, &caps, default_sgpa))
    }
}

fn is_header(subject: &str) -> bool {
    let lower = subject.to_lowercase();
    HEADER_WORDS.iter().any(|word| lower.contains(word))
}

fn group_number(caps: &Captures, index: usize) -> Option<f64> {
    caps.get(index)
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

fn row_from_captures(subject: &str, caps: &Captures, default_sgpa: f64) -> SubjectRow {
    let ca = group_number(caps, 2).unwrap_or(0.0);
    let ese = group_number(caps, 3).unwrap_or(0.0);
    let lab = group_number(caps, 4).unwrap_or(0.0);
    let total = group_number(caps, 5).unwrap_or(ca + ese + lab);
    let sgpa = group_number(caps, 6).unwrap_or(default_sgpa);

    SubjectRow::create(subject)
        .with_marks(ca, ese, lab, total)
        .with_sgpa(sgpa)
}

/// Find the document-level `SGPA: x.yz` token, if any.
pub fn find_semester_sgpa(text: &str) -> Option<f64> {
    SGPA_REGEX
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

/// Extract subject rows from free text.
///
/// # Errors
/// * `IngestError::NoRowsExtracted` if no line produced a row
///
/// # Examples
/// ```
/// use student_analytics::extractor::extract_rows;
///
/// let text = "SGPA: 8.2\nMathematics 20 50 0 70\n";
/// let rows = extract_rows(text).unwrap();
/// assert_eq!(rows[0].subject, "Mathematics");
/// assert_eq!(rows[0].sgpa, 8.2);
/// ```
pub fn extract_rows(text: &str) -> Result<Vec<SubjectRow>, IngestError> {
    let default_sgpa = find_semester_sgpa(text).unwrap_or(0.0);
    let mut rows = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if line.chars().count() < MIN_LINE_LEN {
            continue;
        }

        for rule in RowRule::ORDERED {
            if let Some(row) = rule.apply(line, default_sgpa) {
                debug!("{:?} rule matched line '{}'", rule, line);
                rows.push(row);
                break;
            }
        }
    }

    if rows.is_empty() {
        return Err(IngestError::NoRowsExtracted);
    }
    Ok(rows)
}
