use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref TERM_NUMBER_REGEX: Regex = Regex::new(r"(\d+)").unwrap();
}

/// One subject's marks within a semester.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct SubjectRow {
    pub subject: String,
    pub ca_marks: f64,
    pub ese_marks: f64,
    pub lab_marks: f64,
    pub total: f64,
    /// Semester grade point. Only the first row of a semester is read when
    /// the semester's SGPA is needed.
    pub sgpa: f64,
}

impl SubjectRow {
    pub fn create(subject: &str) -> Self {
        SubjectRow {
            subject: subject.to_string(),
            ca_marks: 0.0,
            ese_marks: 0.0,
            lab_marks: 0.0,
            total: 0.0,
            sgpa: 0.0,
        }
    }

    pub fn with_marks(mut self, ca: f64, ese: f64, lab: f64, total: f64) -> Self {
        self.ca_marks = ca;
        self.ese_marks = ese;
        self.lab_marks = lab;
        self.total = total;
        self
    }

    pub fn with_sgpa(mut self, sgpa: f64) -> Self {
        self.sgpa = sgpa;
        self
    }

    /// Read a numeric column. `Column::Subject` has no numeric value.
    pub fn value(&self, column: Column) -> Option<f64> {
        match column {
            Column::Subject => None,
            Column::CaMarks => Some(self.ca_marks),
            Column::EseMarks => Some(self.ese_marks),
            Column::LabMarks => Some(self.lab_marks),
            Column::Total => Some(self.total),
            Column::Sgpa => Some(self.sgpa),
        }
    }

    pub fn set_value(&mut self, column: Column, value: f64) {
        match column {
            Column::Subject => {}
            Column::CaMarks => self.ca_marks = value,
            Column::EseMarks => self.ese_marks = value,
            Column::LabMarks => self.lab_marks = value,
            Column::Total => self.total = value,
            Column::Sgpa => self.sgpa = value,
        }
    }
}

/// All uploaded rows for one (academic year, term) of one user.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct SemesterRecord {
    pub academic_year: String,
    pub term: String,
    pub rows: Vec<SubjectRow>,
    pub uploaded_at: DateTime<Utc>,
}

impl SemesterRecord {
    pub fn create(academic_year: &str, term: &str, rows: Vec<SubjectRow>) -> Self {
        SemesterRecord {
            academic_year: academic_year.to_string(),
            term: term.to_string(),
            rows,
            uploaded_at: Utc::now(),
        }
    }

    pub fn term_number(&self) -> i64 {
        term_number(&self.term)
    }

    /// The semester's grade point, read from the first row.
    pub fn sgpa(&self) -> f64 {
        self.rows.first().map(|row| row.sgpa).unwrap_or(0.0)
    }

    pub fn matches(&self, academic_year: &str, term: &str) -> bool {
        self.academic_year == academic_year && self.term == term
    }

    /// `"{year} - {term}"`, the label used everywhere a semester is shown.
    pub fn label(&self) -> String {
        semester_label(&self.academic_year, &self.term)
    }
}

pub fn semester_label(academic_year: &str, term: &str) -> String {
    format!("{} - {}", academic_year, term)
}

/// Extract the first integer embedded in a term label ("Semester 3" -> 3).
/// Labels without digits, or with a number too large to hold, map to 0.
pub fn term_number(term: &str) -> i64 {
    TERM_NUMBER_REGEX
        .captures(term)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<i64>().ok())
        .unwrap_or(0)
}

/// Canonical tabular columns.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Column {
    Subject,
    CaMarks,
    EseMarks,
    LabMarks,
    Total,
    Sgpa,
}

impl Column {
    /// Columns that default to 0 when absent from an upload.
    pub const OPTIONAL: [Column; 5] = [
        Column::CaMarks,
        Column::EseMarks,
        Column::LabMarks,
        Column::Total,
        Column::Sgpa,
    ];

    /// Mark columns used for subject aggregates, summaries and the ML features.
    pub const MARKS: [Column; 4] = [
        Column::CaMarks,
        Column::EseMarks,
        Column::LabMarks,
        Column::Total,
    ];

    pub fn header(&self) -> &'static str {
        match self {
            Column::Subject => "Subject",
            Column::CaMarks => "CA_Marks",
            Column::EseMarks => "ESE_Marks",
            Column::LabMarks => "Lab_Marks",
            Column::Total => "Total",
            Column::Sgpa => "SGPA",
        }
    }

    pub fn from_header(name: &str) -> Option<Self> {
        match name.trim() {
            "Subject" => Some(Column::Subject),
            "CA_Marks" => Some(Column::CaMarks),
            "ESE_Marks" => Some(Column::EseMarks),
            "Lab_Marks" => Some(Column::LabMarks),
            "Total" => Some(Column::Total),
            "SGPA" => Some(Column::Sgpa),
            _ => None,
        }
    }

    /// Human-readable name for reports and chart axes.
    pub fn display_name(&self) -> &'static str {
        match self {
            Column::Subject => "Subject",
            Column::CaMarks => "CA Marks",
            Column::EseMarks => "ESE Marks",
            Column::LabMarks => "Lab Marks",
            Column::Total => "Total",
            Column::Sgpa => "SGPA",
        }
    }
}
