//! The request-scoped union of every semester a user has stored.
//!
//! A [`CombinedTable`] is rebuilt from the store on every analysis call and
//! never persisted. Each row carries the semester it came from.

use std::collections::BTreeMap;

use crate::record::{Column, SemesterRecord, SubjectRow, term_number};

/// A subject row annotated with its originating semester.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub academic_year: String,
    pub term: String,
    pub term_number: i64,
    pub row: SubjectRow,
}

/// One grade point per semester, keyed by (year, term).
#[derive(Debug, Clone, PartialEq)]
pub struct SemesterGradePoint {
    pub academic_year: String,
    pub term: String,
    pub term_number: i64,
    pub sgpa: f64,
}

#[derive(Debug, Clone, Default)]
pub struct CombinedTable {
    records: Vec<SemesterRecord>,
    rows: Vec<TableRow>,
}

impl CombinedTable {
    /// Build the table from semester records in store order.
    pub fn from_records(records: Vec<SemesterRecord>) -> Self {
        let rows = records
            .iter()
            .flat_map(|record| {
                let number = term_number(&record.term);
                record.rows.iter().map(move |row| TableRow {
                    academic_year: record.academic_year.clone(),
                    term: record.term.clone(),
                    term_number: number,
                    row: row.clone(),
                })
            })
            .collect();

        CombinedTable { records, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn rows(&self) -> &[TableRow] {
        &self.rows
    }

    pub fn records(&self) -> &[SemesterRecord] {
        &self.records
    }

    /// Every value of one numeric column, in row order.
    pub fn column(&self, column: Column) -> Vec<f64> {
        self.rows
            .iter()
            .filter_map(|r| r.row.value(column))
            .collect()
    }

    /// First grade point of each (year, term) group, ordered by that key.
    pub fn semester_grade_points(&self) -> Vec<SemesterGradePoint> {
        let mut groups: BTreeMap<(&str, &str), SemesterGradePoint> = BTreeMap::new();
        for r in &self.rows {
            groups
                .entry((r.academic_year.as_str(), r.term.as_str()))
                .or_insert_with(|| SemesterGradePoint {
                    academic_year: r.academic_year.clone(),
                    term: r.term.clone(),
                    term_number: r.term_number,
                    sgpa: r.row.sgpa,
                });
        }
        groups.into_values().collect()
    }

    /// Rows grouped by subject name, names in sorted order.
    pub fn subject_groups(&self) -> BTreeMap<&str, Vec<&SubjectRow>> {
        let mut groups: BTreeMap<&str, Vec<&SubjectRow>> = BTreeMap::new();
        for r in &self.rows {
            groups.entry(r.row.subject.as_str()).or_default().push(&r.row);
        }
        groups
    }
}
