//! Printable reports built from a user's stored semesters.
//!
//! A [`Report`] is a flat list of [`Block`]s. The same report can be rendered
//! as plain text (CLI) or as a PDF document (web download).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};

use crate::error::ReportError;
use crate::metrics::MetricsEngine;
use crate::record::SemesterRecord;
use crate::table::CombinedTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    AcademicSummary,
    SemesterReport,
    SubjectAnalysis,
    CompleteTranscript,
}

impl ReportKind {
    pub const ALL: [ReportKind; 4] = [
        ReportKind::AcademicSummary,
        ReportKind::SemesterReport,
        ReportKind::SubjectAnalysis,
        ReportKind::CompleteTranscript,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            ReportKind::AcademicSummary => "Academic Summary",
            ReportKind::SemesterReport => "Semester Report",
            ReportKind::SubjectAnalysis => "Subject Analysis",
            ReportKind::CompleteTranscript => "Complete Transcript",
        }
    }

    /// URL and file-name form, e.g. `academic-summary`.
    pub fn slug(&self) -> &'static str {
        match self {
            ReportKind::AcademicSummary => "academic-summary",
            ReportKind::SemesterReport => "semester-report",
            ReportKind::SubjectAnalysis => "subject-analysis",
            ReportKind::CompleteTranscript => "complete-transcript",
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.title())
    }
}

impl FromStr for ReportKind {
    type Err = ReportError;

    /// Accepts the slug or the title, ignoring case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace(['_', ' '], "-");
        ReportKind::ALL
            .into_iter()
            .find(|kind| kind.slug() == wanted)
            .ok_or_else(|| ReportError::UnknownKind(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Heading(String),
    Line(String),
    Table {
        headers: Vec<String>,
        rows: Vec<Vec<String>>,
    },
    Spacer,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub kind: ReportKind,
    pub student: String,
    pub generated_at: DateTime<Utc>,
    pub blocks: Vec<Block>,
}

/// Format a mark without a trailing `.00` on whole numbers.
pub fn format_mark(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{:.0}", value)
    } else {
        format!("{:.2}", value)
    }
}

fn strings<const N: usize>(items: [&str; N]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn academic_summary(records: &[SemesterRecord]) -> Vec<Block> {
    let table = CombinedTable::from_records(records.to_vec());
    let metrics = MetricsEngine::new(&table);
    let mut blocks = vec![Block::Heading("Academic Performance Summary".to_string())];

    let trend = metrics.trend_analysis();
    let grade_points: Vec<f64> = table
        .semester_grade_points()
        .iter()
        .map(|p| p.sgpa)
        .filter(|v| *v > 0.0)
        .collect();

    if grade_points.is_empty() {
        blocks.push(Block::Line("No grade points recorded yet.".to_string()));
    }

    let highest = grade_points.iter().copied().fold(f64::MIN, f64::max);
    let lowest = grade_points.iter().copied().fold(f64::MAX, f64::min);
    let mut rows = vec![
        vec!["Total Semesters".to_string(), records.len().to_string()],
        vec!["Total Subjects Completed".to_string(), table.len().to_string()],
        vec![
            "Average SGPA".to_string(),
            format!("{:.2}", metrics.average_grade_point()),
        ],
        vec!["Current CGPA".to_string(), format!("{:.2}", metrics.cgpa())],
    ];
    if !grade_points.is_empty() {
        rows.push(vec!["Highest SGPA".to_string(), format!("{:.2}", highest)]);
        rows.push(vec!["Lowest SGPA".to_string(), format!("{:.2}", lowest)]);
    }
    rows.push(vec!["Best Semester".to_string(), metrics.best_semester()]);
    if let Some(trend) = trend {
        rows.push(vec!["Overall Trend".to_string(), trend.overall_trend.to_string()]);
    }

    blocks.push(Block::Table {
        headers: strings(["Metric", "Value"]),
        rows,
    });
    blocks
}

fn semester_report(records: &[SemesterRecord]) -> Vec<Block> {
    let mut blocks = vec![Block::Heading("Semester-wise Performance".to_string())];
    for record in records {
        blocks.push(Block::Heading(record.label()));
        blocks.push(Block::Table {
            headers: strings(["Subject", "CA", "ESE", "Lab", "Total", "SGPA"]),
            rows: record
                .rows
                .iter()
                .map(|row| {
                    vec![
                        row.subject.clone(),
                        format_mark(row.ca_marks),
                        format_mark(row.ese_marks),
                        format_mark(row.lab_marks),
                        format_mark(row.total),
                        format!("{:.2}", row.sgpa),
                    ]
                })
                .collect(),
        });
        blocks.push(Block::Spacer);
    }
    blocks
}

fn subject_analysis(records: &[SemesterRecord]) -> Vec<Block> {
    // Subjects in order of first appearance.
    let mut order: Vec<&str> = Vec::new();
    for row in records.iter().flat_map(|r| &r.rows) {
        if !order.contains(&row.subject.as_str()) {
            order.push(&row.subject);
        }
    }

    let rows = order
        .into_iter()
        .map(|subject| {
            let marks: Vec<_> = records
                .iter()
                .flat_map(|r| &r.rows)
                .filter(|row| row.subject == subject)
                .collect();
            let n = marks.len() as f64;
            let avg = |f: fn(&crate::record::SubjectRow) -> f64| {
                marks.iter().map(|row| f(row)).sum::<f64>() / n
            };
            let best = marks.iter().map(|row| row.total).fold(f64::MIN, f64::max);
            vec![
                subject.to_string(),
                format!("{:.1}", avg(|r| r.ca_marks)),
                format!("{:.1}", avg(|r| r.ese_marks)),
                format!("{:.1}", avg(|r| r.total)),
                format_mark(best),
            ]
        })
        .collect();

    vec![
        Block::Heading("Subject-wise Performance Analysis".to_string()),
        Block::Table {
            headers: strings(["Subject", "Avg CA", "Avg ESE", "Avg Total", "Best Performance"]),
            rows,
        },
    ]
}

fn complete_transcript(records: &[SemesterRecord]) -> Vec<Block> {
    let mut blocks = vec![Block::Heading("Complete Academic Transcript".to_string())];
    for record in records {
        blocks.push(Block::Heading(record.label()));
        for row in &record.rows {
            blocks.push(Block::Line(format!(
                "{} - CA: {}, ESE: {}, Lab: {}, Total: {}",
                row.subject,
                format_mark(row.ca_marks),
                format_mark(row.ese_marks),
                format_mark(row.lab_marks),
                format_mark(row.total)
            )));
        }
        if !record.rows.is_empty() {
            blocks.push(Block::Line(format!("Semester SGPA: {:.2}", record.sgpa())));
        }
        blocks.push(Block::Spacer);
    }
    blocks
}

/// Build a report of the given kind
///
/// # Arguments
/// * `kind` - Which of the four reports to produce
/// * `student` - Name printed in the header
/// * `records` - The student's semesters in store order
///
/// # Returns
/// * `Report` - Structured content, ready to render
pub fn build_report(kind: ReportKind, student: &str, records: &[SemesterRecord]) -> Report {
    let blocks = if records.is_empty() {
        vec![Block::Line("No results uploaded yet.".to_string())]
    } else {
        match kind {
            ReportKind::AcademicSummary => academic_summary(records),
            ReportKind::SemesterReport => semester_report(records),
            ReportKind::SubjectAnalysis => subject_analysis(records),
            ReportKind::CompleteTranscript => complete_transcript(records),
        }
    };

    Report {
        kind,
        student: student.to_string(),
        generated_at: Utc::now(),
        blocks,
    }
}

// Pad every column to its widest cell.
fn table_lines(headers: &[String], rows: &[Vec<String>]) -> Vec<String> {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(cell.chars().count());
            }
        }
    }

    let format_row = |cells: &[String]| {
        cells
            .iter()
            .enumerate()
            .map(|(i, cell)| format!("{:<width$}", cell, width = widths.get(i).copied().unwrap_or(0)))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut lines = vec![format_row(headers)];
    lines.push(
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("  "),
    );
    lines.extend(rows.iter().map(|row| format_row(row)));
    lines
}

const PAGE_WIDTH: i64 = 595;
const PAGE_HEIGHT: i64 = 842;
const MARGIN: i64 = 50;

// Fonts registered in the page resources.
const FONT_REGULAR: &str = "F1";
const FONT_BOLD: &str = "F2";
const FONT_MONO: &str = "F3";

// Accumulates text operations page by page.
struct PdfPages {
    pages: Vec<Vec<Operation>>,
    current: Vec<Operation>,
    y: i64,
}

impl PdfPages {
    fn new() -> Self {
        PdfPages {
            pages: Vec::new(),
            current: Vec::new(),
            y: PAGE_HEIGHT - MARGIN,
        }
    }

    fn ensure_room(&mut self, height: i64) {
        if self.y - height < MARGIN {
            self.pages.push(std::mem::take(&mut self.current));
            self.y = PAGE_HEIGHT - MARGIN;
        }
    }

    fn text(&mut self, font: &str, size: i64, text: &str) {
        let leading = size + 4;
        self.ensure_room(leading);
        self.y -= leading;
        // The standard fonts only cover Latin-1; keep output to plain ASCII.
        let printable: String = text
            .chars()
            .map(|c| if c.is_ascii() && !c.is_ascii_control() { c } else { '?' })
            .collect();
        self.current.extend([
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![font.into(), Object::Integer(size)]),
            Operation::new("Td", vec![Object::Integer(MARGIN), Object::Integer(self.y)]),
            Operation::new("Tj", vec![Object::string_literal(printable)]),
            Operation::new("ET", vec![]),
        ]);
    }

    fn gap(&mut self, height: i64) {
        self.y -= height;
    }

    fn finish(mut self) -> Vec<Vec<Operation>> {
        if !self.current.is_empty() || self.pages.is_empty() {
            self.pages.push(self.current);
        }
        self.pages
    }
}

impl Report {
    pub fn title(&self) -> String {
        format!("Student Performance Report - {}", self.kind.title())
    }

    /// Suggested download name, e.g. `asha_academic-summary.pdf`.
    pub fn file_name(&self, extension: &str) -> String {
        format!("{}_{}.{}", self.student, self.kind.slug(), extension)
    }

    pub fn render_text(&self) -> String {
        let mut out = vec![
            self.title(),
            format!("Student: {}", self.student),
            format!(
                "Report Generated: {}",
                self.generated_at.format("%Y-%m-%d %H:%M:%S")
            ),
            String::new(),
        ];

        for block in &self.blocks {
            match block {
                Block::Heading(text) => {
                    out.push(text.clone());
                    out.push("=".repeat(text.chars().count()));
                }
                Block::Line(text) => out.push(text.clone()),
                Block::Table { headers, rows } => out.extend(table_lines(headers, rows)),
                Block::Spacer => out.push(String::new()),
            }
        }

        let mut text = out.join("\n");
        text.push('\n');
        text
    }

    /// Render to an A4 PDF document using the standard Type1 fonts
    ///
    /// # Returns
    /// * `Result<Vec<u8>, ReportError>` - The PDF bytes or a PDF/IO error
    pub fn render_pdf(&self) -> Result<Vec<u8>, ReportError> {
        let mut pages = PdfPages::new();
        pages.text(FONT_BOLD, 18, &self.title());
        pages.gap(8);
        pages.text(FONT_REGULAR, 10, &format!("Student: {}", self.student));
        pages.text(
            FONT_REGULAR,
            10,
            &format!(
                "Report Generated: {}",
                self.generated_at.format("%Y-%m-%d %H:%M:%S")
            ),
        );
        pages.gap(12);

        for block in &self.blocks {
            match block {
                Block::Heading(text) => {
                    pages.gap(6);
                    pages.text(FONT_BOLD, 13, text);
                }
                Block::Line(text) => pages.text(FONT_REGULAR, 10, text),
                Block::Table { headers, rows } => {
                    for line in table_lines(headers, rows) {
                        pages.text(FONT_MONO, 9, &line);
                    }
                }
                Block::Spacer => pages.gap(10),
            }
        }

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let font = |doc: &mut Document, name: &str| {
            doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => Object::Name(name.as_bytes().to_vec()),
                "Encoding" => "WinAnsiEncoding",
            })
        };
        let regular = font(&mut doc, "Helvetica");
        let bold = font(&mut doc, "Helvetica-Bold");
        let mono = font(&mut doc, "Courier");
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                FONT_REGULAR => regular,
                FONT_BOLD => bold,
                FONT_MONO => mono,
            },
        });

        let mut kids = Vec::new();
        for operations in pages.finish() {
            let content = Content { operations };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(Object::Reference(page_id));
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
                "MediaBox" => vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(PAGE_WIDTH),
                    Object::Integer(PAGE_HEIGHT),
                ],
            }),
        );

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.compress();

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer)?;
        Ok(buffer)
    }
}
