use std::collections::HashMap;
use std::io::Cursor;

use log::{info, warn};

use crate::error::IngestError;
use crate::extractor;
use crate::record::{Column, SubjectRow};

/// A header row plus raw string cells, before any normalization.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Normalize a raw table into subject rows
///
/// Header names are trimmed, a `Subject` column is required, missing numeric
/// columns default to 0, every numeric cell is coerced (unparseable -> 0) and
/// rows with a blank subject are dropped. A table left with no subject rows
/// is rejected.
///
/// # Arguments
/// * `table` - Header and cells as read from the source file
///
/// # Returns
/// * `Result<Vec<SubjectRow>, IngestError>` - Canonical rows or the reason they could not be produced
pub fn normalize_table(table: &RawTable) -> Result<Vec<SubjectRow>, IngestError> {
    if table.headers.is_empty() {
        return Err(IngestError::Empty);
    }

    let mut positions: HashMap<Column, usize> = HashMap::new();
    for (index, name) in table.headers.iter().enumerate() {
        if let Some(column) = Column::from_header(name) {
            positions.entry(column).or_insert(index);
        }
    }

    let subject_index = *positions
        .get(&Column::Subject)
        .ok_or_else(|| IngestError::MissingColumn(Column::Subject.header().to_string()))?;

    let mut rows = Vec::with_capacity(table.rows.len());
    for cells in &table.rows {
        let subject = match cells.get(subject_index) {
            Some(value) if !value.trim().is_empty() => value.trim(),
            _ => continue,
        };

        let mut row = SubjectRow::create(subject);
        for column in Column::OPTIONAL {
            let value = positions
                .get(&column)
                .and_then(|index| cells.get(*index))
                .map(|cell| coerce_number(cell))
                .unwrap_or(0.0);
            row.set_value(column, value);
        }
        rows.push(row);
    }

    if rows.is_empty() {
        return Err(IngestError::NoRowsExtracted);
    }
    Ok(rows)
}

/// Total numeric coercion: anything that is not a finite number becomes 0.
pub fn coerce_number(cell: &str) -> f64 {
    match cell.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => value,
        _ => 0.0,
    }
}

/// Load subject rows from CSV text
///
/// # Examples
/// ```
/// use student_analytics::loader::from_csv;
///
/// let rows = from_csv("Subject,Total\nMath,72\nPhysics,abc\n").unwrap();
/// assert_eq!(rows.len(), 2);
/// assert_eq!(rows[1].total, 0.0);
/// ```
pub fn from_csv(content: &str) -> Result<Vec<SubjectRow>, IngestError> {
    let mut records = parse_csv(content.trim_start_matches('\u{feff}')).into_iter();

    let headers = records.next().ok_or(IngestError::Empty)?;
    let table = RawTable {
        headers,
        rows: records.collect(),
    };

    normalize_table(&table)
}

/// Load subject rows from the first worksheet of a workbook
///
/// The format (xlsx, xls, xlsb or ods) is detected from the content, not the
/// file name.
pub fn from_excel(bytes: &[u8]) -> Result<Vec<SubjectRow>, IngestError> {
    use calamine::{Data, Reader, Sheets, open_workbook_auto_from_rs};

    let mut workbook: Sheets<Cursor<&[u8]>> = open_workbook_auto_from_rs(Cursor::new(bytes))
        .map_err(|e: calamine::Error| IngestError::Malformed(e.to_string()))?;

    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or(IngestError::Empty)?;

    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e: calamine::Error| IngestError::Malformed(e.to_string()))?;

    let mut sheet_rows = range.rows().map(|row| {
        row.iter()
            .map(|cell| match cell {
                Data::Int(i) => i.to_string(),
                Data::Float(f) => f.to_string(),
                Data::String(s) => s.clone(),
                Data::Bool(b) => b.to_string(),
                _ => String::new(),
            })
            .collect::<Vec<String>>()
    });

    let headers = sheet_rows.next().ok_or(IngestError::Empty)?;
    let table = RawTable {
        headers,
        rows: sheet_rows.collect(),
    };

    normalize_table(&table)
}

/// Load subject rows from a PDF marksheet by extracting its text
pub fn from_pdf(bytes: &[u8]) -> Result<Vec<SubjectRow>, IngestError> {
    let text = pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| IngestError::Malformed(format!("PDF extraction failed: {}", e)))?;

    if text.trim().is_empty() {
        return Err(IngestError::EmptyDocument);
    }

    extractor::extract_rows(&text)
}

/// Detect file type and load the appropriate format
///
/// # Arguments
/// * `file_name` - Original file name; only its extension is used
/// * `bytes` - File content
///
/// # Returns
/// * `Result<Vec<SubjectRow>, IngestError>` - Parsed rows, never a panic
pub fn load_upload(file_name: &str, bytes: &[u8]) -> Result<Vec<SubjectRow>, IngestError> {
    let extension = std::path::Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase());

    let result = match extension.as_deref() {
        Some("csv") => {
            let text = String::from_utf8_lossy(bytes);
            from_csv(&text)
        }
        Some("xlsx") | Some("xls") => from_excel(bytes),
        Some("pdf") => from_pdf(bytes),
        Some(ext) => Err(IngestError::UnsupportedFormat(ext.to_string())),
        None => Err(IngestError::UnsupportedFormat("(none)".to_string())),
    };

    match &result {
        Ok(rows) => info!("Parsed {} subject rows from {}", rows.len(), file_name),
        Err(e) => warn!("Could not parse {}: {}", file_name, e),
    }
    result
}

// Split CSV text into records of fields. Quoted fields may contain commas,
// doubled quotes and line breaks. Blank lines are skipped.
fn parse_csv(content: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut current_field = String::new();
    let mut in_quotes = false;
    let mut chars = content.chars().peekable();

    let mut finish_record = |record: &mut Vec<String>, field: &mut String| {
        record.push(std::mem::take(field));
        let row = std::mem::take(record);
        if !(row.len() == 1 && row[0].trim().is_empty()) {
            records.push(row);
        }
    };

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                if in_quotes && chars.peek() == Some(&'"') {
                    // Doubled quote inside a quoted field
                    current_field.push('"');
                    chars.next();
                } else {
                    in_quotes = !in_quotes;
                }
            }
            ',' if !in_quotes => {
                record.push(std::mem::take(&mut current_field));
            }
            '\n' if !in_quotes => finish_record(&mut record, &mut current_field),
            '\r' if !in_quotes => {}
            _ => current_field.push(c),
        }
    }
    if !record.is_empty() || !current_field.is_empty() {
        finish_record(&mut record, &mut current_field);
    }

    records
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_optional_columns_default_to_zero() {
        let rows = from_csv("Subject,Total\nMath,72\n").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].total, 72.0);
        assert_eq!(rows[0].ca_marks, 0.0);
        assert_eq!(rows[0].sgpa, 0.0);
    }

    #[test]
    fn test_header_whitespace_is_stripped() {
        let rows = from_csv(" Subject , CA_Marks ,SGPA\nMath, 18 ,7.5\n").unwrap();
        assert_eq!(rows[0].subject, "Math");
        assert_eq!(rows[0].ca_marks, 18.0);
        assert_eq!(rows[0].sgpa, 7.5);
    }

    #[test]
    fn test_missing_subject_column_fails() {
        assert_eq!(
            from_csv("Course,Total\nMath,70\n"),
            Err(IngestError::MissingColumn("Subject".to_string()))
        );
        assert_eq!(from_csv(""), Err(IngestError::Empty));
    }

    #[test]
    fn test_malformed_numbers_coerce_to_zero() {
        let rows = from_csv("Subject,CA_Marks,ESE_Marks,Total\nMath,abc,NaN,\n").unwrap();
        assert_eq!(rows[0].ca_marks, 0.0);
        assert_eq!(rows[0].ese_marks, 0.0);
        assert_eq!(rows[0].total, 0.0);
        assert_eq!(coerce_number("inf"), 0.0);
        assert_eq!(coerce_number(" 12.5 "), 12.5);
    }

    #[test]
    fn test_blank_subjects_are_dropped() {
        let rows = from_csv("Subject,Total\n  ,50\nPhysics,60\n,70\n").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].subject, "Physics");
    }

    #[test]
    fn test_no_subject_rows_is_an_error() {
        assert_eq!(
            from_csv("Subject,Total\n ,50\n,60\n"),
            Err(IngestError::NoRowsExtracted)
        );
        assert_eq!(from_csv("Subject,Total\n"), Err(IngestError::NoRowsExtracted));
        assert_eq!(
            load_upload("blank.csv", b"Subject,CA_Marks\n  ,12\n"),
            Err(IngestError::NoRowsExtracted)
        );
    }

    #[test]
    fn test_quoted_fields() {
        assert_eq!(
            parse_csv(r#""Lab, Physics",10,"say ""hi""""#),
            vec![vec!["Lab, Physics", "10", r#"say "hi""#]]
        );
        let rows = from_csv("Subject,Total\n\"Lab, Physics\",81\n").unwrap();
        assert_eq!(rows[0].subject, "Lab, Physics");
    }

    #[test]
    fn test_quoted_line_breaks_stay_in_one_field() {
        let csv = "Subject,Total\r\n\"Data\nStructures\",81\r\n\r\nMath,70\r\n";
        let rows = from_csv(csv).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].subject, "Data\nStructures");
        assert_eq!(rows[0].total, 81.0);
        assert_eq!(rows[1].subject, "Math");
    }

    #[test]
    fn test_upload_dispatch() {
        let rows = load_upload("Sem1.CSV", b"Subject,Total\nMath,70\n").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(
            load_upload("notes.txt", b"hello"),
            Err(IngestError::UnsupportedFormat("txt".to_string()))
        );
        assert!(matches!(
            load_upload("broken.xlsx", b"not a zip"),
            Err(IngestError::Malformed(_))
        ));
    }

    #[cfg(feature = "web")]
    fn workbook(cells: &[&[&str]]) -> Vec<u8> {
        let mut workbook = rust_xlsxwriter::Workbook::new();
        let sheet = workbook.add_worksheet();
        for (r, row) in cells.iter().enumerate() {
            for (c, cell) in row.iter().enumerate() {
                let written = match cell.parse::<f64>() {
                    Ok(number) => sheet.write_number(r as u32, c as u16, number),
                    Err(_) => sheet.write_string(r as u32, c as u16, *cell),
                };
                written.unwrap();
            }
        }
        workbook.save_to_buffer().unwrap()
    }

    #[cfg(feature = "web")]
    #[test]
    fn test_workbook_uploads() {
        let bytes = workbook(&[
            &["Subject", "CA_Marks", "Total", "SGPA"],
            &["Math", "20", "70", "7.5"],
            &["", "10", "40", "7.5"],
            &["Physics", "18", "66", "7.5"],
        ]);

        for name in ["results.xlsx", "results.xls", "RESULTS.XLS"] {
            let rows = load_upload(name, &bytes).unwrap();
            assert_eq!(rows.len(), 2);
            assert_eq!(rows[0].subject, "Math");
            assert_eq!(rows[0].ca_marks, 20.0);
            assert_eq!(rows[1].total, 66.0);
            assert_eq!(rows[1].lab_marks, 0.0);
        }

        let header_only = workbook(&[&["Subject", "Total"]]);
        assert_eq!(
            load_upload("results.xls", &header_only),
            Err(IngestError::NoRowsExtracted)
        );
        assert!(matches!(
            load_upload("legacy.xls", b"not a workbook"),
            Err(IngestError::Malformed(_))
        ));
    }

    fn blank_pdf() -> Vec<u8> {
        use lopdf::{Document, Object, Stream, dictionary};

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let content_id = doc.add_object(Stream::new(dictionary! {}, Vec::new()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! {},
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => 1,
                "MediaBox" => vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(595),
                    Object::Integer(842),
                ],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).unwrap();
        buffer
    }

    #[test]
    fn test_pdf_uploads() {
        use crate::report::{Block, Report, ReportKind};

        let report = Report {
            kind: ReportKind::CompleteTranscript,
            student: "asha".to_string(),
            generated_at: chrono::Utc::now(),
            blocks: vec![
                Block::Line("Semester SGPA: 8.5".to_string()),
                Block::Line("Mathematics 20 50 0 70 8.5".to_string()),
                Block::Line("Physics 18 45 12 75".to_string()),
            ],
        };
        let bytes = report.render_pdf().unwrap();
        let rows = load_upload("marksheet.pdf", &bytes).unwrap();

        let maths = rows.iter().find(|r| r.subject == "Mathematics").unwrap();
        assert_eq!(maths.total, 70.0);
        assert_eq!(maths.sgpa, 8.5);
        let physics = rows.iter().find(|r| r.subject == "Physics").unwrap();
        assert_eq!(physics.lab_marks, 12.0);
        assert_eq!(physics.total, 75.0);

        assert_eq!(
            load_upload("scan.pdf", &blank_pdf()),
            Err(IngestError::EmptyDocument)
        );
        assert!(matches!(
            load_upload("broken.pdf", b"not a pdf"),
            Err(IngestError::Malformed(_))
        ));
    }
}
