//! Export of a user's stored results as CSV or XLSX.

use crate::record::SemesterRecord;

/// Column headers of the exported history table.
pub const HISTORY_HEADERS: [&str; 8] = [
    "Academic Year",
    "Semester",
    "Subject",
    "CA Marks",
    "ESE Marks",
    "Lab Marks",
    "Total",
    "SGPA",
];

// Quote a field if it contains a comma, quote or newline.
fn escape_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Convert a user's history to CSV
///
/// One line per subject row, semesters in store order, headed by
/// [`HISTORY_HEADERS`].
///
/// # Arguments
/// * `records` - The user's semesters
///
/// # Returns
/// * `String` - CSV content
///
/// # Examples
/// ```
/// use student_analytics::downloader::to_csv;
/// use student_analytics::record::{SemesterRecord, SubjectRow};
///
/// let records = vec![SemesterRecord::create(
///     "2024-25",
///     "Semester 1",
///     vec![SubjectRow::create("Math").with_marks(20.0, 50.0, 0.0, 70.0).with_sgpa(7.5)],
/// )];
/// let csv = to_csv(&records);
/// assert!(csv.ends_with("2024-25,Semester 1,Math,20,50,0,70,7.5\n"));
/// ```
pub fn to_csv(records: &[SemesterRecord]) -> String {
    let mut csv_content = HISTORY_HEADERS.join(",");
    csv_content.push('\n');

    for record in records {
        for row in &record.rows {
            let fields = [
                escape_field(&record.academic_year),
                escape_field(&record.term),
                escape_field(&row.subject),
                row.ca_marks.to_string(),
                row.ese_marks.to_string(),
                row.lab_marks.to_string(),
                row.total.to_string(),
                row.sgpa.to_string(),
            ];
            csv_content.push_str(&fields.join(","));
            csv_content.push('\n');
        }
    }

    csv_content
}

/// Convert a user's history to an XLSX workbook with a single "Results" sheet
///
/// # Arguments
/// * `records` - The user's semesters
///
/// # Returns
/// * `Result<Vec<u8>, rust_xlsxwriter::XlsxError>` - Workbook bytes or a writer error
#[cfg(feature = "web")]
pub fn to_xlsx(records: &[SemesterRecord]) -> Result<Vec<u8>, rust_xlsxwriter::XlsxError> {
    use rust_xlsxwriter::{Format, Workbook, Worksheet};

    let mut workbook = Workbook::new();
    let mut worksheet = Worksheet::new();
    worksheet.set_name("Results")?;

    let bold = Format::new().set_bold();
    for (col, header) in HISTORY_HEADERS.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, *header, &bold)?;
    }

    let mut r: u32 = 1;
    for record in records {
        for row in &record.rows {
            worksheet.write_string(r, 0, &record.academic_year)?;
            worksheet.write_string(r, 1, &record.term)?;
            worksheet.write_string(r, 2, &row.subject)?;
            worksheet.write_number(r, 3, row.ca_marks)?;
            worksheet.write_number(r, 4, row.ese_marks)?;
            worksheet.write_number(r, 5, row.lab_marks)?;
            worksheet.write_number(r, 6, row.total)?;
            worksheet.write_number(r, 7, row.sgpa)?;
            r += 1;
        }
    }

    workbook.push_worksheet(worksheet);
    workbook.save_to_buffer()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::SubjectRow;

    fn records() -> Vec<SemesterRecord> {
        vec![
            SemesterRecord::create(
                "2024-25",
                "Semester 1",
                vec![
                    SubjectRow::create("Math")
                        .with_marks(20.0, 50.0, 0.0, 70.0)
                        .with_sgpa(7.5),
                    SubjectRow::create("Data Structures, Lab")
                        .with_marks(18.5, 40.0, 20.0, 78.5)
                        .with_sgpa(7.5),
                ],
            ),
            SemesterRecord::create(
                "2024-25",
                "Semester 2",
                vec![SubjectRow::create("The \"Hard\" One").with_sgpa(8.0)],
            ),
        ]
    }

    #[test]
    fn test_csv_layout() {
        let csv = to_csv(&records());
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(
            lines[0],
            "Academic Year,Semester,Subject,CA Marks,ESE Marks,Lab Marks,Total,SGPA"
        );
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[1], "2024-25,Semester 1,Math,20,50,0,70,7.5");
    }

    #[test]
    fn test_csv_escaping() {
        let csv = to_csv(&records());
        assert!(csv.contains("\"Data Structures, Lab\",18.5,40,20,78.5,7.5"));
        assert!(csv.contains("\"The \"\"Hard\"\" One\""));
    }

    #[test]
    fn test_csv_of_empty_history_is_header_only() {
        assert_eq!(to_csv(&[]).lines().count(), 1);
    }

    #[cfg(feature = "web")]
    #[test]
    fn test_xlsx_reads_back() {
        use calamine::{Data, Reader, Xlsx, open_workbook_from_rs};
        use std::io::Cursor;

        let bytes = to_xlsx(&records()).unwrap();
        let mut workbook: Xlsx<Cursor<Vec<u8>>> = open_workbook_from_rs(Cursor::new(bytes)).unwrap();
        let range = workbook.worksheet_range("Results").unwrap();

        assert_eq!(range.height(), 4);
        assert_eq!(range.get((0, 0)), Some(&Data::String("Academic Year".to_string())));
        assert_eq!(range.get((2, 2)), Some(&Data::String("Data Structures, Lab".to_string())));
        assert_eq!(range.get((2, 6)), Some(&Data::Float(78.5)));
    }
}
