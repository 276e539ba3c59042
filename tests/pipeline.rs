//! Upload-to-report flow against a file-backed store.

use student_analytics::config::{AppConfig, open_store};
use student_analytics::downloader::to_csv;
use student_analytics::loader::load_upload;
use student_analytics::metrics::MetricsEngine;
use student_analytics::ml::{ClusterOptions, cluster_subjects, forecast_grade_point};
use student_analytics::report::{ReportKind, build_report};
use student_analytics::store::StoreKind;
use student_analytics::{CombinedTable, IngestError};
use tempfile::TempDir;

const SEMESTERS: [(&str, &str); 3] = [
    (
        "Semester 1",
        "Subject,CA_Marks,ESE_Marks,Lab_Marks,Total,SGPA\n\
         Mathematics,20,45,0,65,7.2\n\
         Physics,18,40,15,73,7.2\n\
         Chemistry,12,30,14,56,7.2\n",
    ),
    (
        "Semester 2",
        "Subject,CA_Marks,ESE_Marks,Lab_Marks,Total,SGPA\n\
         Mathematics,22,50,0,72,7.8\n\
         Programming,25,55,18,98,7.8\n\
         Electronics,15,38,12,65,7.8\n",
    ),
    (
        "Semester 3",
        "Subject,ESE_Marks,CA_Marks,Total,SGPA\n\
         Mathematics,58,24,82,8.4\n\
         Data Structures,52,23,75,8.4\n",
    ),
];

fn config(dir: &TempDir, backend: StoreKind) -> AppConfig {
    AppConfig {
        backend,
        data_dir: dir.path().to_path_buf(),
        ..AppConfig::default()
    }
}

fn import_all(config: &AppConfig) {
    let mut store = open_store(config).unwrap();
    for (term, csv) in SEMESTERS {
        let rows = load_upload("results.csv", csv.as_bytes()).unwrap();
        assert!(store.save("asha", "2024-25", term, &rows).unwrap());
    }
}

#[test]
fn test_json_pipeline() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir, StoreKind::Json);
    import_all(&config);

    // A fresh handle sees what the first one wrote.
    let store = open_store(&config).unwrap();
    let records = store.fetch("asha").unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records[2].rows[0].lab_marks, 0.0);
    assert!(store.fetch("ravi").unwrap().is_empty());

    let table = CombinedTable::from_records(records.clone());
    let metrics = MetricsEngine::new(&table);
    assert!((metrics.average_grade_point() - 7.8).abs() < 1e-9);
    assert_eq!(metrics.best_semester(), "2024-25 - Semester 3");
    assert_eq!(metrics.worst_semester(), "2024-25 - Semester 1");
    assert_eq!(metrics.total_subjects(), 6);

    let forecast = forecast_grade_point(&table).unwrap();
    assert_eq!(forecast.next_term, 4);
    assert!((forecast.predicted_sgpa - 9.0).abs() < 1e-6);

    let clusters = cluster_subjects(&table, &ClusterOptions::default()).unwrap();
    assert_eq!(clusters.subjects.len(), 6);

    let report = build_report(ReportKind::AcademicSummary, "asha", &records);
    let text = report.render_text();
    assert!(text.contains("Average SGPA"));
    assert!(text.contains("7.80"));
    assert!(report.render_pdf().unwrap().starts_with(b"%PDF"));

    assert_eq!(to_csv(&records).lines().count(), 9);
}

#[test]
fn test_backends_agree() {
    let mut fetched = Vec::new();
    for backend in [StoreKind::Json, StoreKind::Archive, StoreKind::Sqlite] {
        let dir = TempDir::new().unwrap();
        let config = config(&dir, backend);
        import_all(&config);
        let mut store = open_store(&config).unwrap();
        let late = load_upload("late.csv", b"Subject,Total,SGPA\nProject,88,9.1\n").unwrap();
        store.save("asha", "2027-28", "Semester 9", &late).unwrap();
        store.save("asha", "2027-28", "Semester 10", &late).unwrap();
        // Re-uploading an earlier semester keeps its place.
        let (term, csv) = SEMESTERS[0];
        let rows = load_upload("results.csv", csv.as_bytes()).unwrap();
        store.save("asha", "2024-25", term, &rows[..2]).unwrap();
        drop(store);

        let store = open_store(&config).unwrap();
        assert_eq!(store.backend(), backend);
        let terms: Vec<String> = store.fetch("asha").unwrap().into_iter().map(|r| r.term).collect();
        assert_eq!(
            terms,
            vec!["Semester 1", "Semester 2", "Semester 3", "Semester 9", "Semester 10"]
        );
        let rows: Vec<_> = store
            .fetch("asha")
            .unwrap()
            .into_iter()
            .map(|r| (r.academic_year, r.term, r.rows))
            .collect();
        fetched.push(rows);
    }
    assert_eq!(fetched[0], fetched[1]);
    assert_eq!(fetched[1], fetched[2]);
}

#[test]
fn test_rejected_upload_saves_nothing() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir, StoreKind::Json);
    let mut store = open_store(&config).unwrap();

    let err = load_upload("results.csv", b"Name,Total\nMath,70\n").unwrap_err();
    assert_eq!(err, IngestError::MissingColumn("Subject".to_string()));
    assert!(matches!(
        load_upload("notes.docx", b"whatever"),
        Err(IngestError::UnsupportedFormat(_))
    ));

    assert!(!store.save("asha", "2024-25", "Semester 1", &[]).unwrap());
    assert!(store.fetch("asha").unwrap().is_empty());
}
