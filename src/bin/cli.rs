#![cfg(not(tarpaulin_include))]
//! Command-line access to a result store: import sheets, print the summary,
//! export history and write reports without starting the web server.

use std::fs;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use log::info;

use student_analytics::config::{AppConfig, open_store};
use student_analytics::downloader;
use student_analytics::loader;
use student_analytics::metrics::MetricsEngine;
use student_analytics::report::{ReportKind, build_report};
use student_analytics::table::CombinedTable;

/// Student performance analytics CLI.
#[derive(Parser, Debug)]
#[command(name = "student-analytics")]
#[command(version)]
#[command(about = "Import result sheets and inspect academic performance")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Store backend (json, archive, sqlite or memory).
    #[arg(long, global = true, env = "STORE_BACKEND")]
    backend: Option<String>,

    /// Directory of the file-backed stores.
    #[arg(long, global = true, env = "DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ExportFormat {
    Csv,
    Xlsx,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ReportFormat {
    Pdf,
    Txt,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Parse a result sheet and save it as one semester.
    Import {
        #[arg(short, long)]
        user: String,
        /// Academic year, e.g. 2024-25.
        #[arg(short, long)]
        year: String,
        /// Semester label, e.g. "Semester 1".
        #[arg(short, long)]
        semester: String,
        /// CSV, XLSX, XLS or PDF file.
        file: PathBuf,
    },

    /// Print headline metrics and suggestions.
    Summary {
        #[arg(short, long)]
        user: String,
        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Write the full history as CSV or XLSX.
    Export {
        #[arg(short, long)]
        user: String,
        #[arg(short, long, value_enum, default_value = "csv")]
        format: ExportFormat,
        /// Output path; CSV goes to stdout when omitted.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write one of the report documents.
    Report {
        #[arg(short, long)]
        user: String,
        /// academic-summary, semester-report, subject-analysis or complete-transcript.
        #[arg(short, long, default_value = "academic-summary")]
        kind: String,
        #[arg(short, long, value_enum, default_value = "pdf")]
        format: ReportFormat,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn config_for(cli: &Cli) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let mut config = AppConfig::from_env()?;
    if let Some(backend) = &cli.backend {
        config.backend = backend.parse()?;
    }
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    Ok(config)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let config = config_for(&cli)?;
    let mut store = open_store(&config)?;

    match cli.command {
        Commands::Import {
            user,
            year,
            semester,
            file,
        } => {
            let bytes = fs::read(&file)?;
            let name = file.to_string_lossy();
            let rows = loader::load_upload(&name, &bytes)?;
            if store.save(&user, &year, &semester, &rows)? {
                info!("Saved {} rows for {}", rows.len(), user);
                println!("Imported {} subjects for {} - {}", rows.len(), year, semester);
            } else {
                println!("Nothing to import from {}", name);
            }
        }
        Commands::Summary { user, json } => {
            let table = CombinedTable::from_records(store.fetch(&user)?);
            let metrics = MetricsEngine::new(&table);
            let summary = metrics.summary();
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("Average SGPA:    {:.2}", summary.average_sgpa);
                println!("CGPA:            {:.2}", summary.cgpa);
                println!("Best semester:   {}", summary.best_semester);
                println!("Worst semester:  {}", summary.worst_semester);
                println!("Subjects:        {}", summary.total_subjects);
                println!("Semesters:       {}", summary.total_semesters);
                for suggestion in metrics.improvement_suggestions() {
                    println!("- {}", suggestion);
                }
            }
        }
        Commands::Export {
            user,
            format,
            output,
        } => {
            let records = store.fetch(&user)?;
            let bytes = match format {
                ExportFormat::Csv => downloader::to_csv(&records).into_bytes(),
                #[cfg(feature = "web")]
                ExportFormat::Xlsx => downloader::to_xlsx(&records)?,
                #[cfg(not(feature = "web"))]
                ExportFormat::Xlsx => return Err("XLSX export needs the web feature".into()),
            };
            match output {
                Some(path) => {
                    fs::write(&path, bytes)?;
                    println!("Wrote {}", path.display());
                }
                None => match format {
                    ExportFormat::Csv => print!("{}", String::from_utf8_lossy(&bytes)),
                    ExportFormat::Xlsx => return Err("XLSX export needs --output".into()),
                },
            }
        }
        Commands::Report {
            user,
            kind,
            format,
            output,
        } => {
            let kind: ReportKind = kind.parse()?;
            let report = build_report(kind, &user, &store.fetch(&user)?);
            let (bytes, extension) = match format {
                ReportFormat::Pdf => (report.render_pdf()?, "pdf"),
                ReportFormat::Txt => (report.render_text().into_bytes(), "txt"),
            };
            let path = output.unwrap_or_else(|| PathBuf::from(report.file_name(extension)));
            fs::write(&path, bytes)?;
            println!("Wrote {}", path.display());
        }
    }

    Ok(())
}
