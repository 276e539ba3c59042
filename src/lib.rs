/*!
# Student Performance Analytics

A web dashboard for students to upload semester result sheets and track
their academic performance over time, built in Rust.

## Overview

Students sign up, log in and upload one result sheet per semester (CSV, Excel
or PDF). Every upload is normalized to the canonical subject columns
(`Subject`, `CA_Marks`, `ESE_Marks`, `Lab_Marks`, `Total`, `SGPA`) and stored
per user. The dashboard combines all stored semesters into headline metrics,
charts, exploratory analyses and downloadable reports.

## Architecture

### Ingestion Layer
- **loader**: File dispatch by extension, CSV and Excel parsing, column normalization
- **extractor**: Regex-driven row extraction from PDF text

### Analytics Layer
- **table**: Combined view over a user's semesters
- **metrics**: SGPA/CGPA, best/worst semester, subject averages, categories, trends, suggestions
- **ml**: K-means subject clustering, SGPA forecasting, principal component analysis
- **stats**: Small numeric helpers shared by the above

### Data Persistence Layer
- **store**: Accounts and results behind the `ResultStore` trait, with memory,
  JSON, Gzip-compressed bincode archive and SQLite backends
- **config**: Environment-driven configuration and backend selection

### Presentation Layer
- **report**: Text and PDF report documents
- **downloader**: History export (CSV, XLSX)
- **graph**: SVG charts
- **login**: Password hashing, sign-up, sessions and the auth middleware
- **app**: Routing, templates and the JSON API

## REST API Endpoints

- `/api/upload`, `/api/preview` - Upload a sheet, with or without saving it
- `/api/summary`, `/api/subjects`, `/api/semesters`, `/api/statistics` - Metrics
- `/api/categories`, `/api/correlation`, `/api/trend`, `/api/patterns`, `/api/suggestions` - Insights
- `/api/clusters`, `/api/forecast`, `/api/pca` - Exploratory analyses
- `/api/history`, `/api/results`, `/api/database` - Stored data and backend info
- `/charts/{kind}.svg`, `/reports/{kind}.{pdf,txt}`, `/export/history.{csv,xlsx}` - Downloads
*/

pub mod config;
pub mod downloader;
pub mod error;
pub mod extractor;
pub mod loader;
pub mod metrics;
pub mod ml;
pub mod record;
pub mod report;
pub mod stats;
pub mod store;
pub mod table;

#[cfg(feature = "web")]
pub mod app;
#[cfg(feature = "web")]
pub mod graph;
#[cfg(feature = "web")]
pub mod login;

pub use error::{AnalyticsError, IngestError, ReportError, StoreError};
pub use record::{Column, SemesterRecord, SubjectRow};
pub use store::ResultStore;
pub use table::CombinedTable;
