#![cfg(feature = "web")]
//! HTTP layer: routing, templates, uploads, the JSON API and downloads.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Extension, Form, Json, Router,
    extract::{Multipart, Path, Query, State},
    http::{StatusCode, header},
    middleware,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{delete, get, post},
};
use handlebars::Handlebars;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;

use crate::config::{AppConfig, open_store};
use crate::downloader;
use crate::error::{AnalyticsError, ChartError, IngestError, ReportError, StoreError};
use crate::graph::{ChartKind, ChartOptions, render_chart};
use crate::loader;
use crate::login::{
    CurrentUser, SessionStore, handle_login, handle_logout, handle_signup, require_auth,
    serve_login_page, serve_signup_page,
};
use crate::metrics::MetricsEngine;
use crate::ml::{self, ClusterLabeling, ClusterOptions};
use crate::record::{Column, SemesterRecord, SubjectRow};
use crate::report::{ReportKind, build_report};
use crate::store::ResultStore;
use crate::table::CombinedTable;

const SESSION_SWEEP: Duration = Duration::from_secs(60 * 60);

/// Shared application state: the store, the session table and templates.
pub struct AppState {
    store: Mutex<Box<dyn ResultStore + Send>>,
    pub sessions: SessionStore,
    pub config: AppConfig,
    templates: Handlebars<'static>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(
        config: AppConfig,
        store: Box<dyn ResultStore + Send>,
    ) -> Result<Self, handlebars::TemplateError> {
        let mut templates = Handlebars::new();
        templates.register_template_string("login", include_str!("./static/login.hbs"))?;
        templates.register_template_string("signup", include_str!("./static/signup.hbs"))?;
        templates.register_template_string("dashboard", include_str!("./static/dashboard.hbs"))?;

        Ok(AppState {
            store: Mutex::new(store),
            sessions: SessionStore::new(Duration::from_secs(config.session_hours * 60 * 60)),
            config,
            templates,
        })
    }

    /// Run `f` with exclusive access to the store.
    pub fn with_store<T, E: From<StoreError>>(
        &self,
        f: impl FnOnce(&mut dyn ResultStore) -> Result<T, E>,
    ) -> Result<T, E> {
        let mut store = self
            .store
            .lock()
            .map_err(|e| StoreError::lock_poisoned(e.to_string()))?;
        f(&mut **store)
    }

    /// Snapshot of a user's semesters. The lock is released before returning.
    pub fn records(&self, username: &str) -> Result<Vec<SemesterRecord>, StoreError> {
        self.with_store(|store| store.fetch(username))
    }

    pub fn table(&self, username: &str) -> Result<CombinedTable, StoreError> {
        Ok(CombinedTable::from_records(self.records(username)?))
    }
}

/// Request failures and their HTTP status.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Could not parse upload: {0}")]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Analytics(#[from] AnalyticsError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error(transparent)]
    Chart(#[from] ChartError),

    #[error("Export failed: {0}")]
    Export(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Ingest(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Analytics(e) | AppError::Chart(ChartError::Analytics(e)) => match e {
                AnalyticsError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                AnalyticsError::InsufficientData(_) => StatusCode::UNPROCESSABLE_ENTITY,
            },
            AppError::Report(ReportError::UnknownKind(_))
            | AppError::Chart(ChartError::UnknownKind(_))
            | AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Store(_) | AppError::Report(_) | AppError::Chart(_) | AppError::Export(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        } else {
            debug!("Request rejected ({}): {}", status, self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Render a registered template, answering 500 if it fails.
pub fn render_page(state: &AppState, name: &str, data: &serde_json::Value) -> Response {
    match state.templates.render(name, data) {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            error!("Template {} failed: {}", name, e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Template error").into_response()
        }
    }
}

/// Build the full router for the given state.
pub fn router(state: SharedState) -> Router {
    let protected = Router::new()
        .route("/dashboard", get(dashboard))
        .route("/upload", post(upload_form))
        .route("/semesters/delete", post(delete_semester_form))
        .route("/results/clear", post(clear_results_form))
        .route("/charts/:file", get(chart))
        .route("/reports/:file", get(report))
        .route("/export/:file", get(export))
        .route("/api/upload", post(api_upload))
        .route("/api/preview", post(api_preview))
        .route("/api/summary", get(api_summary))
        .route("/api/subjects", get(api_subjects))
        .route("/api/semesters", get(api_semesters).delete(api_delete_semester))
        .route("/api/statistics", get(api_statistics))
        .route("/api/categories", get(api_categories))
        .route("/api/correlation", get(api_correlation))
        .route("/api/suggestions", get(api_suggestions))
        .route("/api/trend", get(api_trend))
        .route("/api/patterns", get(api_patterns))
        .route("/api/clusters", get(api_clusters))
        .route("/api/forecast", get(api_forecast))
        .route("/api/pca", get(api_pca))
        .route("/api/history", get(api_history))
        .route("/api/results", delete(api_clear))
        .route("/api/database", get(api_database))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/", get(|| async { Redirect::to("/dashboard") }))
        .route("/login", get(serve_login_page).post(handle_login))
        .route("/signup", get(serve_signup_page).post(handle_signup))
        .route("/logout", get(handle_logout))
        .merge(protected)
        .nest_service("/static", ServeDir::new("static"))
        .with_state(state)
}

/// Open the configured store and serve until the process is stopped.
pub async fn run(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(&config)?;
    let state = Arc::new(AppState::new(config.clone(), store)?);

    let sweeper = state.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SESSION_SWEEP);
        loop {
            ticker.tick().await;
            let purged = sweeper.sessions.purge_expired();
            if purged > 0 {
                debug!("Purged {} expired sessions", purged);
            }
        }
    });

    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!("Listening on http://{}", config.bind_addr);
    axum::serve(listener, router(state)).await?;

    Ok(())
}

#[derive(Debug, Default, Deserialize)]
struct DashboardQuery {
    message: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SemesterQuery {
    academic_year: String,
    semester: String,
}

#[derive(Debug, Default, Deserialize)]
struct ClusterQuery {
    labeling: Option<String>,
    features: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PcaQuery {
    features: Option<String>,
}

/// Semester listing entry for the dashboard and `/api/semesters`.
#[derive(Debug, Serialize)]
struct SemesterEntry {
    academic_year: String,
    term: String,
    label: String,
    subjects: usize,
    sgpa: f64,
    uploaded_at: String,
}

impl From<&SemesterRecord> for SemesterEntry {
    fn from(record: &SemesterRecord) -> Self {
        SemesterEntry {
            academic_year: record.academic_year.clone(),
            term: record.term.clone(),
            label: record.label(),
            subjects: record.rows.len(),
            sgpa: record.sgpa(),
            uploaded_at: record.uploaded_at.format("%Y-%m-%d %H:%M").to_string(),
        }
    }
}

#[derive(Debug, Serialize, PartialEq)]
struct HistoryStats {
    total_records: usize,
    total_subjects: usize,
    semesters_completed: usize,
}

fn history_stats(records: &[SemesterRecord]) -> HistoryStats {
    let rows = records.iter().flat_map(|r| &r.rows);
    HistoryStats {
        total_records: records.len(),
        total_subjects: rows.map(|row| row.subject.as_str()).collect::<BTreeSet<_>>().len(),
        semesters_completed: records
            .iter()
            .filter(|r| !r.rows.is_empty())
            .map(|r| r.term.as_str())
            .collect::<BTreeSet<_>>()
            .len(),
    }
}

// A parsed upload waiting to be saved.
struct Upload {
    academic_year: String,
    semester: String,
    rows: Vec<SubjectRow>,
}

async fn receive_upload(mut multipart: Multipart) -> Result<Upload, AppError> {
    let mut academic_year = String::new();
    let mut semester = String::new();
    let mut file: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "academic_year" => {
                academic_year = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
            }
            "semester" => {
                semester = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
            }
            "file" => {
                let name = field.file_name().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                file = Some((name, bytes.to_vec()));
            }
            _ => {}
        }
    }

    let academic_year = academic_year.trim().to_string();
    let semester = semester.trim().to_string();
    if academic_year.is_empty() || semester.is_empty() {
        return Err(AppError::BadRequest(
            "Academic year and semester are required".to_string(),
        ));
    }
    let (file_name, bytes) = file
        .filter(|(_, bytes)| !bytes.is_empty())
        .ok_or_else(|| AppError::BadRequest("No file uploaded".to_string()))?;

    let rows = loader::load_upload(&file_name, &bytes)?;
    Ok(Upload {
        academic_year,
        semester,
        rows,
    })
}

fn save_upload(state: &AppState, username: &str, upload: &Upload) -> Result<bool, AppError> {
    let saved = state.with_store(|store| {
        store.save(username, &upload.academic_year, &upload.semester, &upload.rows)
    })?;
    if saved {
        info!(
            "{} uploaded {} rows for {} - {}",
            username,
            upload.rows.len(),
            upload.academic_year,
            upload.semester
        );
    }
    Ok(saved)
}

fn dashboard_redirect(key: &str, text: &str) -> Redirect {
    Redirect::to(&format!("/dashboard?{}={}", key, urlencoding::encode(text)))
}

async fn dashboard(
    State(state): State<SharedState>,
    Extension(CurrentUser(username)): Extension<CurrentUser>,
    Query(query): Query<DashboardQuery>,
) -> Result<Response, AppError> {
    let account = state.with_store(|store| store.get_account(&username))?;
    let table = state.table(&username)?;
    let metrics = MetricsEngine::new(&table);
    let summary = metrics.summary();

    let semesters: Vec<SemesterEntry> = table.records().iter().map(SemesterEntry::from).collect();
    let charts: Vec<_> = ChartKind::ALL
        .iter()
        .map(|kind| json!({ "slug": kind.slug(), "title": kind.title() }))
        .collect();
    let reports: Vec<_> = ReportKind::ALL
        .iter()
        .map(|kind| json!({ "slug": kind.slug(), "title": kind.title() }))
        .collect();

    let context = json!({
        "username": username,
        "full_name": account.map(|a| a.full_name).unwrap_or_else(|| username.clone()),
        "has_data": !table.is_empty(),
        "average_sgpa": format!("{:.2}", summary.average_sgpa),
        "cgpa": format!("{:.2}", summary.cgpa),
        "summary": summary,
        "semesters": semesters,
        "suggestions": metrics.improvement_suggestions(),
        "charts": charts,
        "reports": reports,
        "message": query.message,
        "error": query.error,
    });
    Ok(render_page(&state, "dashboard", &context))
}

async fn upload_form(
    State(state): State<SharedState>,
    Extension(CurrentUser(username)): Extension<CurrentUser>,
    multipart: Multipart,
) -> Redirect {
    let outcome = match receive_upload(multipart).await {
        Ok(upload) => save_upload(&state, &username, &upload).map(|_| upload),
        Err(e) => Err(e),
    };
    match outcome {
        Ok(upload) => dashboard_redirect(
            "message",
            &format!(
                "Saved {} subjects for {} - {}",
                upload.rows.len(),
                upload.academic_year,
                upload.semester
            ),
        ),
        Err(e) => {
            warn!("Upload by {} rejected: {}", username, e);
            dashboard_redirect("error", &e.to_string())
        }
    }
}

async fn delete_semester_form(
    State(state): State<SharedState>,
    Extension(CurrentUser(username)): Extension<CurrentUser>,
    Form(query): Form<SemesterQuery>,
) -> Result<Redirect, AppError> {
    let removed = state.with_store(|store| {
        store.delete_semester(&username, &query.academic_year, &query.semester)
    })?;
    Ok(if removed {
        dashboard_redirect(
            "message",
            &format!("Deleted {} - {}", query.academic_year, query.semester),
        )
    } else {
        dashboard_redirect("error", "Semester not found")
    })
}

async fn clear_results_form(
    State(state): State<SharedState>,
    Extension(CurrentUser(username)): Extension<CurrentUser>,
) -> Result<Redirect, AppError> {
    state.with_store(|store| store.clear(&username))?;
    Ok(dashboard_redirect("message", "All data cleared"))
}

async fn chart(
    State(state): State<SharedState>,
    Extension(CurrentUser(username)): Extension<CurrentUser>,
    Path(file): Path<String>,
) -> Result<Response, AppError> {
    let kind: ChartKind = file.strip_suffix(".svg").unwrap_or(&file).parse()?;
    let table = state.table(&username)?;
    let svg = render_chart(kind, &table, &ChartOptions::default())?;
    Ok(([(header::CONTENT_TYPE, "image/svg+xml")], svg).into_response())
}

fn attachment(bytes: Vec<u8>, content_type: &str, file_name: &str) -> Response {
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        bytes,
    )
        .into_response()
}

async fn report(
    State(state): State<SharedState>,
    Extension(CurrentUser(username)): Extension<CurrentUser>,
    Path(file): Path<String>,
) -> Result<Response, AppError> {
    let (slug, extension) = file.rsplit_once('.').unwrap_or((file.as_str(), "pdf"));
    let kind: ReportKind = slug.parse()?;
    let records = state.records(&username)?;
    let report = build_report(kind, &username, &records);

    match extension {
        "pdf" => Ok(attachment(
            report.render_pdf()?,
            "application/pdf",
            &report.file_name("pdf"),
        )),
        "txt" => Ok(attachment(
            report.render_text().into_bytes(),
            "text/plain; charset=utf-8",
            &report.file_name("txt"),
        )),
        other => Err(AppError::NotFound(format!("report format '{}'", other))),
    }
}

async fn export(
    State(state): State<SharedState>,
    Extension(CurrentUser(username)): Extension<CurrentUser>,
    Path(file): Path<String>,
) -> Result<Response, AppError> {
    let records = state.records(&username)?;
    match file.as_str() {
        "history.csv" => Ok(attachment(
            downloader::to_csv(&records).into_bytes(),
            "text/csv",
            "academic_history.csv",
        )),
        "history.xlsx" => {
            let bytes =
                downloader::to_xlsx(&records).map_err(|e| AppError::Export(e.to_string()))?;
            Ok(attachment(
                bytes,
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
                "academic_history.xlsx",
            ))
        }
        other => Err(AppError::NotFound(other.to_string())),
    }
}

async fn api_upload(
    State(state): State<SharedState>,
    Extension(CurrentUser(username)): Extension<CurrentUser>,
    multipart: Multipart,
) -> Result<Json<serde_json::Value>, AppError> {
    let upload = receive_upload(multipart).await?;
    let saved = save_upload(&state, &username, &upload)?;
    Ok(Json(json!({
        "saved": saved,
        "academic_year": upload.academic_year,
        "semester": upload.semester,
        "rows": upload.rows.len(),
    })))
}

async fn api_preview(multipart: Multipart) -> Result<Json<Vec<SubjectRow>>, AppError> {
    let upload = receive_upload(multipart).await?;
    Ok(Json(upload.rows))
}

async fn api_summary(
    State(state): State<SharedState>,
    Extension(CurrentUser(username)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let table = state.table(&username)?;
    Ok(Json(MetricsEngine::new(&table).summary()))
}

async fn api_subjects(
    State(state): State<SharedState>,
    Extension(CurrentUser(username)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let table = state.table(&username)?;
    Ok(Json(MetricsEngine::new(&table).subject_wise_average()))
}

async fn api_semesters(
    State(state): State<SharedState>,
    Extension(CurrentUser(username)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let table = state.table(&username)?;
    let semesters: Vec<SemesterEntry> = table.records().iter().map(SemesterEntry::from).collect();
    Ok(Json(json!({
        "semesters": semesters,
        "performance": MetricsEngine::new(&table).semester_wise_performance(),
    })))
}

async fn api_delete_semester(
    State(state): State<SharedState>,
    Extension(CurrentUser(username)): Extension<CurrentUser>,
    Query(query): Query<SemesterQuery>,
) -> Result<impl IntoResponse, AppError> {
    let removed = state.with_store(|store| {
        store.delete_semester(&username, &query.academic_year, &query.semester)
    })?;
    Ok(Json(json!({ "removed": removed })))
}

async fn api_clear(
    State(state): State<SharedState>,
    Extension(CurrentUser(username)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let removed = state.with_store(|store| store.clear(&username))?;
    Ok(Json(json!({ "removed": removed })))
}

async fn api_statistics(
    State(state): State<SharedState>,
    Extension(CurrentUser(username)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let table = state.table(&username)?;
    Ok(Json(MetricsEngine::new(&table).statistical_summary()))
}

async fn api_categories(
    State(state): State<SharedState>,
    Extension(CurrentUser(username)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let table = state.table(&username)?;
    Ok(Json(MetricsEngine::new(&table).performance_categories()))
}

async fn api_correlation(
    State(state): State<SharedState>,
    Extension(CurrentUser(username)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let table = state.table(&username)?;
    Ok(Json(json!({
        "ca_ese_correlation": MetricsEngine::new(&table).ca_ese_correlation(),
    })))
}

async fn api_suggestions(
    State(state): State<SharedState>,
    Extension(CurrentUser(username)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let table = state.table(&username)?;
    Ok(Json(MetricsEngine::new(&table).improvement_suggestions()))
}

async fn api_trend(
    State(state): State<SharedState>,
    Extension(CurrentUser(username)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let table = state.table(&username)?;
    Ok(Json(MetricsEngine::new(&table).trend_analysis()))
}

async fn api_patterns(
    State(state): State<SharedState>,
    Extension(CurrentUser(username)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let table = state.table(&username)?;
    Ok(Json(MetricsEngine::new(&table).performance_patterns()))
}

// Comma-separated upload headers, e.g. `CA_Marks,Total`.
fn parse_features(list: &str) -> Result<Vec<Column>, AppError> {
    list.split(',')
        .map(|name| {
            Column::from_header(name)
                .ok_or_else(|| AppError::BadRequest(format!("Unknown feature '{}'", name.trim())))
        })
        .collect()
}

async fn api_clusters(
    State(state): State<SharedState>,
    Extension(CurrentUser(username)): Extension<CurrentUser>,
    Query(query): Query<ClusterQuery>,
) -> Result<impl IntoResponse, AppError> {
    let mut options = ClusterOptions::default();
    if let Some(features) = query.features.as_deref() {
        options.features = parse_features(features)?;
    }
    options.labeling = match query.labeling.as_deref() {
        None | Some("mean-total") => ClusterLabeling::ByMeanTotal,
        Some("positional") => ClusterLabeling::Positional,
        Some(other) => {
            return Err(AppError::BadRequest(format!("Unknown labeling '{}'", other)));
        }
    };

    let table = state.table(&username)?;
    let result = ml::cluster_subjects(&table, &options)?;
    Ok(Json(json!({
        "description": result.describe(),
        "result": result,
    })))
}

async fn api_forecast(
    State(state): State<SharedState>,
    Extension(CurrentUser(username)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let table = state.table(&username)?;
    Ok(Json(ml::forecast_grade_point(&table)?))
}

async fn api_pca(
    State(state): State<SharedState>,
    Extension(CurrentUser(username)): Extension<CurrentUser>,
    Query(query): Query<PcaQuery>,
) -> Result<impl IntoResponse, AppError> {
    let features = match query.features.as_deref() {
        Some(list) => parse_features(list)?,
        None => Column::MARKS.to_vec(),
    };
    let table = state.table(&username)?;
    Ok(Json(ml::pca_analysis(&table, &features)?))
}

async fn api_history(
    State(state): State<SharedState>,
    Extension(CurrentUser(username)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let records = state.records(&username)?;
    Ok(Json(json!({
        "stats": history_stats(&records),
        "records": records,
    })))
}

async fn api_database(State(state): State<SharedState>) -> impl IntoResponse {
    let backend = state.with_store(|store| Ok::<_, StoreError>(store.backend()));
    match backend {
        Ok(backend) => Json(json!({
            "backend": backend,
            "data_dir": state.config.data_dir.display().to_string(),
        }))
        .into_response(),
        Err(e) => AppError::from(e).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::login::{SESSION_COOKIE, SignupForm, register_user};
    use crate::store::{MemoryStore, StoreKind};
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use tower::ServiceExt;

    const BOUNDARY: &str = "XUPLOADBOUNDARY";

    fn state() -> SharedState {
        let config = AppConfig {
            backend: StoreKind::Memory,
            ..AppConfig::default()
        };
        let state = AppState::new(config, Box::new(MemoryStore::new())).unwrap();
        state
            .with_store(|store| {
                register_user(
                    store,
                    &SignupForm {
                        username: "asha".to_string(),
                        password: "pw".to_string(),
                        confirm_password: "pw".to_string(),
                        full_name: "Asha Rao".to_string(),
                        email: "asha@example.com".to_string(),
                    },
                )
            })
            .unwrap();
        Arc::new(state)
    }

    fn cookie(state: &SharedState) -> String {
        format!("{}={}", SESSION_COOKIE, state.sessions.create("asha"))
    }

    fn multipart(year: &str, semester: &str, file_name: &str, content: &str) -> String {
        format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"academic_year\"\r\n\r\n{year}\r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"semester\"\r\n\r\n{semester}\r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n{content}\r\n--{b}--\r\n",
            b = BOUNDARY
        )
    }

    async fn upload(state: &SharedState, semester: &str, file_name: &str, content: &str) -> Response {
        let request = Request::builder()
            .method("POST")
            .uri("/api/upload")
            .header("cookie", cookie(state))
            .header(
                "content-type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(multipart("2024-25", semester, file_name, content)))
            .unwrap();
        router(state.clone()).oneshot(request).await.unwrap()
    }

    async fn get_as_user(state: &SharedState, uri: &str) -> Response {
        let request = Request::builder()
            .uri(uri)
            .header("cookie", cookie(state))
            .body(Body::empty())
            .unwrap();
        router(state.clone()).oneshot(request).await.unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    const SEMESTER_1: &str = "Subject,CA_Marks,ESE_Marks,Lab_Marks,Total,SGPA\n\
                              Math,20,50,0,70,7.5\n\
                              Physics,15,45,10,70,7.5\n";
    const SEMESTER_2: &str = "Subject,CA_Marks,ESE_Marks,Lab_Marks,Total,SGPA\n\
                              Math,22,55,0,77,8.5\n\
                              Physics,18,50,10,78,8.5\n";

    #[tokio::test]
    async fn test_requires_login() {
        let app = router(state());
        let response = app
            .clone()
            .oneshot(Request::builder().uri("/dashboard").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()["location"], "/login");

        let response = app
            .oneshot(Request::builder().uri("/api/summary").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_login_sets_session_cookie() {
        let state = state();
        let request = Request::builder()
            .method("POST")
            .uri("/login")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from("username=asha&password=pw"))
            .unwrap();
        let response = router(state.clone()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()["location"], "/dashboard");
        let set_cookie = response.headers()["set-cookie"].to_str().unwrap();
        assert!(set_cookie.starts_with("session="));

        let request = Request::builder()
            .method("POST")
            .uri("/login")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from("username=asha&password=wrong"))
            .unwrap();
        let response = router(state).oneshot(request).await.unwrap();
        assert!(response.headers()["location"]
            .to_str()
            .unwrap()
            .starts_with("/login?error="));
    }

    #[tokio::test]
    async fn test_upload_then_summary() {
        let state = state();
        let response = upload(&state, "Semester 1", "results.csv", SEMESTER_1).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["rows"], 2);
        upload(&state, "Semester 2", "results.csv", SEMESTER_2).await;

        let summary = body_json(get_as_user(&state, "/api/summary").await).await;
        assert_eq!(summary["average_sgpa"], 8.0);
        assert_eq!(summary["best_semester"], "2024-25 - Semester 2");
        assert_eq!(summary["total_subjects"], 2);

        let categories = body_json(get_as_user(&state, "/api/categories").await).await;
        assert_eq!(categories["medium"], 2);
    }

    #[tokio::test]
    async fn test_bad_upload_is_rejected() {
        let state = state();
        let response = upload(&state, "Semester 1", "results.txt", "hello").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = upload(&state, "Semester 1", "results.csv", "Name,Total\nMath,70\n").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(response).await["error"]
            .as_str()
            .unwrap()
            .contains("Subject"));
    }

    #[tokio::test]
    async fn test_sheet_without_subjects_is_rejected() {
        let state = state();
        let response = upload(&state, "Semester 1", "results.csv", "Subject,Total\n ,50\n,60\n").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(response).await["error"]
            .as_str()
            .unwrap()
            .contains("No subject rows"));

        let request = Request::builder()
            .method("POST")
            .uri("/upload")
            .header("cookie", cookie(&state))
            .header(
                "content-type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(multipart("2024-25", "Semester 1", "results.csv", "Subject,Total\n")))
            .unwrap();
        let response = router(state.clone()).oneshot(request).await.unwrap();
        let location = response.headers()["location"].to_str().unwrap();
        assert!(location.starts_with("/dashboard?error="));
        assert!(state.records("asha").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_analysis_needs_more_data() {
        let state = state();
        upload(&state, "Semester 1", "results.csv", SEMESTER_1).await;

        let response = get_as_user(&state, "/api/clusters").await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let response = get_as_user(&state, "/api/forecast").await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let response = get_as_user(&state, "/api/pca?features=Total").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_downloads() {
        let state = state();
        upload(&state, "Semester 1", "results.csv", SEMESTER_1).await;

        let response = get_as_user(&state, "/charts/sgpa-trend.svg").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "image/svg+xml");

        let response = get_as_user(&state, "/reports/academic-summary.pdf").await;
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(bytes.starts_with(b"%PDF"));

        let response = get_as_user(&state, "/export/history.csv").await;
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&bytes).starts_with("Academic Year,Semester,Subject"));

        let response = get_as_user(&state, "/reports/weekly.pdf").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let state = state();
        upload(&state, "Semester 1", "results.csv", SEMESTER_1).await;
        upload(&state, "Semester 2", "results.csv", SEMESTER_2).await;

        let request = Request::builder()
            .method("DELETE")
            .uri("/api/semesters?academic_year=2024-25&semester=Semester%201")
            .header("cookie", cookie(&state))
            .body(Body::empty())
            .unwrap();
        let response = router(state.clone()).oneshot(request).await.unwrap();
        assert_eq!(body_json(response).await["removed"], true);

        let history = body_json(get_as_user(&state, "/api/history").await).await;
        assert_eq!(history["stats"]["total_records"], 1);

        let request = Request::builder()
            .method("DELETE")
            .uri("/api/results")
            .header("cookie", cookie(&state))
            .body(Body::empty())
            .unwrap();
        let response = router(state.clone()).oneshot(request).await.unwrap();
        assert_eq!(body_json(response).await["removed"], true);
        assert!(state.records("asha").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pages_render() {
        let state = state();
        let response = router(state.clone())
            .oneshot(Request::builder().uri("/login").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = get_as_user(&state, "/dashboard").await;
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&bytes).contains("Asha Rao"));
    }

    #[test]
    fn test_history_stats() {
        let records = vec![
            SemesterRecord::create(
                "2023-24",
                "Semester 1",
                vec![SubjectRow::create("Math"), SubjectRow::create("Physics")],
            ),
            SemesterRecord::create("2024-25", "Semester 1", vec![SubjectRow::create("Math")]),
        ];
        assert_eq!(
            history_stats(&records),
            HistoryStats {
                total_records: 2,
                total_subjects: 2,
                semesters_completed: 1,
            }
        );
    }
}
