use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::{delete, get, post, put},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower_http::services::ServeDir;

use crate::config::{Backend, Config};
use crate::document::{CellValue, ColumnTotal, Document, ModelError};
use crate::store::{DocumentStore, DriveStore, LocalStore};
use crate::workbook::{SyncError, Workbook, WorkbookOptions};

/// Store shared between handlers.
pub type SharedStore = Arc<dyn DocumentStore>;

pub struct AppState {
    local: LocalStore,
    drive: Option<SharedStore>,
    workbook: Mutex<Workbook<SharedStore>>,
}

impl AppState {
    pub fn new(local: LocalStore, drive: Option<SharedStore>, workbook: Workbook<SharedStore>) -> Self {
        AppState {
            local,
            drive,
            workbook: Mutex::new(workbook),
        }
    }
}

#[derive(Deserialize)]
struct NameBody {
    name: String,
}

#[derive(Deserialize)]
struct CellBody {
    value: CellValue,
}

#[derive(Deserialize)]
struct ActiveTabBody {
    index: usize,
}

#[derive(Serialize)]
struct WorkbookView<'a> {
    document: &'a Document,
    active_tab: usize,
    saved: bool,
    autosave: bool,
    load_error: Option<&'a str>,
}

fn view(workbook: &Workbook<SharedStore>) -> Response {
    Json(WorkbookView {
        document: workbook.document(),
        active_tab: workbook.active_tab(),
        saved: workbook.is_saved(),
        autosave: workbook.options().autosave_on_mutation,
        load_error: workbook.load_failure(),
    })
    .into_response()
}

fn error_body(status: StatusCode, error: &str, details: Option<String>) -> Response {
    let body = match details {
        Some(details) => json!({ "error": error, "details": details }),
        None => json!({ "error": error }),
    };
    (status, Json(body)).into_response()
}

/// Workbook failure turned into an HTTP response.
pub struct ApiError(SyncError);

impl From<SyncError> for ApiError {
    fn from(e: SyncError) -> Self {
        ApiError(e)
    }
}

impl From<ModelError> for ApiError {
    fn from(e: ModelError) -> Self {
        ApiError(SyncError::Model(e))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self.0 {
            SyncError::Model(e) => {
                let status = match e {
                    ModelError::UnknownTab { .. } | ModelError::UnknownColumn { .. } => {
                        StatusCode::NOT_FOUND
                    }
                    ModelError::DuplicateTab { .. } => StatusCode::CONFLICT,
                    ModelError::EmptyName { .. } => StatusCode::BAD_REQUEST,
                };
                error_body(status, &e.to_string(), None)
            }
            SyncError::LoadFailed { source, .. } => {
                log::error!("{}", self.0);
                error_body(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to read data",
                    Some(source.to_string()),
                )
            }
            SyncError::LoadPending { .. } => {
                log::warn!("{}", self.0);
                error_body(
                    StatusCode::CONFLICT,
                    "Failed to save data",
                    Some(self.0.to_string()),
                )
            }
            SyncError::SaveFailed { source, .. } => {
                log::error!("{}", self.0);
                error_body(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to save data",
                    Some(source.to_string()),
                )
            }
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(serve_index))
        .route("/api/driveData", get(get_drive_data).post(post_drive_data))
        .route("/api/saveData", get(get_save_data).post(post_save_data))
        .route("/api/workbook", get(get_workbook))
        .route("/api/workbook/save", post(save_workbook))
        .route("/api/workbook/reload", post(reload_workbook))
        .route("/api/active_tab", put(set_active_tab))
        .route("/api/tabs", post(add_tab))
        .route("/api/tabs/:tab", delete(delete_tab))
        .route("/api/tabs/:tab/rows", post(add_row))
        .route("/api/tabs/:tab/rows/:index", delete(delete_row))
        .route("/api/tabs/:tab/rows/:index/:field", put(update_cell))
        .route("/api/tabs/:tab/columns", post(add_column))
        .route("/api/tabs/:tab/columns/:name", delete(delete_column))
        .route("/api/tabs/:tab/totals", get(column_totals))
        .nest_service("/static", ServeDir::new("static"))
        .with_state(state)
}

pub async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let local = LocalStore::new(&config.data_file);

    let drive: Option<SharedStore> = match config.service_account() {
        Some(account) => {
            let store: SharedStore = Arc::new(DriveStore::connect(account, config.drive_settings())?);
            Some(store)
        }
        None => {
            log::warn!("GOOGLE_CLIENT_EMAIL or GOOGLE_PRIVATE_KEY not set; Drive endpoints will fail");
            None
        }
    };

    let session_store: SharedStore = match config.backend {
        Backend::Local => Arc::new(local.clone()),
        Backend::Drive => drive
            .clone()
            .ok_or("Drive backend selected but Google credentials are missing")?,
    };
    let options = WorkbookOptions {
        autosave_on_mutation: config.autosave,
    };
    let (workbook, load_error) = Workbook::open(session_store, options).await;
    if let Some(e) = load_error {
        if workbook.load_failure().is_some() {
            log::error!("{e}; saving is disabled until the document is reloaded");
        } else {
            log::warn!("{e}; starting from an empty document");
        }
    }
    log::info!(
        "Workbook opened on {} with {} tab(s), autosave {}",
        workbook.store().describe(),
        workbook.document().len(),
        if options.autosave_on_mutation { "on" } else { "off" }
    );

    let app = router(Arc::new(AppState::new(local, drive, workbook)));

    let listener = TcpListener::bind(config.bind).await?;
    println!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn serve_index() -> Html<&'static str> {
    Html(include_str!("./static/index.html"))
}

fn parse_document(body: &Bytes) -> Result<Document, Response> {
    serde_json::from_slice(body).map_err(|e| {
        log::warn!("Rejected document body: {e}");
        error_body(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to save data",
            Some(e.to_string()),
        )
    })
}

async fn get_drive_data(State(state): State<Arc<AppState>>) -> Response {
    let Some(drive) = &state.drive else {
        log::error!("Drive data requested but Drive is not configured");
        return error_body(StatusCode::INTERNAL_SERVER_ERROR, "Failed to read data", None);
    };

    match drive.load().await {
        Ok(document) => Json(document).into_response(),
        Err(e) if e.is_malformed() => {
            log::warn!("Remote document is not valid, serving an empty one: {e}");
            Json(Document::new()).into_response()
        }
        Err(e) => {
            log::error!("Error fetching data from {}: {e}", drive.describe());
            error_body(StatusCode::INTERNAL_SERVER_ERROR, "Failed to read data", None)
        }
    }
}

async fn post_drive_data(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let Some(drive) = &state.drive else {
        return error_body(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to save data",
            Some("Drive is not configured".to_string()),
        );
    };
    let document = match parse_document(&body) {
        Ok(document) => document,
        Err(response) => return response,
    };

    match drive.save(&document).await {
        Ok(()) => {
            log::info!("Saved {} tab(s) to {}", document.len(), drive.describe());
            Json(json!({ "message": "Data successfully saved to Google Drive" })).into_response()
        }
        Err(e) => {
            log::error!("Error saving data to {}: {e}", drive.describe());
            error_body(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to save data",
                Some(e.to_string()),
            )
        }
    }
}

async fn get_save_data(State(state): State<Arc<AppState>>) -> Response {
    match state.local.read_raw().await {
        Ok(content) => ([(header::CONTENT_TYPE, "application/json")], content).into_response(),
        Err(e) => {
            log::error!("Error reading {}: {e}", state.local.describe());
            error_body(StatusCode::INTERNAL_SERVER_ERROR, "Failed to read data", None)
        }
    }
}

async fn post_save_data(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let document = match parse_document(&body) {
        Ok(document) => document,
        Err(response) => return response,
    };

    match state.local.save(&document).await {
        Ok(()) => Json(json!({ "message": "Data successfully saved!" })).into_response(),
        Err(e) => {
            log::error!("Error writing {}: {e}", state.local.describe());
            error_body(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to save data",
                Some(e.to_string()),
            )
        }
    }
}

async fn get_workbook(State(state): State<Arc<AppState>>) -> Response {
    let workbook = state.workbook.lock().await;
    view(&workbook)
}

async fn save_workbook(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let mut workbook = state.workbook.lock().await;
    workbook.persist().await?;
    Ok(view(&workbook))
}

async fn reload_workbook(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let mut workbook = state.workbook.lock().await;
    workbook.reload().await?;
    Ok(view(&workbook))
}

async fn set_active_tab(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ActiveTabBody>,
) -> Response {
    let mut workbook = state.workbook.lock().await;
    if !workbook.set_active_tab(body.index) {
        return error_body(
            StatusCode::BAD_REQUEST,
            &format!("No tab at position {}", body.index),
            None,
        );
    }
    view(&workbook)
}

async fn add_tab(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NameBody>,
) -> Result<Response, ApiError> {
    let mut workbook = state.workbook.lock().await;
    workbook.add_tab(&body.name).await?;
    Ok((StatusCode::CREATED, view(&workbook)).into_response())
}

async fn delete_tab(
    State(state): State<Arc<AppState>>,
    Path(tab): Path<String>,
) -> Result<Response, ApiError> {
    let mut workbook = state.workbook.lock().await;
    workbook.delete_tab(&tab).await?;
    Ok(view(&workbook))
}

async fn add_row(
    State(state): State<Arc<AppState>>,
    Path(tab): Path<String>,
) -> Result<Response, ApiError> {
    let mut workbook = state.workbook.lock().await;
    workbook.add_row(&tab).await?;
    Ok((StatusCode::CREATED, view(&workbook)).into_response())
}

async fn delete_row(
    State(state): State<Arc<AppState>>,
    Path((tab, index)): Path<(String, usize)>,
) -> Result<Response, ApiError> {
    let mut workbook = state.workbook.lock().await;
    workbook.delete_row(&tab, index).await?;
    Ok(view(&workbook))
}

async fn update_cell(
    State(state): State<Arc<AppState>>,
    Path((tab, index, field)): Path<(String, usize, String)>,
    Json(body): Json<CellBody>,
) -> Result<Response, ApiError> {
    let mut workbook = state.workbook.lock().await;
    workbook.update_cell(&tab, index, &field, body.value)?;
    Ok(view(&workbook))
}

async fn add_column(
    State(state): State<Arc<AppState>>,
    Path(tab): Path<String>,
    Json(body): Json<NameBody>,
) -> Result<Response, ApiError> {
    let mut workbook = state.workbook.lock().await;
    workbook.add_column(&tab, &body.name).await?;
    Ok((StatusCode::CREATED, view(&workbook)).into_response())
}

async fn delete_column(
    State(state): State<Arc<AppState>>,
    Path((tab, name)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let mut workbook = state.workbook.lock().await;
    workbook.delete_column(&tab, &name).await?;
    Ok(view(&workbook))
}

async fn column_totals(
    State(state): State<Arc<AppState>>,
    Path(tab): Path<String>,
) -> Result<Json<Vec<ColumnTotal>>, ApiError> {
    let workbook = state.workbook.lock().await;
    Ok(Json(workbook.document().column_totals(&tab)?))
}
