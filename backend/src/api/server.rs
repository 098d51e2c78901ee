//! HTTP Server for the fieldmap API.
//!
//! # API Endpoints
//!
//! | Method | Path              | Description                                   |
//! |--------|-------------------|-----------------------------------------------|
//! | GET    | `/health`         | Health check                                  |
//! | GET    | `/api/fields`     | Default target fields and rule tables         |
//! | POST   | `/api/calculate`  | Upload CSV + mapping, get the calculated table|
//! | POST   | `/api/export`     | Same inputs, get the semicolon CSV download   |
//! | GET    | `/api/logs`       | SSE stream for real-time logs                 |
//!
//! Multipart fields for the POST endpoints: `file` (required), `mapping`
//! (JSON object field -> column), `mode` (`position` or `rules`) and
//! `fields` (target field list, one per line or JSON array). Without
//! `mapping` and `mode` the rule-based auto-map is used.

use axum::{
    extract::{Multipart, State},
    http::{header, Method, StatusCode},
    response::{sse::Event, IntoResponse, Json, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;

use super::logs::{log_error, log_info, LOG_BROADCASTER};
use super::types::{error_response, CalculateResponse, FieldsResponse};
use crate::config::{parse_fields, AppConfig};
use crate::error::{CalculationError, CsvError, InputError, ServerError, ServerResult, SessionError};
use crate::export::{delimited_bytes, DelimitedOptions};
use crate::models::TargetFieldSet;
use crate::session::{AutoMapMode, CsvInfo, Session};
use crate::transform::mapping::MappingTable;
use crate::transform::progress::{CancelToken, LogProgress};

type ApiError = (StatusCode, Json<Value>);

/// Shared server state
struct AppState {
    config: AppConfig,
}

/// Inputs of a calculate or export request
#[derive(Debug, Default)]
struct CalculateRequest {
    file_name: Option<String>,
    bytes: Vec<u8>,
    mapping: Option<MappingTable>,
    mode: Option<AutoMapMode>,
    fields: Option<TargetFieldSet>,
}

impl ServerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Session(SessionError::Csv(CsvError::IoError(_))) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ServerError::Session(
                SessionError::Csv(_)
                | SessionError::Input(_)
                | SessionError::Calculation(CalculationError::Input(_)),
            ) => StatusCode::BAD_REQUEST,
            ServerError::Session(SessionError::Calculation(CalculationError::Cancelled)) => {
                StatusCode::CONFLICT
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ServerError> for ApiError {
    fn from(err: ServerError) -> Self {
        log_error(err.to_string());
        (err.status_code(), Json(error_response(&err.to_string())))
    }
}

/// Build the router
pub fn router(config: AppConfig) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE, header::CONTENT_DISPOSITION]);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/fields", get(fields))
        .route("/api/calculate", post(calculate_csv))
        .route("/api/export", post(export_csv))
        .route("/api/logs", get(sse_logs))
        .layer(cors)
        .with_state(Arc::new(AppState { config }))
}

/// Start the HTTP server
pub async fn start_server(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let port = config.port;
    let app = router(config);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    println!("Fieldmap server running on http://localhost:{}", port);
    println!("   GET  /api/fields    - Default fields and rules");
    println!("   POST /api/calculate - Upload CSV and calculate");
    println!("   POST /api/export    - Upload CSV and download the mapped CSV");
    println!("   GET  /api/logs      - SSE log stream");
    println!("   GET  /health        - Health check");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check endpoint
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "fieldmap",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "fields": "GET /api/fields",
            "calculate": "POST /api/calculate",
            "export": "POST /api/export",
            "logs": "GET /api/logs (SSE)"
        }
    }))
}

async fn fields(State(state): State<Arc<AppState>>) -> Result<Json<FieldsResponse>, ApiError> {
    let fields = state
        .config
        .target_fields()
        .map_err(|e| ServerError::Session(e.into()))?;
    let auto_map_rules = state
        .config
        .auto_map_rules()
        .map_err(|e| ServerError::Session(e.into()))?;
    let extraction_rules = state
        .config
        .extraction_rules()
        .map_err(|e| ServerError::Session(e.into()))?;

    Ok(Json(FieldsResponse {
        fields,
        auto_map_rules,
        extraction_rules,
    }))
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(entry) => {
            let json = serde_json::to_string(&entry).ok()?;
            Some(Ok(Event::default().data(json)))
        }
        // lagged receivers skip what they missed
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

async fn read_request(mut multipart: Multipart) -> ServerResult<CalculateRequest> {
    let mut request = CalculateRequest::default();
    let mut has_file = false;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(format!("Multipart error: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                request.file_name = field.file_name().map(|s| s.to_string());
                request.bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ServerError::BadRequest(format!("Read error: {}", e)))?
                    .to_vec();
                has_file = true;
            }
            "mapping" | "mode" | "fields" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ServerError::BadRequest(format!("Read error: {}", e)))?;
                if text.trim().is_empty() {
                    continue;
                }
                match name.as_str() {
                    "mapping" => {
                        request.mapping = Some(serde_json::from_str(&text).map_err(|e| {
                            ServerError::BadRequest(format!("Invalid mapping JSON: {}", e))
                        })?)
                    }
                    "mode" => {
                        request.mode = Some(text.parse().map_err(ServerError::BadRequest)?)
                    }
                    _ => {
                        request.fields = Some(
                            parse_fields(&text)
                                .map_err(|e| ServerError::BadRequest(e.to_string()))?,
                        )
                    }
                }
            }
            _ => {}
        }
    }

    if !has_file {
        return Err(ServerError::BadRequest("No file provided".to_string()));
    }
    Ok(request)
}

/// Build a session from the request and calculate on a blocking thread.
async fn run_calculation(config: &AppConfig, request: CalculateRequest) -> ServerResult<(Session, CsvInfo)> {
    log_info(format!(
        "New upload: {} ({} bytes)",
        request.file_name.as_deref().unwrap_or("unknown"),
        request.bytes.len()
    ));

    let mut session = Session::from_config(config)?;
    tokio::task::spawn_blocking(move || -> ServerResult<(Session, CsvInfo)> {
        if let Some(fields) = request.fields {
            session.set_fields(fields);
        }
        let info = session.load_bytes(&request.bytes)?;

        match (request.mode, request.mapping) {
            (mode, Some(mapping)) => {
                if let Some(mode) = mode {
                    session.auto_map(mode)?;
                }
                // explicit entries override the auto-mapped ones
                for entry in mapping.iter() {
                    session.set_mapping(&entry.target, &entry.source)?;
                }
            }
            (Some(mode), None) => {
                session.auto_map(mode)?;
            }
            (None, None) => {
                session.auto_map(AutoMapMode::Rules)?;
            }
        }

        if session.mapping().is_empty() {
            return Err(SessionError::from(InputError::EmptyMapping).into());
        }
        session.calculate(&LogProgress, &CancelToken::new())?;
        Ok((session, info))
    })
    .await
    .map_err(|e| ServerError::Internal(format!("Calculation task failed: {}", e)))?
}

async fn calculate_csv(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<CalculateResponse>, ApiError> {
    let request = read_request(multipart).await?;
    let (session, info) = run_calculation(&state.config, request).await?;

    let response = CalculateResponse::from_session(&session, info)
        .ok_or_else(|| ServerError::Internal("No calculated table".to_string()))?;
    Ok(Json(response))
}

async fn export_csv(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let request = read_request(multipart).await?;
    let (session, _) = run_calculation(&state.config, request).await?;

    let table = session
        .calculated()
        .ok_or_else(|| ServerError::Internal("No calculated table".to_string()))?;
    let bytes = delimited_bytes(table, &DelimitedOptions::default())
        .map_err(|e| ServerError::Session(e.into()))?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"mapped.csv\""),
        ],
        bytes,
    ))
}
