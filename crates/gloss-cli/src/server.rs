//! HTTP routes and handlers for `gloss serve`.

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use gloss_core::{Error, ExtractRequest, Mode, ReadingLevel};
use gloss_local::explain::{ExplainInput, Explainer};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Multipart framing overhead allowed on top of the upload limit.
const FORM_SLACK_BYTES: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub explainer: Arc<Explainer>,
    pub max_upload_bytes: usize,
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let body_limit = state.max_upload_bytes.saturating_add(FORM_SLACK_BYTES);

    Router::new()
        .route("/health", get(health))
        .route("/api/explain", post(explain))
        .route("/api/locate", post(locate))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("upload exceeds {0} bytes")]
    PayloadTooLarge(usize),
    #[error(transparent)]
    Core(#[from] Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Core(e) => match e {
                Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
                Error::Extraction(_) => StatusCode::UNPROCESSABLE_ENTITY,
                Error::NotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
                Error::Llm(_) => StatusCode::BAD_GATEWAY,
                Error::Cache(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "request rejected");
        }
        let body = Json(serde_json::json!({
            "ok": false,
            "error": self.to_string(),
        }));
        (status, body).into_response()
    }
}

#[derive(Serialize)]
struct ApiOk<T> {
    ok: bool,
    #[serde(flatten)]
    body: T,
}

fn ok<T: Serialize>(body: T) -> Json<ApiOk<T>> {
    Json(ApiOk { ok: true, body })
}

// =============================================================================
// Form parsing
// =============================================================================

#[derive(Debug, Default)]
struct UploadForm {
    document: Option<ExtractRequest>,
    highlight: Option<String>,
    mode: Option<String>,
    level: Option<String>,
}

impl UploadForm {
    fn take_document(&mut self) -> Result<ExtractRequest, ApiError> {
        self.document
            .take()
            .ok_or_else(|| ApiError::BadRequest("missing form field: file".to_string()))
    }

    fn take_highlight(&mut self) -> Result<String, ApiError> {
        self.highlight
            .take()
            .ok_or_else(|| ApiError::BadRequest("missing form field: highlight".to_string()))
    }

    fn mode(&self) -> Result<Mode, ApiError> {
        match self.mode.as_deref().map(str::trim) {
            None | Some("") => Ok(Mode::default()),
            Some(s) => Ok(s.parse()?),
        }
    }

    fn level(&self) -> Result<ReadingLevel, ApiError> {
        match self.level.as_deref().map(str::trim) {
            None | Some("") => Ok(ReadingLevel::default()),
            Some(s) => Ok(s.parse()?),
        }
    }
}

/// The request body limit surfaces as a multipart stream error; keep it a 413.
fn bad_multipart(e: axum::extract::multipart::MultipartError, max_upload_bytes: usize) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return ApiError::PayloadTooLarge(max_upload_bytes);
    }
    ApiError::BadRequest(format!("invalid multipart body: {e}"))
}

async fn read_form(mut mp: Multipart, max_upload_bytes: usize) -> Result<UploadForm, ApiError> {
    let mut form = UploadForm::default();
    let multipart_err = |e| bad_multipart(e, max_upload_bytes);
    while let Some(field) = mp.next_field().await.map_err(multipart_err)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let content_type = field.content_type().map(str::to_string);
                let filename = field.file_name().map(str::to_string);
                let bytes = field.bytes().await.map_err(multipart_err)?;
                if bytes.len() > max_upload_bytes {
                    return Err(ApiError::PayloadTooLarge(max_upload_bytes));
                }
                if bytes.is_empty() {
                    return Err(ApiError::BadRequest("uploaded file is empty".to_string()));
                }
                form.document = Some(ExtractRequest {
                    bytes: bytes.to_vec(),
                    content_type,
                    filename,
                });
            }
            "highlight" => form.highlight = Some(field.text().await.map_err(multipart_err)?),
            "mode" => form.mode = Some(field.text().await.map_err(multipart_err)?),
            "level" | "reading_level" => {
                form.level = Some(field.text().await.map_err(multipart_err)?)
            }
            // Unknown fields are ignored.
            _ => {}
        }
    }
    Ok(form)
}

// =============================================================================
// Handlers
// =============================================================================

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "ok": true,
        "name": "gloss",
        "version": env!("CARGO_PKG_VERSION"),
        "generator": state.explainer.generator_name(),
    }))
}

async fn explain(
    State(state): State<Arc<AppState>>,
    mp: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut form = read_form(mp, state.max_upload_bytes).await?;
    let input = ExplainInput {
        mode: form.mode()?,
        level: form.level()?,
        highlight: form.take_highlight()?,
        document: form.take_document()?,
    };
    let out = state.explainer.explain(&input).await?;
    tracing::info!(
        found = out.found,
        outcome = out.outcome.as_str(),
        provider = %out.provider,
        mode = %out.mode,
        "explained highlight"
    );
    Ok(ok(out))
}

async fn locate(
    State(state): State<Arc<AppState>>,
    mp: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut form = read_form(mp, state.max_upload_bytes).await?;
    let highlight = form.take_highlight()?;
    let document = form.take_document()?;
    let out = state.explainer.locate(&document, &highlight).await?;
    Ok(ok(out))
}
