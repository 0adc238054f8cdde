//! HTTP surface for the proposal analyzer.
//!
//! - `POST /analyze/` – Multipart upload with a required `file` field and an optional
//!   `custom_questions` field (JSON array of strings). Returns `{status, records, error?}`.
//! - `GET /` – Liveness check.
//! - `GET /metrics` – Analysis counters since startup.
//!
//! Status codes follow the error classification: 200 on success, 400 for caller-input errors,
//! 500 for provider and internal errors.

use crate::processing::{
    AnalysisApi, AnalysisError, AnalysisResult, ErrorKind, QuestionSet, UploadedFile,
};
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::Instrument;
use uuid::Uuid;

/// Build the HTTP router exposing the analysis API surface.
pub fn create_router<S>(service: Arc<S>, max_upload_bytes: usize) -> Router
where
    S: AnalysisApi + 'static,
{
    Router::new()
        .route("/", get(health))
        .route(
            "/analyze/",
            post(analyze_document::<S>).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/metrics", get(get_metrics::<S>))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

/// Analyze an uploaded document.
///
/// The whole request runs inside a span carrying a fresh request id and, once known, the
/// uploaded filename.
async fn analyze_document<S>(State(service): State<Arc<S>>, multipart: Multipart) -> Response
where
    S: AnalysisApi,
{
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!(
        "analyze",
        request_id = %request_id,
        filename = tracing::field::Empty
    );

    async move {
        let (file, questions) = match read_upload(multipart).await {
            Ok(parts) => parts,
            Err(error) => {
                tracing::warn!(code = error.code(), error = %error, "Rejected upload");
                return AppError(error).into_response();
            }
        };
        tracing::Span::current().record("filename", file.filename.as_str());
        tracing::info!(
            bytes = file.bytes.len(),
            content_type = file.content_type.as_deref(),
            custom_questions = questions.as_ref().map(QuestionSet::len),
            "Analysis request received"
        );

        let result = service.analyze(file, questions).await;
        let status = result
            .error
            .as_ref()
            .map_or(StatusCode::OK, |error| status_for(error.kind));
        (status, Json(result)).into_response()
    }
    .instrument(span)
    .await
}

/// Pull the `file` and `custom_questions` fields out of the multipart body.
///
/// Unknown fields are ignored. A blank `custom_questions` value counts as absent.
async fn read_upload(
    mut multipart: Multipart,
) -> Result<(UploadedFile, Option<QuestionSet>), AnalysisError> {
    let mut file = None;
    let mut raw_questions = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|error| AnalysisError::InvalidRequest(error.body_text()))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|error| AnalysisError::InvalidRequest(error.body_text()))?;
                file = Some(UploadedFile {
                    filename,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            }
            Some("custom_questions") => {
                let text = field
                    .text()
                    .await
                    .map_err(|error| AnalysisError::InvalidRequest(error.body_text()))?;
                raw_questions = Some(text);
            }
            _ => {}
        }
    }

    let file = file.ok_or(AnalysisError::MissingFile)?;
    let questions = match raw_questions {
        Some(raw) if !raw.trim().is_empty() => QuestionSet::parse_custom(&raw)?,
        _ => None,
    };
    Ok((file, questions))
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Input => StatusCode::BAD_REQUEST,
        ErrorKind::Provider | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Return the analysis counters accumulated since startup.
async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<crate::metrics::MetricsSnapshot>
where
    S: AnalysisApi,
{
    Json(service.metrics_snapshot())
}

struct AppError(AnalysisError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = status_for(self.0.kind());
        (status, Json(AnalysisResult::failure(&self.0, None))).into_response()
    }
}
