//! Handler serving the bound session file.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::header::{ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, RETRY_AFTER};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use reelway_core::session::{AvailabilityError, ByteRange};
use tracing::{debug, warn};

use super::range::{RangeSpec, extract_range_header, parse_range_header};
use crate::server::ServerState;
use crate::streaming::{GatedReader, open_at};

/// Failures turned into HTTP statuses by the range server.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("No file is bound to the server")]
    NotBound,

    #[error("Requested range outside {total_size} byte file")]
    RangeNotSatisfiable { total_size: u64 },

    #[error("Data unavailable: {0}")]
    Unavailable(#[from] AvailabilityError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl IntoResponse for StreamError {
    fn into_response(self) -> Response {
        match self {
            StreamError::NotBound => (StatusCode::NOT_FOUND, "No stream is bound").into_response(),
            StreamError::RangeNotSatisfiable { total_size } => (
                StatusCode::RANGE_NOT_SATISFIABLE,
                [
                    (CONTENT_RANGE, format!("bytes */{total_size}")),
                    (ACCEPT_RANGES, "bytes".to_string()),
                ],
            )
                .into_response(),
            StreamError::Unavailable(e) => {
                debug!("Responding 503: {}", e);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    [(RETRY_AFTER, "1")],
                    e.to_string(),
                )
                    .into_response()
            }
            StreamError::Io(e) => {
                warn!("Failed to read bound file: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

/// Serves the bound file, honouring single byte ranges.
///
/// Waits for the first chunk of the requested range before answering, so a
/// range that never becomes available is reported as `503` instead of a
/// truncated success. HEAD requests get headers without waiting.
pub async fn stream_bound_file(
    State(state): State<Arc<ServerState>>,
    method: Method,
    headers: HeaderMap,
) -> Response {
    match serve(&state, &method, &headers).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}

async fn serve(
    state: &ServerState,
    method: &Method,
    headers: &HeaderMap,
) -> Result<Response, StreamError> {
    let binding = state.current_binding().ok_or(StreamError::NotBound)?;
    let total_size = binding.total_size;
    let spec = parse_range_header(extract_range_header(headers), total_size);

    let (status, range) = match spec {
        RangeSpec::Full => (
            StatusCode::OK,
            total_size.checked_sub(1).map(|last| ByteRange::new(0, last)),
        ),
        RangeSpec::Partial(range) => (StatusCode::PARTIAL_CONTENT, Some(range)),
        RangeSpec::Unsatisfiable => {
            return Err(StreamError::RangeNotSatisfiable { total_size });
        }
    };

    let content_type = mime_guess::from_path(&binding.path)
        .first_raw()
        .unwrap_or(state.config.content_type_fallback);
    let content_length = range.map_or(0, |r| r.len());

    let mut response = axum::http::Response::builder()
        .status(status)
        .header(CONTENT_TYPE, content_type)
        .header(ACCEPT_RANGES, "bytes")
        .header(CONTENT_LENGTH, content_length);
    if let RangeSpec::Partial(range) = spec {
        response = response.header(
            CONTENT_RANGE,
            format!("bytes {}-{}/{}", range.start, range.end, total_size),
        );
    }

    let body = match range {
        Some(range) if *method != Method::HEAD => {
            debug!(
                "Serving bytes {}-{}/{} of {}",
                range.start,
                range.end,
                total_size,
                binding.path.display()
            );
            let reader = GatedReader::new(
                binding.clone(),
                open_at(&binding, range.start).await?,
                range,
                state.config.chunk_size,
                state.config.availability_timeout,
            );
            if let Some(first) = reader.next_chunk_range() {
                binding
                    .wait_for_range(first, state.config.availability_timeout)
                    .await?;
            }
            reader.into_body()
        }
        _ => Body::empty(),
    };

    response.body(body).map_err(|e| {
        StreamError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    })
}
