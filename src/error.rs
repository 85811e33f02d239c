use thiserror::Error;

/// Failures surfaced by the upload, job-progress and product-query flows.
///
/// Each variant is terminal only for its own submission, subscription or
/// query generation. Record parse failures never abort a stream; they are
/// reported and the line is skipped.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("upload failed: {0}")]
    UploadFailed(String),

    #[error("job subscription failed: {0}")]
    Subscription(String),

    #[error("skipped malformed record line {line:?}: {reason}")]
    RecordParse { line: String, reason: String },

    #[error("product query failed: {0}")]
    QueryTransport(String),

    #[error("status update for product {id} failed: {reason}")]
    StatusUpdate { id: i64, reason: String },
}

/// Pull a human readable reason out of a non-success response body.
///
/// The backend answers errors as `{"error": "..."}`; anything else falls back
/// to the status line.
pub fn error_reason(status: reqwest::StatusCode, body: &str) -> String {
    #[derive(serde::Deserialize)]
    struct ErrorBody {
        error: Option<String>,
    }

    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
        .unwrap_or_else(|| status.to_string())
}
