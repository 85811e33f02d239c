use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::Body;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::io::ReaderStream;

use crate::error::ClientError;
use crate::http::ApiClient;

mod progress;

use progress::UploadTask;

const UPLOAD_PATH: &str = "/products/upload/";
const FORM_FIELD: &str = "file";

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default, alias = "task_id")]
    job_id: Option<Value>,
}

impl UploadResponse {
    fn into_job_id(self) -> Option<String> {
        match self.job_id? {
            Value::String(id) if !id.trim().is_empty() => Some(id),
            Value::Number(id) => Some(id.to_string()),
            _ => None,
        }
    }
}

/// clap value parser for the file argument: an existing `.csv` file.
pub fn parse_csv_path(raw: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(raw);
    let is_csv = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
    if !is_csv {
        return Err(format!("{raw} is not a .csv file"));
    }
    if !path.is_file() {
        return Err(format!("{raw} does not exist"));
    }
    Ok(path)
}

/// Send `path` as one multipart upload and return the server-assigned job id.
///
/// `on_progress` receives 0 first, then every time the rounded percent of
/// bytes handed to the transport moves forward.
pub async fn submit<F>(
    client: &ApiClient,
    path: &Path,
    mut on_progress: F,
) -> Result<String, ClientError>
where
    F: FnMut(u8),
{
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|e| ClientError::UploadFailed(format!("cannot open {}: {e}", path.display())))?;
    let total_bytes = file
        .metadata()
        .await
        .map_err(|e| ClientError::UploadFailed(format!("cannot stat {}: {e}", path.display())))?
        .len();
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload.csv".to_string());

    let mut task = UploadTask::new(total_bytes);
    on_progress(task.start());

    let (sent_tx, mut sent_rx) = mpsc::unbounded_channel::<u64>();
    let body = ReaderStream::new(file).map(move |chunk| {
        if let Ok(bytes) = &chunk {
            let _ = sent_tx.send(bytes.len() as u64);
        }
        chunk
    });
    let part = Part::stream_with_length(Body::wrap_stream(body), total_bytes)
        .file_name(file_name)
        .mime_str("text/csv")
        .map_err(|e| ClientError::UploadFailed(e.to_string()))?;
    let form = Form::new().part(FORM_FIELD, part);

    tracing::debug!(path = %path.display(), total_bytes, "starting upload");
    let request = client.post_multipart::<UploadResponse>(UPLOAD_PATH, form);
    tokio::pin!(request);

    let outcome = loop {
        tokio::select! {
            Some(len) = sent_rx.recv() => {
                if let Some(percent) = task.advance(len) {
                    on_progress(percent);
                }
            }
            outcome = &mut request => break outcome,
        }
    };
    while let Ok(len) = sent_rx.try_recv() {
        if let Some(percent) = task.advance(len) {
            on_progress(percent);
        }
    }

    let response = outcome.map_err(|e| ClientError::UploadFailed(format!("{e:#}")))?;
    let job_id = response
        .into_job_id()
        .ok_or_else(|| ClientError::UploadFailed("missing job id in response".to_string()))?;

    if let Some(percent) = task.finish() {
        on_progress(percent);
    }
    tracing::info!(job_id = %job_id, bytes = task.bytes_sent(), "upload accepted");
    Ok(job_id)
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn write_catalog(dir: &Path, rows: usize) -> PathBuf {
        let mut contents = String::from("sku,name,description\n");
        for i in 0..rows {
            contents.push_str(&format!("sku-{i:06},Product {i},Nightly feed row\n"));
        }
        let csv = dir.join("catalog.csv");
        std::fs::write(&csv, contents).unwrap();
        csv
    }

    #[test]
    fn job_id_accepts_alias_and_numbers() {
        let r: UploadResponse = serde_json::from_str(r#"{"job_id":"42"}"#).unwrap();
        assert_eq!(r.into_job_id().as_deref(), Some("42"));

        let r: UploadResponse = serde_json::from_str(r#"{"task_id":"abc"}"#).unwrap();
        assert_eq!(r.into_job_id().as_deref(), Some("abc"));

        let r: UploadResponse = serde_json::from_str(r#"{"job_id":7}"#).unwrap();
        assert_eq!(r.into_job_id().as_deref(), Some("7"));

        let r: UploadResponse = serde_json::from_str(r#"{"status":"queued"}"#).unwrap();
        assert_eq!(r.into_job_id(), None);
    }

    #[test]
    fn csv_path_requires_extension_and_existence() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("products.CSV");
        std::fs::write(&csv, "sku,name\n").unwrap();
        let txt = dir.path().join("products.txt");
        std::fs::write(&txt, "sku,name\n").unwrap();

        assert!(parse_csv_path(csv.to_str().unwrap()).is_ok());
        assert!(parse_csv_path(txt.to_str().unwrap())
            .unwrap_err()
            .contains("not a .csv"));
        assert!(parse_csv_path(dir.path().join("gone.csv").to_str().unwrap())
            .unwrap_err()
            .contains("does not exist"));
    }

    #[tokio::test]
    async fn submit_reports_progress_from_zero_to_hundred() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(UPLOAD_PATH))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({ "job_id": 9 })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let csv = write_catalog(dir.path(), 8_000);
        assert!(std::fs::metadata(&csv).unwrap().len() > 250_000);

        let client = ApiClient::new(&server.uri()).unwrap();
        let mut seen = Vec::new();
        let job_id = submit(&client, &csv, |percent| seen.push(percent))
            .await
            .unwrap();

        assert_eq!(job_id, "9");
        assert_eq!(seen.first(), Some(&0));
        assert_eq!(seen.last(), Some(&100));
        assert!(seen.len() > 2, "expected intermediate reports, got {seen:?}");
        assert!(
            seen.windows(2).all(|w| w[0] <= w[1]),
            "progress went backwards: {seen:?}"
        );

        let requests = server.received_requests().await.unwrap();
        let body = String::from_utf8_lossy(&requests[0].body);
        assert!(body.contains("name=\"file\""));
        assert!(body.contains("filename=\"catalog.csv\""));
        assert!(body.contains("sku-007999,Product 7999"));
    }

    #[tokio::test]
    async fn rejected_submit_is_an_upload_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(UPLOAD_PATH))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({ "error": "file missing" })),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let csv = write_catalog(dir.path(), 3);

        let client = ApiClient::new(&server.uri()).unwrap();
        let mut seen = Vec::new();
        let err = submit(&client, &csv, |percent| seen.push(percent))
            .await
            .unwrap_err();

        match err {
            ClientError::UploadFailed(reason) => {
                assert!(reason.contains("file missing"), "{reason}")
            }
            other => panic!("expected an upload failure, got {other:?}"),
        }
        assert_eq!(seen.first(), Some(&0));
    }
}
