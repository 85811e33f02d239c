use std::time::Duration;

use anyhow::{bail, Context, Result};
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::header::{HeaderValue, ACCEPT};
use reqwest::multipart::Form;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::error_reason;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// A response body read chunk by chunk.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

pub fn body_stream(response: Response) -> ByteStream {
    response
        .bytes_stream()
        .map(|chunk| chunk.context("connection interrupted while reading body"))
        .boxed()
}

/// Shared HTTP client bound to one backend base URL.
///
/// Streaming endpoints stay open for as long as the server keeps sending, so
/// only the connect phase is bounded.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("acme/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let response = self
            .http
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .with_context(|| format!("request to {path} failed"))?;
        read_json(ensure_success(response).await?).await
    }

    pub async fn post_multipart<T: DeserializeOwned>(&self, path: &str, form: Form) -> Result<T> {
        let response = self
            .http
            .post(self.url(path))
            .multipart(form)
            .send()
            .await
            .with_context(|| format!("request to {path} failed"))?;
        read_json(ensure_success(response).await?).await
    }

    /// Open a GET whose body is consumed incrementally by the caller.
    pub async fn get_stream(&self, path: &str, accept: &'static str) -> Result<Response> {
        let response = self
            .http
            .get(self.url(path))
            .header(ACCEPT, HeaderValue::from_static(accept))
            .send()
            .await
            .with_context(|| format!("request to {path} failed"))?;
        ensure_success(response).await
    }
}

async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    bail!("{}", error_reason(status, &body))
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let bytes = response
        .bytes()
        .await
        .context("failed to read response body")?;
    serde_json::from_slice(&bytes).context("failed to parse response body")
}
