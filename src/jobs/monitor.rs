use anyhow::Result;
use futures_util::future::BoxFuture;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use urlencoding::encode;

use crate::http::{body_stream, ApiClient, ByteStream};

use super::event::{decode_payload, JobUpdate, SseDecoder};

const UPDATE_BUFFER: usize = 64;

/// Opens the raw push stream for a job.
pub trait ProgressSource: Send + Sync + 'static {
    fn open(&self, job_id: &str) -> BoxFuture<'static, Result<ByteStream>>;
}

pub fn progress_path(job_id: &str) -> String {
    format!("/products/progress/{}/", encode(job_id))
}

impl ProgressSource for ApiClient {
    fn open(&self, job_id: &str) -> BoxFuture<'static, Result<ByteStream>> {
        let client = self.clone();
        let path = progress_path(job_id);
        Box::pin(async move {
            let response = client.get_stream(&path, "text/event-stream").await?;
            Ok(body_stream(response))
        })
    }
}

/// Holds at most one live progress subscription.
pub struct JobMonitor<S> {
    source: std::sync::Arc<S>,
    active: Option<CancellationToken>,
}

impl<S: ProgressSource> JobMonitor<S> {
    pub fn new(source: S) -> Self {
        Self {
            source: std::sync::Arc::new(source),
            active: None,
        }
    }

    /// Subscribe to `job_id`, closing any earlier subscription first.
    pub fn watch(&mut self, job_id: &str) -> JobSubscription {
        self.close();

        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(UPDATE_BUFFER);
        let source = std::sync::Arc::clone(&self.source);
        let job = job_id.to_string();
        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            let opened = tokio::select! {
                _ = task_cancel.cancelled() => return,
                opened = source.open(&job) => opened,
            };
            match opened {
                Ok(body) => pump(&job, body, &task_cancel, &tx).await,
                Err(err) => {
                    let update = JobUpdate::Disconnected {
                        reason: format!("{err:#}"),
                    };
                    forward(&tx, &task_cancel, update).await;
                }
            }
        });

        tracing::debug!(job_id, "progress subscription opened");
        self.active = Some(cancel.clone());
        JobSubscription {
            job_id: job_id.to_string(),
            rx,
            cancel,
        }
    }

    pub fn close(&mut self) {
        if let Some(previous) = self.active.take() {
            previous.cancel();
        }
    }
}

impl<S> Drop for JobMonitor<S> {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.cancel();
        }
    }
}

/// A cancellable, ordered sequence of updates for one job.
pub struct JobSubscription {
    job_id: String,
    rx: mpsc::Receiver<JobUpdate>,
    cancel: CancellationToken,
}

impl JobSubscription {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Next update in arrival order; `None` once closed or exhausted.
    pub async fn next(&mut self) -> Option<JobUpdate> {
        if self.is_closed() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            update = self.rx.recv() => update,
        }
    }

    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for JobSubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn forward(
    tx: &mpsc::Sender<JobUpdate>,
    cancel: &CancellationToken,
    update: JobUpdate,
) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        sent = tx.send(update) => sent.is_ok(),
    }
}

async fn pump(
    job_id: &str,
    mut body: ByteStream,
    cancel: &CancellationToken,
    tx: &mpsc::Sender<JobUpdate>,
) {
    let mut decoder = SseDecoder::new();
    loop {
        let chunk = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(job_id, "progress subscription closed");
                return;
            }
            chunk = body.next() => chunk,
        };

        let bytes = match chunk {
            Some(Ok(bytes)) => bytes,
            Some(Err(err)) => {
                let reason = format!("{err:#}");
                forward(tx, cancel, JobUpdate::Disconnected { reason }).await;
                return;
            }
            None => {
                let reason = "stream ended without [DONE]".to_string();
                forward(tx, cancel, JobUpdate::Disconnected { reason }).await;
                return;
            }
        };

        for payload in decoder.push(&bytes) {
            match decode_payload(&payload) {
                Ok(JobUpdate::Ended) => {
                    forward(tx, cancel, JobUpdate::Ended).await;
                    tracing::debug!(job_id, "progress stream finished");
                    return;
                }
                Ok(update) => {
                    if !forward(tx, cancel, update).await {
                        return;
                    }
                }
                Err(reason) => {
                    tracing::warn!(job_id, %reason, payload = %payload, "skipping progress event");
                }
            }
        }
    }
}
