use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::ClientError;
use crate::http::ByteStream;

use super::api::{PageQuery, Product, ProductSource, StatusChange};
use super::ndjson::NdjsonDecoder;
use super::page::{Generation, ResultPage};

/// Incremental notifications for the generation they are tagged with.
#[derive(Debug)]
pub enum FeedEvent {
    Record(Product),
    Finished,
    Failed(String),
}

pub type FeedEvents = mpsc::UnboundedReceiver<(Generation, FeedEvent)>;

struct InFlight {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Drives paginated product queries into one shared [`ResultPage`].
///
/// Only the most recent query's stream is alive: `load` cancels the previous
/// reader before starting, and every write is checked against the page's
/// current generation.
pub struct ProductFeed<S> {
    source: S,
    page: Arc<Mutex<ResultPage>>,
    current: Option<InFlight>,
    events: mpsc::UnboundedSender<(Generation, FeedEvent)>,
}

fn lock(page: &Mutex<ResultPage>) -> MutexGuard<'_, ResultPage> {
    page.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<S: ProductSource> ProductFeed<S> {
    pub fn new(source: S, initial: PageQuery) -> (Self, FeedEvents) {
        let (events, rx) = mpsc::unbounded_channel();
        let feed = Self {
            source,
            page: Arc::new(Mutex::new(ResultPage::new(initial))),
            current: None,
            events,
        };
        (feed, rx)
    }

    pub fn snapshot(&self) -> ResultPage {
        lock(&self.page).clone()
    }

    /// Stop the in-flight stream, if any. Its remaining chunks are never read.
    pub fn cancel(&mut self) {
        if let Some(in_flight) = self.current.take() {
            in_flight.cancel.cancel();
        }
    }

    /// Replace the result set with `query`'s records as they stream in.
    ///
    /// Returns once the response headers are in; records keep arriving in the
    /// background. A request-level failure leaves the page empty and failed.
    pub async fn load(&mut self, query: PageQuery) -> Result<Generation, ClientError> {
        self.cancel();
        let generation = lock(&self.page).begin(query.clone());
        tracing::debug!(generation, page = query.page, limit = query.limit, "loading products");

        let response = match self.source.open_page(&query).await {
            Ok(response) => response,
            Err(err) => {
                let reason = format!("{err:#}");
                if lock(&self.page).fail(generation, reason.clone()) {
                    let _ = self.events.send((generation, FeedEvent::Failed(reason.clone())));
                }
                return Err(ClientError::QueryTransport(reason));
            }
        };
        lock(&self.page).set_total(generation, response.total);

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(consume(
            Arc::clone(&self.page),
            generation,
            response.body,
            cancel.clone(),
            self.events.clone(),
        ));
        self.current = Some(InFlight { cancel, handle });
        Ok(generation)
    }

    /// Wait for the current stream to end.
    pub async fn wait(&mut self) {
        if let Some(in_flight) = self.current.take() {
            if let Err(err) = in_flight.handle.await {
                tracing::warn!(error = %err, "product stream task ended abnormally");
            }
        }
    }

    /// Change one product's status, patching the visible record on success.
    pub async fn set_active(&self, id: i64, active: bool) -> Result<StatusChange, ClientError> {
        let change = self
            .source
            .update_status(id, active)
            .await
            .map_err(|err| ClientError::StatusUpdate {
                id,
                reason: format!("{err:#}"),
            })?;
        lock(&self.page).patch_active(change.id, change.active);
        Ok(change)
    }
}

impl<S> Drop for ProductFeed<S> {
    fn drop(&mut self) {
        if let Some(in_flight) = self.current.take() {
            in_flight.cancel.cancel();
        }
    }
}

async fn consume(
    page: Arc<Mutex<ResultPage>>,
    generation: Generation,
    mut body: ByteStream,
    cancel: CancellationToken,
    events: mpsc::UnboundedSender<(Generation, FeedEvent)>,
) {
    let mut decoder = NdjsonDecoder::<Product>::new();
    loop {
        let chunk = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(generation, "product stream superseded");
                return;
            }
            chunk = body.next() => chunk,
        };

        match chunk {
            Some(Ok(bytes)) => {
                for item in decoder.push(&bytes) {
                    if !deliver(&page, generation, item, &events) {
                        return;
                    }
                }
            }
            Some(Err(err)) => {
                let reason = format!("{err:#}");
                if lock(&page).fail(generation, reason.clone()) {
                    let _ = events.send((generation, FeedEvent::Failed(reason)));
                }
                return;
            }
            None => {
                if let Some(item) = decoder.finish() {
                    if !deliver(&page, generation, item, &events) {
                        return;
                    }
                }
                if lock(&page).finish(generation) {
                    let _ = events.send((generation, FeedEvent::Finished));
                }
                return;
            }
        }
    }
}

/// Apply one decoded line. `false` once the generation is stale.
fn deliver(
    page: &Mutex<ResultPage>,
    generation: Generation,
    item: Result<Product, ClientError>,
    events: &mpsc::UnboundedSender<(Generation, FeedEvent)>,
) -> bool {
    match item {
        Ok(record) => {
            if !lock(page).push(generation, record.clone()) {
                return false;
            }
            let _ = events.send((generation, FeedEvent::Record(record)));
            true
        }
        Err(err) => {
            tracing::warn!(generation, error = %err, "skipping malformed product line");
            lock(page).skip_line(generation)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};

    use anyhow::{anyhow, Result};
    use bytes::Bytes;
    use futures_util::future::BoxFuture;
    use futures_util::stream;

    use super::*;
    use crate::products::api::PageResponse;
    use crate::products::page::LoadState;

    #[derive(Default)]
    struct ScriptedSource {
        pages: Mutex<HashMap<u32, PageResponse>>,
        rejected_ids: HashSet<i64>,
    }

    impl ScriptedSource {
        fn page(self, page: u32, total: Option<u64>, body: ByteStream) -> Self {
            self.pages
                .lock()
                .unwrap()
                .insert(page, PageResponse { total, body });
            self
        }
    }

    impl ProductSource for ScriptedSource {
        fn open_page(&self, query: &PageQuery) -> BoxFuture<'static, Result<PageResponse>> {
            let response = self.pages.lock().unwrap().remove(&query.page);
            Box::pin(async move { response.ok_or_else(|| anyhow!("connection refused")) })
        }

        fn update_status(&self, id: i64, active: bool) -> BoxFuture<'static, Result<StatusChange>> {
            let rejected = self.rejected_ids.contains(&id);
            Box::pin(async move {
                if rejected {
                    Err(anyhow!("Product not found"))
                } else {
                    Ok(StatusChange { id, active })
                }
            })
        }
    }

    fn line(id: i64) -> String {
        format!(
            "{{\"id\":{id},\"name\":\"P{id}\",\"sku\":\"sku-{id}\",\"description\":\"\",\"active\":true}}\n"
        )
    }

    fn body(parts: Vec<String>) -> ByteStream {
        let items: Vec<Result<Bytes>> = parts.into_iter().map(|p| Ok(Bytes::from(p))).collect();
        stream::iter(items).boxed()
    }

    fn gated() -> (mpsc::UnboundedSender<Result<Bytes>>, ByteStream) {
        let (tx, rx) = mpsc::unbounded_channel::<Result<Bytes>>();
        let body = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|chunk| (chunk, rx))
        })
        .boxed();
        (tx, body)
    }

    fn ids(page: &ResultPage) -> Vec<i64> {
        page.records.iter().map(|p| p.id).collect()
    }

    #[tokio::test]
    async fn streams_records_and_reads_count() {
        let source = ScriptedSource::default().page(
            4,
            Some(37),
            body(vec![
                format!("{}{}", line(31), &line(32)[..10]),
                format!("{}{}", &line(32)[10..], "not-json\n"),
                line(33).trim_end().to_string(),
            ]),
        );
        let (mut feed, mut events) = ProductFeed::new(source, PageQuery::new(1, 10));

        let generation = feed.load(PageQuery::new(4, 10)).await.unwrap();
        feed.wait().await;

        let page = feed.snapshot();
        assert_eq!(ids(&page), vec![31, 32, 33]);
        assert_eq!(page.skipped_lines, 1);
        assert_eq!(page.load_state, LoadState::Complete);
        assert_eq!(page.total_pages(), 4);
        assert_eq!(page.end_item(), 37);

        let mut seen = Vec::new();
        while let Ok((g, event)) = events.try_recv() {
            assert_eq!(g, generation);
            match event {
                FeedEvent::Record(p) => seen.push(p.id),
                FeedEvent::Finished => seen.push(-1),
                FeedEvent::Failed(reason) => panic!("unexpected failure {reason}"),
            }
        }
        assert_eq!(seen, vec![31, 32, 33, -1]);
    }

    #[tokio::test]
    async fn page_change_mid_stream_keeps_only_new_page() {
        let (page_one_tx, page_one_body) = gated();
        let source = ScriptedSource::default()
            .page(1, Some(20), page_one_body)
            .page(2, Some(20), body(vec![line(11), line(12)]));
        let (mut feed, mut events) = ProductFeed::new(source, PageQuery::new(1, 10));

        let first = feed.load(PageQuery::new(1, 10)).await.unwrap();
        page_one_tx.send(Ok(Bytes::from(line(1)))).unwrap();
        match events.recv().await {
            Some((g, FeedEvent::Record(p))) => {
                assert_eq!(g, first);
                assert_eq!(p.id, 1);
            }
            other => panic!("unexpected {other:?}"),
        }

        let second = feed.load(PageQuery::new(2, 10)).await.unwrap();
        assert_ne!(first, second);
        // Page one keeps producing after it was superseded.
        let _ = page_one_tx.send(Ok(Bytes::from(line(2))));
        let _ = page_one_tx.send(Ok(Bytes::from(line(3))));
        drop(page_one_tx);
        feed.wait().await;

        let page = feed.snapshot();
        assert_eq!(ids(&page), vec![11, 12]);
        assert_eq!(page.query().page, 2);
        assert_eq!(page.load_state, LoadState::Complete);
    }

    #[tokio::test]
    async fn request_failure_is_a_transport_error() {
        let (mut feed, _events) =
            ProductFeed::new(ScriptedSource::default(), PageQuery::new(1, 10));
        let err = feed.load(PageQuery::new(1, 10)).await.unwrap_err();
        assert!(matches!(err, ClientError::QueryTransport(_)));

        let page = feed.snapshot();
        assert!(page.records.is_empty());
        assert!(matches!(page.load_state, LoadState::Failed(_)));
    }

    #[tokio::test]
    async fn broken_body_is_not_reported_complete() {
        let items: Vec<Result<Bytes>> = vec![
            Ok(Bytes::from(line(1))),
            Err(anyhow!("connection reset")),
            Ok(Bytes::from(line(2))),
        ];
        let source = ScriptedSource::default().page(1, None, stream::iter(items).boxed());
        let (mut feed, _events) = ProductFeed::new(source, PageQuery::new(1, 10));

        feed.load(PageQuery::new(1, 10)).await.unwrap();
        feed.wait().await;

        let page = feed.snapshot();
        assert_eq!(ids(&page), vec![1]);
        assert_eq!(
            page.load_state,
            LoadState::Failed("connection reset".to_string())
        );
        assert_eq!(page.total_items, 0);
    }

    #[tokio::test]
    async fn status_toggle_patches_or_leaves_state() {
        let mut source = ScriptedSource::default().page(1, Some(2), body(vec![line(1), line(2)]));
        source.rejected_ids.insert(2);
        let (mut feed, _events) = ProductFeed::new(source, PageQuery::new(1, 10));
        feed.load(PageQuery::new(1, 10)).await.unwrap();
        feed.wait().await;

        let change = feed.set_active(1, false).await.unwrap();
        assert_eq!(change, StatusChange { id: 1, active: false });

        let err = feed.set_active(2, false).await.unwrap_err();
        assert!(matches!(err, ClientError::StatusUpdate { id: 2, .. }));

        let page = feed.snapshot();
        assert!(!page.records[0].active);
        assert!(page.records[1].active);
    }
}
