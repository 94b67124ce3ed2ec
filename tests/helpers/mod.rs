//! Scriptable fake collaborators for pipeline tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use ad_pipeline::config::PipelineSettings;
use ad_pipeline::error::ExternalError;
use ad_pipeline::models::asset::{
    AssetKey, MediaType, PlatformIds, ResolvedAsset, StagedMedia, Targeting,
};
use ad_pipeline::models::review::{AdCopy, ComplianceVerdict, DomainVerdict};
use ad_pipeline::pipeline::collaborators::{
    AdRecord, AdsPublisher, AnalysisRequest, AssetResolver, AssetStore, ComplianceReviewer,
    CopyBrief, CopyGenerator, DomainReviewer, MediaAnalyzer, RecordSync, RevisionRequest, Reviser,
};
use ad_pipeline::pipeline::{BatchOrchestrator, Collaborators, PipelineContext};

use crate::fixtures;

/// Queued one-shot results, then a fallback for every later call.
pub struct Script<T> {
    queue: Mutex<VecDeque<Result<T, ExternalError>>>,
    fallback: Mutex<Result<T, ExternalError>>,
    calls: AtomicUsize,
}

impl<T: Clone> Script<T> {
    pub fn always(result: Result<T, ExternalError>) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(result),
            calls: AtomicUsize::new(0),
        }
    }

    /// Answer the next call with `result`, before falling back.
    pub fn push(&self, result: Result<T, ExternalError>) {
        self.queue.lock().unwrap().push_back(result);
    }

    pub fn set(&self, result: Result<T, ExternalError>) {
        *self.fallback.lock().unwrap() = result;
    }

    pub fn next(&self) -> Result<T, ExternalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(result) = self.queue.lock().unwrap().pop_front() {
            return result;
        }
        self.fallback.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Tracks how many callers are inside a section at once.
#[derive(Default)]
pub struct InFlight {
    current: AtomicUsize,
    peak: AtomicUsize,
}

pub struct InFlightGuard<'a>(&'a InFlight);

impl InFlight {
    pub fn enter(&self) -> InFlightGuard<'_> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        InFlightGuard(self)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}

pub fn transient(service: &str) -> ExternalError {
    ExternalError::transient(service, "HTTP 503: try again")
}

pub fn rejected(service: &str) -> ExternalError {
    ExternalError::non_retryable(service, "HTTP 400: bad request")
}

// ── Fakes ───────────────────────────────────────────────────────────────

/// Resolves every reference to a PNG unless a per-reference outcome is set.
#[derive(Default)]
pub struct FakeResolver {
    overrides: Mutex<HashMap<String, Result<ResolvedAsset, ExternalError>>>,
    pub delay: Mutex<Duration>,
    pub in_flight: InFlight,
    calls: AtomicUsize,
}

impl FakeResolver {
    pub fn set(&self, source_ref: &str, result: Result<ResolvedAsset, ExternalError>) {
        self.overrides
            .lock()
            .unwrap()
            .insert(source_ref.to_string(), result);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AssetResolver for FakeResolver {
    async fn resolve(&self, source_ref: &str) -> Result<ResolvedAsset, ExternalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let _guard = self.in_flight.enter();
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            sleep(delay).await;
        }
        match self.overrides.lock().unwrap().get(source_ref) {
            Some(result) => result.clone(),
            None => Ok(fixtures::png_asset()),
        }
    }
}

/// Retry script shared by every reference, for the resolver's transient cases.
pub struct FlakyResolver {
    pub script: Script<ResolvedAsset>,
}

#[async_trait]
impl AssetResolver for FlakyResolver {
    async fn resolve(&self, _: &str) -> Result<ResolvedAsset, ExternalError> {
        self.script.next()
    }
}

#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn paths(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }
}

#[async_trait]
impl AssetStore for MemoryStore {
    async fn store(&self, asset: &ResolvedAsset, key: &AssetKey) -> Result<String, ExternalError> {
        let path = key.object_key();
        self.objects
            .lock()
            .unwrap()
            .insert(path.clone(), asset.bytes.clone());
        Ok(path)
    }

    async fn fetch(&self, path: &str) -> Result<Vec<u8>, ExternalError> {
        self.objects
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| ExternalError::non_retryable("store", format!("no object at {path}")))
    }
}

pub struct FakeAnalyzer {
    pub script: Script<serde_json::Value>,
    /// Outcome of the pre-staging check; `None` lets every asset through.
    pub precheck: Mutex<Option<ExternalError>>,
    pub delay: Mutex<Duration>,
    pub in_flight: InFlight,
}

#[async_trait]
impl MediaAnalyzer for FakeAnalyzer {
    fn precheck(&self, _: MediaType, _: u64) -> Result<(), ExternalError> {
        match self.precheck.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn analyze(&self, _: &AnalysisRequest<'_>) -> Result<serde_json::Value, ExternalError> {
        let _guard = self.in_flight.enter();
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            sleep(delay).await;
        }
        self.script.next()
    }
}

pub struct FakeCopywriter {
    pub script: Script<AdCopy>,
    pub briefs: Mutex<Vec<String>>,
}

#[async_trait]
impl CopyGenerator for FakeCopywriter {
    async fn draft(&self, brief: &CopyBrief<'_>) -> Result<AdCopy, ExternalError> {
        self.briefs.lock().unwrap().push(brief.angle.to_string());
        self.script.next()
    }
}

pub struct FakeCompliance {
    pub script: Script<ComplianceVerdict>,
}

#[async_trait]
impl ComplianceReviewer for FakeCompliance {
    async fn review(&self, _: &AdCopy) -> Result<ComplianceVerdict, ExternalError> {
        self.script.next()
    }
}

pub struct FakeDomain {
    pub script: Script<DomainVerdict>,
}

#[async_trait]
impl DomainReviewer for FakeDomain {
    async fn review(&self, _: &AdCopy) -> Result<DomainVerdict, ExternalError> {
        self.script.next()
    }
}

/// Replaces each flagged phrase with the preferred replacement, or a
/// neutral phrase. With `echo` set it returns the draft unchanged.
#[derive(Default)]
pub struct FakeReviser {
    pub requests: Mutex<Vec<RevisionRequest>>,
    pub echo: Mutex<bool>,
}

impl FakeReviser {
    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Reviser for FakeReviser {
    async fn revise(&self, request: &RevisionRequest) -> Result<AdCopy, ExternalError> {
        self.requests.lock().unwrap().push(request.clone());
        let mut copy = request.draft.clone();
        if *self.echo.lock().unwrap() {
            return Ok(copy);
        }
        for flag in &request.flags {
            copy.primary_text = copy.primary_text.replace(&flag.quoted_text, "help you rest");
        }
        for revision in &request.claims {
            let replacement = revision
                .preferred_replacement
                .as_deref()
                .unwrap_or("feels great");
            copy.primary_text = copy
                .primary_text
                .replace(&revision.claim.claim_text, replacement);
        }
        Ok(copy)
    }
}

/// Publishes everything except media whose path contains a failing marker.
#[derive(Default)]
pub struct FakePublisher {
    failing: Mutex<Vec<String>>,
    pub published: Mutex<Vec<(StagedMedia, Targeting)>>,
    calls: AtomicUsize,
}

impl FakePublisher {
    pub fn fail_for(&self, marker: &str) {
        self.failing.lock().unwrap().push(marker.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AdsPublisher for FakePublisher {
    async fn publish(
        &self,
        _: &AdCopy,
        media: &StagedMedia,
        targeting: &Targeting,
    ) -> Result<PlatformIds, ExternalError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let fails = self
            .failing
            .lock()
            .unwrap()
            .iter()
            .any(|marker| media.path.contains(marker.as_str()));
        if fails {
            return Err(ExternalError::non_retryable(
                "ads platform",
                "HTTP 400: invalid creative",
            ));
        }
        self.published
            .lock()
            .unwrap()
            .push((media.clone(), targeting.clone()));
        Ok(PlatformIds {
            creative_id: format!("creative-{n}"),
            ad_id: format!("ad-{n}"),
        })
    }
}

pub struct FakeRecordSync {
    pub script: Script<()>,
    pub records: Mutex<Vec<AdRecord>>,
}

#[async_trait]
impl RecordSync for FakeRecordSync {
    async fn update(&self, record: &AdRecord) -> Result<(), ExternalError> {
        let result = self.script.next();
        if result.is_ok() {
            self.records.lock().unwrap().push(record.clone());
        }
        result
    }
}

// ── Harness ─────────────────────────────────────────────────────────────

/// Every fake, defaulting to the happy path.
pub struct Fakes {
    pub resolver: Arc<FakeResolver>,
    pub store: Arc<MemoryStore>,
    pub analyzer: Arc<FakeAnalyzer>,
    pub copywriter: Arc<FakeCopywriter>,
    pub compliance: Arc<FakeCompliance>,
    pub domain: Arc<FakeDomain>,
    pub reviser: Arc<FakeReviser>,
    pub publisher: Arc<FakePublisher>,
    pub record_sync: Arc<FakeRecordSync>,
}

impl Default for Fakes {
    fn default() -> Self {
        Self::new()
    }
}

impl Fakes {
    pub fn new() -> Self {
        Self {
            resolver: Arc::new(FakeResolver::default()),
            store: Arc::new(MemoryStore::default()),
            analyzer: Arc::new(FakeAnalyzer {
                script: Script::always(Ok(fixtures::analysis())),
                precheck: Mutex::new(None),
                delay: Mutex::new(Duration::ZERO),
                in_flight: InFlight::default(),
            }),
            copywriter: Arc::new(FakeCopywriter {
                script: Script::always(Ok(fixtures::clean_copy())),
                briefs: Mutex::new(Vec::new()),
            }),
            compliance: Arc::new(FakeCompliance {
                script: Script::always(Ok(ComplianceVerdict::pass())),
            }),
            domain: Arc::new(FakeDomain {
                script: Script::always(Ok(DomainVerdict::green())),
            }),
            reviser: Arc::new(FakeReviser::default()),
            publisher: Arc::new(FakePublisher::default()),
            record_sync: Arc::new(FakeRecordSync {
                script: Script::always(Ok(())),
                records: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            resolver: self.resolver.clone(),
            store: self.store.clone(),
            analyzer: self.analyzer.clone(),
            copywriter: self.copywriter.clone(),
            compliance: self.compliance.clone(),
            domain: self.domain.clone(),
            reviser: self.reviser.clone(),
            publisher: self.publisher.clone(),
            record_sync: self.record_sync.clone(),
        }
    }

    pub fn context(&self, settings: PipelineSettings) -> PipelineContext {
        PipelineContext::new(
            self.collaborators(),
            settings,
            targeting(),
            fixtures::APPROVED_CLAIMS.iter().map(|c| c.to_string()).collect(),
        )
    }

    pub fn orchestrator(&self, settings: PipelineSettings) -> BatchOrchestrator {
        BatchOrchestrator::new(Arc::new(self.context(settings)))
    }
}

pub fn targeting() -> Targeting {
    Targeting {
        ad_set_id: "adset-default".to_string(),
        page_id: "page-1".to_string(),
        link_url: "https://shop.example.com/pillow".to_string(),
    }
}

/// Millisecond backoffs so retries finish in real time.
pub fn fast_settings(max_retries: u32) -> PipelineSettings {
    PipelineSettings {
        batch_concurrency: 3,
        analyzer_concurrency: 2,
        max_retries,
        retry_base: Duration::from_millis(1),
        retry_max: Duration::from_millis(5),
        dry_run: false,
    }
}

// ── HTTP ────────────────────────────────────────────────────────────────

/// Serve the API over fakes on an ephemeral port; returns the base URL.
pub async fn spawn_server(fakes: &Fakes, settings: PipelineSettings) -> String {
    spawn_server_keeping(fakes, settings, 100).await
}

/// Like [`spawn_server`], keeping at most `settled_capacity` settled batches.
pub async fn spawn_server_keeping(
    fakes: &Fakes,
    settings: PipelineSettings,
    settled_capacity: usize,
) -> String {
    use ad_pipeline::app_state::AppState;
    use metrics_exporter_prometheus::PrometheusBuilder;

    let state = AppState::new(fakes.orchestrator(settings), true, settled_capacity);
    let prometheus = Arc::new(PrometheusBuilder::new().build_recorder().handle());
    let app = ad_pipeline::routes::router(state, prometheus);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Poll GET /api/v1/batches/{id} until it stops answering 202.
pub async fn wait_for_batch(
    client: &reqwest::Client,
    base_url: &str,
    batch_id: &str,
) -> Result<reqwest::Response, Box<dyn std::error::Error>> {
    let url = format!("{base_url}/api/v1/batches/{batch_id}");
    for _ in 0..200 {
        let response = client.get(&url).send().await?;
        if response.status() != reqwest::StatusCode::ACCEPTED {
            return Ok(response);
        }
        sleep(Duration::from_millis(10)).await;
    }
    Err(format!("batch {batch_id} did not settle").into())
}
