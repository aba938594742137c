//! Pipeline integration tests with in-memory adapters.
//!
//! Every collaborator is faked, so these run without tesseract, a catalog or
//! real card photographs. Each fake counts its calls so tests can assert which
//! stages ran.

use async_trait::async_trait;
use cardscan::pipeline::export::{ExportOutcome, ResultExporter};
use cardscan::pipeline::matching::{NameMatcher, TypeMatcher};
use cardscan::pipeline::ocr::TextExtractor;
use cardscan::pipeline::region::RegionExtractor;
use cardscan::pipeline::store::{JsonFileWriter, NeedsAttentionStore, OutputWriter, StoreAck};
use cardscan::pipeline::workspace::DirectoryProvisioner;
use cardscan::{
    process_batch, AdapterError, Adapters, CardJob, CardScanError, ConfirmedRecord,
    ExtractedText, JobOutcome, JobProgressCallback, MatchCategory, NeedsAttentionRecord,
    ProcessorConfig, RankedCandidate, Region, RegionError, RouteOutcome,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Route library logs to the test harness; `RUST_LOG=debug` shows them.
fn init_logs() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ── Fakes ────────────────────────────────────────────────────────────────────

struct FakeProvisioner {
    root: tempfile::TempDir,
    created: AtomicUsize,
    removed: AtomicUsize,
    fail_create: bool,
    fail_remove: bool,
}

#[async_trait]
impl DirectoryProvisioner for FakeProvisioner {
    async fn create(&self) -> Result<PathBuf, AdapterError> {
        if self.fail_create {
            return Err(AdapterError::Other("disk full".into()));
        }
        let n = self.created.fetch_add(1, Ordering::SeqCst);
        let dir = self.root.path().join(format!("job{n}"));
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    async fn remove(&self, dir: &Path) -> Result<(), AdapterError> {
        self.removed.fetch_add(1, Ordering::SeqCst);
        if self.fail_remove {
            return Err(AdapterError::Other("device busy".into()));
        }
        std::fs::remove_dir_all(dir)?;
        Ok(())
    }
}

/// Writes `<region>.png` containing the region tag. Listed regions fail;
/// `delays` slow individual regions down.
#[derive(Default)]
struct FakeExtractor {
    fail: Vec<Region>,
    delays: HashMap<Region, Duration>,
}

#[async_trait]
impl RegionExtractor for FakeExtractor {
    async fn extract(&self, _source: &Path, workdir: &Path, region: Region) -> Result<PathBuf, AdapterError> {
        if let Some(delay) = self.delays.get(&region) {
            tokio::time::sleep(*delay).await;
        }
        if self.fail.contains(&region) {
            return Err(AdapterError::Engine(format!("{region} box outside image")));
        }
        let path = workdir.join(format!("{region}.png"));
        std::fs::write(&path, region.tag())?;
        Ok(path)
    }
}

/// Reads the region tag back from the image and returns the configured text.
#[derive(Default)]
struct FakeOcr {
    texts: HashMap<Region, String>,
    fail: Vec<Region>,
}

#[async_trait]
impl TextExtractor for FakeOcr {
    async fn extract_text(&self, image: &Path) -> Result<ExtractedText, AdapterError> {
        let region: Region = std::fs::read_to_string(image)?
            .parse()
            .map_err(AdapterError::Other)?;
        if self.fail.contains(&region) {
            return Err(AdapterError::Engine("unreadable".into()));
        }
        let clean = self.texts.get(&region).cloned().unwrap_or_default();
        Ok(ExtractedText::new(clean.clone(), format!("{clean}~")))
    }
}

struct FakeMatcher {
    result: Result<Vec<RankedCandidate>, String>,
    calls: AtomicUsize,
}

impl FakeMatcher {
    fn ok(candidates: Vec<RankedCandidate>) -> Arc<Self> {
        Arc::new(Self {
            result: Ok(candidates),
            calls: AtomicUsize::new(0),
        })
    }

    fn failing(msg: &str) -> Arc<Self> {
        Arc::new(Self {
            result: Err(msg.into()),
            calls: AtomicUsize::new(0),
        })
    }

    fn answer(&self) -> Result<Vec<RankedCandidate>, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone().map_err(AdapterError::Engine)
    }
}

#[async_trait]
impl NameMatcher for FakeMatcher {
    async fn match_name(&self, _clean_text: &str) -> Result<Vec<RankedCandidate>, AdapterError> {
        self.answer()
    }
}

#[async_trait]
impl TypeMatcher for FakeMatcher {
    async fn match_type(&self, _clean_text: &str) -> Result<Vec<RankedCandidate>, AdapterError> {
        self.answer()
    }
}

struct FakeExporter {
    outcome: Result<ExportOutcome, String>,
    calls: Mutex<Vec<(String, PathBuf, bool)>>,
}

#[async_trait]
impl ResultExporter for FakeExporter {
    async fn export(
        &self,
        candidate: &str,
        source: &Path,
        querying_enabled: bool,
    ) -> Result<ExportOutcome, AdapterError> {
        self.calls
            .lock()
            .unwrap()
            .push((candidate.to_string(), source.to_path_buf(), querying_enabled));
        self.outcome.clone().map_err(AdapterError::Engine)
    }
}

#[derive(Default)]
struct MemoryStore {
    records: Mutex<Vec<NeedsAttentionRecord>>,
}

#[async_trait]
impl NeedsAttentionStore for MemoryStore {
    async fn insert(&self, record: &NeedsAttentionRecord) -> Result<StoreAck, AdapterError> {
        let mut records = self.records.lock().unwrap();
        records.push(record.clone());
        Ok(StoreAck {
            id: format!("atn-{}", records.len()),
        })
    }
}

#[derive(Default)]
struct MemoryWriter {
    records: Mutex<Vec<ConfirmedRecord>>,
}

#[async_trait]
impl OutputWriter for MemoryWriter {
    async fn write(&self, record: &ConfirmedRecord) -> Result<PathBuf, AdapterError> {
        let mut records = self.records.lock().unwrap();
        records.push(record.clone());
        Ok(PathBuf::from(format!("/out/{}.json", records.len())))
    }
}

#[derive(Default)]
struct CountingCallback {
    started: AtomicUsize,
    region_ok: AtomicUsize,
    region_err: AtomicUsize,
    completed_ok: AtomicUsize,
    completed_err: AtomicUsize,
}

impl JobProgressCallback for CountingCallback {
    fn on_job_start(&self, _source: &Path) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }

    fn on_region_complete(&self, _source: &Path, _region: Region, _text_len: usize) {
        self.region_ok.fetch_add(1, Ordering::SeqCst);
    }

    fn on_region_error(&self, _source: &Path, _region: Region, _error: &str) {
        self.region_err.fetch_add(1, Ordering::SeqCst);
    }

    fn on_job_complete(&self, _source: &Path, success: bool) {
        if success {
            self.completed_ok.fetch_add(1, Ordering::SeqCst);
        } else {
            self.completed_err.fetch_add(1, Ordering::SeqCst);
        }
    }
}

// ── Harness ──────────────────────────────────────────────────────────────────

struct Harness {
    provisioner: Arc<FakeProvisioner>,
    extractor: FakeExtractor,
    ocr: FakeOcr,
    names: Arc<FakeMatcher>,
    types: Arc<FakeMatcher>,
    exporter: Arc<FakeExporter>,
    store: Arc<MemoryStore>,
    writer: Arc<MemoryWriter>,
}

impl Harness {
    /// Every region reads cleanly, the name matches "Lightning Bolt" (0.92),
    /// the type matches "Instant" (0.81) and the exporter confirms.
    fn new() -> Self {
        init_logs();
        let texts = HashMap::from([
            (Region::Art, "".to_string()),
            (Region::Flavor, "the sparkmage shrieked".to_string()),
            (Region::Name, "lightning bolt".to_string()),
            (Region::Type, "instant".to_string()),
        ]);
        Self {
            provisioner: Arc::new(FakeProvisioner {
                root: tempfile::tempdir().unwrap(),
                created: AtomicUsize::new(0),
                removed: AtomicUsize::new(0),
                fail_create: false,
                fail_remove: false,
            }),
            extractor: FakeExtractor::default(),
            ocr: FakeOcr {
                texts,
                fail: Vec::new(),
            },
            names: FakeMatcher::ok(vec![RankedCandidate::new(0.92, "Lightning Bolt")]),
            types: FakeMatcher::ok(vec![RankedCandidate::new(0.81, "Instant")]),
            exporter: Arc::new(FakeExporter {
                outcome: Ok(ExportOutcome::Confirmed),
                calls: Mutex::new(Vec::new()),
            }),
            store: Arc::new(MemoryStore::default()),
            writer: Arc::new(MemoryWriter::default()),
        }
    }

    fn export(mut self, outcome: Result<ExportOutcome, String>) -> Self {
        self.exporter = Arc::new(FakeExporter {
            outcome,
            calls: Mutex::new(Vec::new()),
        });
        self
    }

    fn provisioner(mut self, fail_create: bool, fail_remove: bool) -> Self {
        self.provisioner = Arc::new(FakeProvisioner {
            root: tempfile::tempdir().unwrap(),
            created: AtomicUsize::new(0),
            removed: AtomicUsize::new(0),
            fail_create,
            fail_remove,
        });
        self
    }

    fn adapters(self, config: &ProcessorConfig) -> (Arc<Adapters>, Probes) {
        let probes = Probes {
            provisioner: self.provisioner.clone(),
            names: self.names.clone(),
            types: self.types.clone(),
            exporter: self.exporter.clone(),
            store: self.store.clone(),
            writer: self.writer.clone(),
        };
        let adapters = Adapters::builder()
            .provisioner(self.provisioner)
            .extractor(Arc::new(self.extractor))
            .ocr(Arc::new(self.ocr))
            .names(self.names)
            .types(self.types)
            .exporter(self.exporter)
            .store(self.store)
            .writer(self.writer)
            .build(config)
            .unwrap();
        (Arc::new(adapters), probes)
    }

    fn job(self, querying: bool) -> (CardJob, Probes) {
        let config = ProcessorConfig::builder()
            .querying_enabled(querying)
            .build()
            .unwrap();
        let (adapters, probes) = self.adapters(&config);
        (CardJob::new("scans/card.jpg", adapters, config), probes)
    }
}

/// Handles kept after the adapters move into the job.
struct Probes {
    provisioner: Arc<FakeProvisioner>,
    names: Arc<FakeMatcher>,
    types: Arc<FakeMatcher>,
    exporter: Arc<FakeExporter>,
    store: Arc<MemoryStore>,
    writer: Arc<MemoryWriter>,
}

impl Probes {
    fn removed(&self) -> usize {
        self.provisioner.removed.load(Ordering::SeqCst)
    }

    fn stored(&self) -> Vec<NeedsAttentionRecord> {
        self.store.records.lock().unwrap().clone()
    }

    fn export_calls(&self) -> usize {
        self.exporter.calls.lock().unwrap().len()
    }
}

// ── Region extraction ────────────────────────────────────────────────────────

#[tokio::test]
async fn all_regions_failing_is_fatal_and_skips_matching() {
    let mut h = Harness::new();
    h.extractor.fail = Region::ALL.to_vec();
    let (mut job, probes) = h.job(true);

    let err = job.execute().await.unwrap_err();

    assert!(matches!(err, CardScanError::NoImagePaths { .. }));
    assert!(err.to_string().contains("No Image paths to process"));
    assert_eq!(probes.names.calls.load(Ordering::SeqCst), 0);
    assert_eq!(probes.types.calls.load(Ordering::SeqCst), 0);
    assert_eq!(probes.export_calls(), 0);
    assert!(probes.stored().is_empty());
    assert_eq!(probes.removed(), 1);
    assert_eq!(job.state().failed_regions().len(), 4);
}

#[tokio::test]
async fn failed_regions_keep_their_reason() {
    let mut h = Harness::new();
    h.extractor.fail = vec![Region::Art];
    h.ocr.fail = vec![Region::Flavor];
    let (mut job, _probes) = h.job(false);

    job.execute().await.unwrap();

    let state = job.state();
    assert!(matches!(
        state.status(Region::Art).unwrap().error(),
        Some(RegionError::ExtractFailed { region: Region::Art, .. })
    ));
    // OCR failure keeps the cropped image for manual review.
    let flavor = state.status(Region::Flavor).unwrap();
    assert!(matches!(flavor.error(), Some(RegionError::OcrFailed { .. })));
    assert!(flavor.image().is_some());
    assert!(state.status(Region::Name).unwrap().is_present());
}

#[tokio::test]
async fn slow_region_times_out_without_failing_the_job() {
    let mut h = Harness::new();
    h.extractor.delays = HashMap::from([(Region::Art, Duration::from_secs(3))]);
    let config = ProcessorConfig::builder()
        .extract_timeout_secs(1)
        .build()
        .unwrap();
    let (adapters, _probes) = h.adapters(&config);
    let mut job = CardJob::new("scans/card.jpg", adapters, config);

    let outcome = job.execute().await.unwrap();

    assert!(outcome.is_confirmed());
    assert_eq!(
        job.state().status(Region::Art).unwrap().error(),
        Some(&RegionError::Timeout {
            region: Region::Art,
            stage: "extract".into(),
            secs: 1,
        })
    );
}

#[tokio::test]
async fn concurrent_regions_match_sequential_results() {
    let run = |concurrent: bool| async move {
        let mut h = Harness::new();
        // Art finishes last when run concurrently.
        h.extractor.delays = HashMap::from([
            (Region::Art, Duration::from_millis(60)),
            (Region::Flavor, Duration::from_millis(30)),
        ]);
        h.ocr.fail = vec![Region::Flavor];
        let config = ProcessorConfig::builder()
            .concurrent_regions(concurrent)
            .build()
            .unwrap();
        let (adapters, _probes) = h.adapters(&config);
        let mut job = CardJob::new("scans/card.jpg", adapters, config);
        let outcome = job.execute().await.unwrap();

        let texts: Vec<(Region, ExtractedText)> = job
            .state()
            .extracted_text()
            .into_iter()
            .map(|(r, t)| (r, t.clone()))
            .collect();
        let failed: Vec<Region> = job
            .state()
            .failed_regions()
            .into_iter()
            .map(|(r, _)| r)
            .collect();
        (outcome, texts, failed)
    };

    let sequential = run(false).await;
    let concurrent = run(true).await;

    assert_eq!(sequential.0, concurrent.0);
    assert_eq!(sequential.1, concurrent.1);
    assert_eq!(sequential.2, concurrent.2);
    assert_eq!(
        concurrent.1.iter().map(|(r, _)| *r).collect::<Vec<_>>(),
        vec![Region::Art, Region::Name, Region::Type]
    );
}

// ── Matching ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn type_region_failure_still_routes_with_empty_types() {
    let mut h = Harness::new();
    h.extractor.fail = vec![Region::Type];
    let (mut job, probes) = h.job(false);

    let outcome = job.execute().await.unwrap();

    assert!(outcome.is_confirmed());
    assert!(job.state().candidates(MatchCategory::Type).is_empty());
    assert_eq!(probes.types.calls.load(Ordering::SeqCst), 0);
    assert_eq!(probes.export_calls(), 1);

    job.generate_output().await.unwrap();
    let written = probes.writer.records.lock().unwrap().clone();
    assert_eq!(written[0].type_string, None);
    assert_eq!(written[0].type_percentage, None);
}

#[tokio::test]
async fn type_matcher_error_degrades_to_empty_list() {
    let mut h = Harness::new();
    h.types = FakeMatcher::failing("type index offline");
    let (mut job, probes) = h.job(false);

    let outcome = job.execute().await.unwrap();

    assert!(outcome.is_confirmed());
    assert_eq!(probes.types.calls.load(Ordering::SeqCst), 1);
    assert!(job.state().candidates(MatchCategory::Type).is_empty());
}

#[tokio::test]
async fn name_region_missing_is_fatal() {
    let mut h = Harness::new();
    h.ocr.fail = vec![Region::Name];
    let (mut job, probes) = h.job(false);

    let err = job.execute().await.unwrap_err();

    assert!(matches!(err, CardScanError::NameRegionMissing { .. }));
    assert_eq!(probes.names.calls.load(Ordering::SeqCst), 0);
    assert_eq!(probes.removed(), 1);
}

#[tokio::test]
async fn name_matcher_error_is_fatal_and_still_cleans_up() {
    let mut h = Harness::new();
    h.names = FakeMatcher::failing("catalog index corrupt");
    let (mut job, probes) = h.job(true);

    let err = job.execute().await.unwrap_err();

    match err {
        CardScanError::MatchingFailed { reason, .. } => assert!(reason.contains("catalog index corrupt")),
        other => panic!("expected MatchingFailed, got {other:?}"),
    }
    assert_eq!(probes.export_calls(), 0);
    assert_eq!(probes.removed(), 1);
}

#[tokio::test]
async fn candidates_are_ranked_best_first() {
    let mut h = Harness::new();
    h.names = FakeMatcher::ok(vec![
        RankedCandidate::new(0.41, "Lightning Axe"),
        RankedCandidate::new(0.92, "Lightning Bolt"),
        RankedCandidate::new(0.55, "Lightning Helix"),
    ]);
    let (mut job, probes) = h.job(false);

    job.execute().await.unwrap();

    let names: Vec<_> = job
        .state()
        .candidates(MatchCategory::Name)
        .iter()
        .map(|c| c.name.as_str())
        .collect();
    assert_eq!(names, ["Lightning Bolt", "Lightning Helix", "Lightning Axe"]);
    let calls = probes.exporter.calls.lock().unwrap();
    assert_eq!(calls[0].0, "Lightning Bolt");
    assert_eq!(calls[0].1, PathBuf::from("scans/card.jpg"));
}

// ── Routing ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn confirmed_never_writes_needs_attention() {
    let (mut job, probes) = Harness::new().job(true);

    let outcome = job.execute().await.unwrap();

    assert!(outcome.is_confirmed());
    assert!(probes.stored().is_empty());
    assert!(probes.exporter.calls.lock().unwrap()[0].2, "querying flag forwarded");
}

#[tokio::test]
async fn ambiguous_stores_exactly_one_record() {
    let h = Harness::new().export(Ok(ExportOutcome::Ambiguous {
        sets: vec!["LEA".into(), "2ED".into()],
    }));
    let (mut job, probes) = h.job(true);

    let outcome = job.execute().await.unwrap();

    match outcome {
        JobOutcome::NeedsAttention(RouteOutcome::Stored { ack, .. }) => assert_eq!(ack.id, "atn-1"),
        other => panic!("expected a stored record, got {other:?}"),
    }
    let stored = probes.stored();
    assert_eq!(stored.len(), 1);
    let record = &stored[0];
    assert_eq!(record.card_name, "Lightning Bolt");
    assert_eq!(record.extracted_text, "lightning bolt");
    assert_eq!(record.dirty_extracted_text, "lightning bolt~");
    assert_eq!(record.possible_sets, "LEA,2ED");
    assert!(record.substituted_regions.is_empty());
    assert!(record.validate().is_ok());

    assert!(matches!(
        job.generate_output().await,
        Err(CardScanError::OutputNotReady { .. })
    ));
}

#[tokio::test]
async fn ambiguous_without_querying_builds_but_does_not_store() {
    let h = Harness::new().export(Ok(ExportOutcome::Ambiguous {
        sets: vec!["M10".into()],
    }));
    let (mut job, probes) = h.job(false);

    let outcome = job.execute().await.unwrap();

    assert!(matches!(
        outcome,
        JobOutcome::NeedsAttention(RouteOutcome::Built { .. })
    ));
    assert!(probes.stored().is_empty());
}

#[tokio::test]
async fn ambiguous_with_no_sets_counts_as_confirmed() {
    let h = Harness::new().export(Ok(ExportOutcome::Ambiguous { sets: vec![] }));
    let (mut job, probes) = h.job(true);

    assert!(job.execute().await.unwrap().is_confirmed());
    assert!(probes.stored().is_empty());
}

#[tokio::test]
async fn export_error_is_returned_as_data() {
    let h = Harness::new().export(Ok(ExportOutcome::Error {
        message: "card not in catalog".into(),
    }));
    let (mut job, probes) = h.job(true);

    let outcome = job.execute().await.unwrap();

    assert_eq!(
        outcome,
        JobOutcome::ExportFailed {
            reason: "card not in catalog".into()
        }
    );
    assert!(probes.stored().is_empty());
}

#[tokio::test]
async fn export_adapter_failure_is_returned_as_data() {
    let h = Harness::new().export(Err("connection refused".into()));
    let (mut job, _probes) = h.job(false);

    match job.execute().await.unwrap() {
        JobOutcome::ExportFailed { reason } => assert!(reason.contains("connection refused")),
        other => panic!("expected ExportFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn no_name_candidate_skips_export_and_needs_attention() {
    let mut h = Harness::new();
    h.names = FakeMatcher::ok(Vec::new());
    let (mut job, probes) = h.job(true);

    let outcome = job.execute().await.unwrap();

    assert_eq!(probes.export_calls(), 0);
    match outcome {
        JobOutcome::NeedsAttention(route) => {
            assert!(route.is_stored());
            assert_eq!(route.record().card_name, "");
            assert_eq!(route.record().possible_sets, "");
        }
        other => panic!("expected NeedsAttention, got {other:?}"),
    }
    assert_eq!(probes.stored().len(), 1);
}

#[tokio::test]
async fn unread_region_gets_placeholder_in_record() {
    let mut h = Harness::new().export(Ok(ExportOutcome::Ambiguous {
        sets: vec!["LEA".into()],
    }));
    h.extractor.fail = vec![Region::Flavor];
    let (mut job, probes) = h.job(true);

    job.execute().await.unwrap();

    let record = &probes.stored()[0];
    assert_eq!(record.substituted_regions, vec![Region::Flavor]);
    assert_eq!(record.flavor_image, cardscan::PLACEHOLDER_IMAGE_B64);
}

// ── Cleanup ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn cleanup_runs_once_and_its_failure_never_masks_the_outcome() {
    let h = Harness::new().provisioner(false, true);
    let (mut job, probes) = h.job(false);

    let outcome = job.execute().await.unwrap();

    assert!(outcome.is_confirmed());
    assert_eq!(probes.removed(), 1);
    assert!(job.state().workdir.is_none());
}

#[tokio::test]
async fn cleanup_failure_never_masks_a_fatal_error() {
    let mut h = Harness::new().provisioner(false, true);
    h.ocr.fail = vec![Region::Name];
    let (mut job, probes) = h.job(false);

    let err = job.execute().await.unwrap_err();

    assert!(matches!(err, CardScanError::NameRegionMissing { .. }));
    assert_eq!(probes.removed(), 1);
    assert!(job.state().workdir.is_none());
}

#[tokio::test]
async fn cleanup_failure_keeps_no_image_paths_error() {
    let mut h = Harness::new().provisioner(false, true);
    h.extractor.fail = Region::ALL.to_vec();
    let (mut job, probes) = h.job(false);

    let err = job.execute().await.unwrap_err();

    assert!(matches!(err, CardScanError::NoImagePaths { .. }));
    assert_eq!(probes.removed(), 1);
    assert_eq!(probes.names.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn workspace_failure_is_fatal_without_cleanup() {
    let h = Harness::new().provisioner(true, false);
    let (mut job, probes) = h.job(false);

    let err = job.execute().await.unwrap_err();

    assert!(matches!(err, CardScanError::WorkspaceFailed { .. }));
    assert_eq!(probes.removed(), 0);
    assert_eq!(probes.names.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn working_directory_is_gone_after_the_job() {
    let (mut job, probes) = Harness::new().job(false);
    job.execute().await.unwrap();

    let root = probes.provisioner.root.path();
    assert_eq!(std::fs::read_dir(root).unwrap().count(), 0);
}

// ── Output ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn confirmed_output_record_carries_best_candidates() {
    let (mut job, probes) = Harness::new().job(false);

    job.execute().await.unwrap();
    let path = job.generate_output().await.unwrap();

    assert_eq!(path, PathBuf::from("/out/1.json"));
    let record = probes.writer.records.lock().unwrap()[0].clone();
    assert_eq!(record.path, "scans/card.jpg");
    assert_eq!(record.name_percentage, 0.92);
    assert_eq!(record.name_string, "Lightning Bolt");
    assert_eq!(record.type_percentage, Some(0.81));
    assert_eq!(record.type_string.as_deref(), Some("Instant"));
    assert_eq!(record.created.split(' ').count(), 4);

    let v = serde_json::to_value(&record).unwrap();
    assert_eq!(v["name-percentage"], 0.92);
    assert_eq!(v["name-string"], "Lightning Bolt");
}

#[tokio::test]
async fn generate_output_refuses_a_second_write() {
    let (mut job, probes) = Harness::new().job(false);
    job.execute().await.unwrap();
    job.generate_output().await.unwrap();

    let err = job.generate_output().await.unwrap_err();

    assert!(matches!(err, CardScanError::OutputAlreadyWritten { .. }));
    assert_eq!(probes.writer.records.lock().unwrap().len(), 1);
}

// ── Progress ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn progress_callback_sees_every_region() {
    let mut h = Harness::new();
    h.extractor.fail = vec![Region::Art];
    let cb = Arc::new(CountingCallback::default());
    let config = ProcessorConfig::builder()
        .progress_callback(cb.clone())
        .build()
        .unwrap();
    let (adapters, _probes) = h.adapters(&config);
    let mut job = CardJob::new("scans/card.jpg", adapters, config);

    job.execute().await.unwrap();

    assert_eq!(cb.started.load(Ordering::SeqCst), 1);
    assert_eq!(cb.region_ok.load(Ordering::SeqCst), 3);
    assert_eq!(cb.region_err.load(Ordering::SeqCst), 1);
    assert_eq!(cb.completed_ok.load(Ordering::SeqCst), 1);
    assert_eq!(cb.completed_err.load(Ordering::SeqCst), 0);
}

// ── Batch ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn batch_keeps_input_order_and_isolates_failures() {
    let scans = tempfile::tempdir().unwrap();
    let png = b"\x89PNG\r\n\x1a\n0000";
    let a = scans.path().join("a.png");
    let c = scans.path().join("c.png");
    std::fs::write(&a, png).unwrap();
    std::fs::write(&c, png).unwrap();
    let missing = scans.path().join("b.png");

    let config = ProcessorConfig::builder().job_concurrency(2).build().unwrap();
    let (adapters, probes) = Harness::new().adapters(&config);

    let items = process_batch(vec![a.clone(), missing.clone(), c.clone()], adapters, &config, true).await;

    let sources: Vec<_> = items.iter().map(|i| i.source.clone()).collect();
    assert_eq!(sources, vec![a, missing, c]);
    assert!(items[0].result.as_ref().unwrap().is_confirmed());
    assert!(matches!(items[1].result, Err(CardScanError::SourceNotFound { .. })));
    assert!(items[1].output.is_none());
    assert!(items[2].result.as_ref().unwrap().is_confirmed());
    assert!(matches!(items[2].output, Some(Ok(_))));

    assert_eq!(probes.writer.records.lock().unwrap().len(), 2);
    assert_eq!(probes.provisioner.created.load(Ordering::SeqCst), 2);
    assert_eq!(probes.removed(), 2);
}

#[tokio::test]
async fn batch_rejected_source_still_reports_completion() {
    let scans = tempfile::tempdir().unwrap();
    let a = scans.path().join("a.png");
    std::fs::write(&a, b"\x89PNG\r\n\x1a\n0000").unwrap();
    let missing = scans.path().join("missing.png");
    let not_an_image = scans.path().join("notes.png");
    std::fs::write(&not_an_image, b"plain text").unwrap();

    let cb = Arc::new(CountingCallback::default());
    let config = ProcessorConfig::builder()
        .progress_callback(cb.clone())
        .build()
        .unwrap();
    let (adapters, _probes) = Harness::new().adapters(&config);

    let items = process_batch(vec![a, missing, not_an_image], adapters, &config, false).await;

    assert_eq!(items.len(), 3);
    assert_eq!(cb.started.load(Ordering::SeqCst), 1);
    assert_eq!(cb.completed_ok.load(Ordering::SeqCst), 1);
    assert_eq!(cb.completed_err.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn batch_same_stem_sources_get_separate_output_files() {
    let scans = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let png = b"\x89PNG\r\n\x1a\n0000";
    let first = scans.path().join("box1/card.png");
    let second = scans.path().join("box2/card.png");
    for path in [&first, &second] {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, png).unwrap();
    }

    let config = ProcessorConfig::builder().job_concurrency(2).build().unwrap();
    let h = Harness::new();
    let adapters = Adapters::builder()
        .provisioner(h.provisioner)
        .extractor(Arc::new(h.extractor))
        .ocr(Arc::new(h.ocr))
        .names(h.names)
        .types(h.types)
        .exporter(h.exporter)
        .store(h.store)
        .writer(Arc::new(JsonFileWriter::new(out.path())))
        .build(&config)
        .unwrap();

    let items = process_batch(vec![first.clone(), second.clone()], Arc::new(adapters), &config, true).await;

    let written: Vec<PathBuf> = items
        .iter()
        .map(|i| i.output.as_ref().unwrap().as_ref().unwrap().clone())
        .collect();
    assert_ne!(written[0], written[1]);
    for (item, path) in items.iter().zip(&written) {
        let v: serde_json::Value = serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
        assert_eq!(v["path"], item.source.display().to_string());
    }
    assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 2);
}
