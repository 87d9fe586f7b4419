//! Pipeline scenarios against an in-memory document tool and delivery target.
//!
//! No poppler, no network: the fakes record every call so the tests can
//! assert on what was extracted, rendered and uploaded.

use async_trait::async_trait;
use edgequake_pdf2img::{
    AttemptError, ConversionPipeline, ConversionProgressCallback, DeliveryTarget, Document,
    DocumentTool, FilterPolicy, ImageArtifact, ImagePayload, PageError, Pdf2ImgError,
    PipelineConfig, RasterTarget, RunMode, ToolError,
};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const PNG: &[u8] = b"\x89PNG\r\n\x1a\nfake";

// ── Fakes ────────────────────────────────────────────────────────────────

#[derive(Default)]
struct FakeTool {
    pages: Vec<String>,
    fail_count: bool,
    fail_render: HashSet<usize>,
    fail_extract: HashSet<usize>,
    extract_calls: AtomicUsize,
    rendered: Mutex<Vec<usize>>,
}

impl FakeTool {
    fn with_pages<S: Into<String>>(pages: impl IntoIterator<Item = S>) -> Self {
        Self {
            pages: pages.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    fn rendered(&self) -> Vec<usize> {
        let mut pages = self.rendered.lock().unwrap().clone();
        pages.sort_unstable();
        pages
    }

    fn render(&self, page: usize) -> Result<Vec<u8>, ToolError> {
        if self.fail_render.contains(&page) {
            return Err(ToolError::Failed {
                tool: "fake".into(),
                status: "exit status: 99".into(),
                stderr: format!("cannot render page {page}"),
            });
        }
        self.rendered.lock().unwrap().push(page);
        Ok(PNG.to_vec())
    }
}

#[async_trait]
impl DocumentTool for FakeTool {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn page_count(&self, _document: &Path) -> Result<usize, ToolError> {
        if self.fail_count {
            return Err(ToolError::InvalidOutput {
                tool: "fake".into(),
                detail: "no 'Pages:' line".into(),
            });
        }
        Ok(self.pages.len())
    }

    async fn extract_text(&self, _document: &Path, page: usize) -> Result<String, ToolError> {
        self.extract_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_extract.contains(&page) {
            return Err(ToolError::Failed {
                tool: "fake".into(),
                status: "exit status: 1".into(),
                stderr: "bad page".into(),
            });
        }
        Ok(self.pages[page - 1].clone())
    }

    async fn rasterize_all(
        &self,
        _document: &Path,
        out_dir: &Path,
        prefix: &str,
    ) -> Result<(), ToolError> {
        // Zero-padded like pdftoppm.
        let width = self.pages.len().to_string().len();
        for page in 1..=self.pages.len() {
            let bytes = self.render(page)?;
            let path = out_dir.join(format!("{prefix}-{page:0width$}.png"));
            std::fs::write(&path, bytes).map_err(|source| ToolError::Io { path, source })?;
        }
        Ok(())
    }

    async fn rasterize_page_to_file(
        &self,
        _document: &Path,
        page: usize,
        out_stem: &Path,
    ) -> Result<PathBuf, ToolError> {
        let bytes = self.render(page)?;
        let path = PathBuf::from(format!("{}.png", out_stem.display()));
        std::fs::write(&path, bytes).map_err(|source| ToolError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    async fn rasterize_page(&self, _document: &Path, page: usize) -> Result<Vec<u8>, ToolError> {
        self.render(page)
    }
}

/// Records every attempt; fails a file name as many times as configured.
#[derive(Default)]
struct FakeTarget {
    failures: Mutex<HashMap<String, u32>>,
    attempts: AtomicUsize,
    stored: Mutex<Vec<(String, usize)>>,
}

impl FakeTarget {
    fn failing(file_name: &str, times: u32) -> Self {
        let target = Self::default();
        target
            .failures
            .lock()
            .unwrap()
            .insert(file_name.to_string(), times);
        target
    }

    fn stored_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .stored
            .lock()
            .unwrap()
            .iter()
            .map(|(n, _)| n.clone())
            .collect();
        names.sort();
        names
    }
}

#[async_trait]
impl DeliveryTarget for FakeTarget {
    async fn send(&self, artifact: &ImageArtifact) -> Result<String, AttemptError> {
        let n = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut failures = self.failures.lock().unwrap();
            if let Some(left) = failures.get_mut(&artifact.file_name) {
                if *left > 0 {
                    *left -= 1;
                    return Err(AttemptError::Status {
                        status: 503,
                        body: format!("busy (call {n})"),
                    });
                }
            }
        }
        let len = match &artifact.payload {
            ImagePayload::Memory(b) => b.len(),
            ImagePayload::File(p) => std::fs::read(p)
                .map_err(|e| AttemptError::Other(e.to_string()))?
                .len(),
        };
        self.stored
            .lock()
            .unwrap()
            .push((artifact.file_name.clone(), len));
        Ok(format!("{{\"stored\":\"{}\"}}", artifact.file_name))
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────

struct Fixture {
    _dir: tempfile::TempDir,
    source: PathBuf,
    work_root: PathBuf,
}

impl Fixture {
    fn new(file_name: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join(file_name);
        std::fs::write(&source, b"%PDF-1.4\n%fake\n").unwrap();
        let work_root = dir.path().join("work");
        std::fs::create_dir(&work_root).unwrap();
        Self {
            _dir: dir,
            source,
            work_root,
        }
    }

    fn config(&self) -> edgequake_pdf2img::PipelineConfigBuilder {
        PipelineConfig::builder()
            .work_root(&self.work_root)
            .concurrency(3)
    }

    fn document(&self) -> Document {
        Document::new(&self.source)
    }

    fn work_root_is_empty(&self) -> bool {
        std::fs::read_dir(&self.work_root).unwrap().next().is_none()
    }
}

fn pipeline(
    config: PipelineConfig,
    tool: &Arc<FakeTool>,
    target: &Arc<FakeTarget>,
) -> ConversionPipeline {
    ConversionPipeline::new(config, tool.clone(), target.clone())
}

fn five_page_report() -> FakeTool {
    FakeTool::with_pages([
        "Sumário executivo",
        "PLANO DE ACAO\nitem 1",
        "Anexos",
        "Plano de Ação (revisado)\nHistórico de alterações",
        "",
    ])
}

// ── Whole-document mode ──────────────────────────────────────────────────

#[tokio::test]
async fn whole_document_uploads_each_page_once() {
    let fx = Fixture::new("report.pdf");
    let tool = Arc::new(FakeTool::with_pages(["a", "b", "c", "d"]));
    let target = Arc::new(FakeTarget::default());

    let report = pipeline(fx.config().build().unwrap(), &tool, &target)
        .run(&fx.document())
        .await
        .unwrap();

    assert_eq!(report.mode, RunMode::WholeDocument);
    assert_eq!(target.attempts.load(Ordering::SeqCst), 4);
    assert_eq!(
        report.outcomes.iter().map(|o| o.page_num).collect::<Vec<_>>(),
        vec![1, 2, 3, 4]
    );
    assert_eq!(
        target.stored_names(),
        vec!["report-1.png", "report-2.png", "report-3.png", "report-4.png"]
    );
    assert!(report.is_complete());
    assert_eq!(report.stats.total_pages, None);
    assert_eq!(report.stats.delivered_pages, 4);
    // Whole-document mode never reads page text.
    assert_eq!(tool.extract_calls.load(Ordering::SeqCst), 0);
    assert_eq!(
        report.outcomes[0].response.as_deref(),
        Some("{\"stored\":\"report-1.png\"}")
    );
}

#[tokio::test]
async fn whole_document_sorts_past_zero_padding() {
    let fx = Fixture::new("long.pdf");
    let pages: Vec<String> = (1..=12).map(|i| format!("page {i}")).collect();
    let tool = Arc::new(FakeTool::with_pages(pages));
    let target = Arc::new(FakeTarget::default());

    let report = pipeline(fx.config().build().unwrap(), &tool, &target)
        .run(&fx.document())
        .await
        .unwrap();

    let names: Vec<&str> = report.outcomes.iter().map(|o| o.file_name.as_str()).collect();
    assert_eq!(names[0], "long-1.png");
    assert_eq!(names[9], "long-10.png");
    assert_eq!(names[11], "long-12.png");
}

#[tokio::test]
async fn single_page_document_gets_plain_name() {
    let fx = Fixture::new("memo.pdf");
    let tool = Arc::new(FakeTool::with_pages(["only page"]));
    let target = Arc::new(FakeTarget::default());

    let report = pipeline(fx.config().build().unwrap(), &tool, &target)
        .run(&fx.document())
        .await
        .unwrap();

    assert_eq!(target.stored_names(), vec!["memo.png"]);
    assert_eq!(report.outcomes[0].page_num, 1);
}

#[tokio::test]
async fn prefix_replaces_whitespace_in_file_stem() {
    let fx = Fixture::new("Relatório Anual 2024.pdf");
    let tool = Arc::new(FakeTool::with_pages(["x", "y"]));
    let target = Arc::new(FakeTarget::default());

    let report = pipeline(fx.config().build().unwrap(), &tool, &target)
        .run(&fx.document())
        .await
        .unwrap();

    assert_eq!(report.prefix, "Relatório_Anual_2024");
    assert_eq!(
        target.stored_names(),
        vec!["Relatório_Anual_2024-1.png", "Relatório_Anual_2024-2.png"]
    );
}

// ── Selective mode ───────────────────────────────────────────────────────

#[tokio::test]
async fn exclusion_wins_over_inclusion() {
    let fx = Fixture::new("report.pdf");
    let tool = Arc::new(five_page_report());
    let target = Arc::new(FakeTarget::default());
    let config = fx
        .config()
        .filter(FilterPolicy::new("Plano de Ação", "Histórico de Alterações"))
        .build()
        .unwrap();

    let report = pipeline(config, &tool, &target)
        .run(&fx.document())
        .await
        .unwrap();

    assert_eq!(report.mode, RunMode::Selective);
    assert_eq!(tool.rendered(), vec![2]);
    assert_eq!(target.stored_names(), vec!["report-2.png"]);
    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.stats.total_pages, Some(5));
    assert_eq!(report.stats.selected_pages, 1);
    assert_eq!(tool.extract_calls.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn empty_inclusion_selects_all_but_excluded() {
    let fx = Fixture::new("report.pdf");
    let tool = Arc::new(five_page_report());
    let target = Arc::new(FakeTarget::default());
    let config = fx
        .config()
        .filter(FilterPolicy::new("", "historico de alteracoes"))
        .build()
        .unwrap();

    pipeline(config, &tool, &target)
        .run(&fx.document())
        .await
        .unwrap();

    assert_eq!(tool.rendered(), vec![1, 2, 3, 5]);
}

#[tokio::test]
async fn zero_page_document_does_nothing() {
    let fx = Fixture::new("empty.pdf");
    let tool = Arc::new(FakeTool::default());
    let target = Arc::new(FakeTarget::default());
    let config = fx
        .config()
        .filter(FilterPolicy::include_only("anything"))
        .fail_on_all_pages_failed(true)
        .build()
        .unwrap();

    let report = pipeline(config, &tool, &target)
        .run(&fx.document())
        .await
        .unwrap();

    assert!(report.outcomes.is_empty());
    assert!(report.is_complete());
    assert_eq!(tool.extract_calls.load(Ordering::SeqCst), 0);
    assert!(tool.rendered().is_empty());
    assert_eq!(target.attempts.load(Ordering::SeqCst), 0);
    assert!(!fx.source.exists());
}

#[tokio::test]
async fn render_failure_is_scoped_to_its_page() {
    let fx = Fixture::new("report.pdf");
    let mut tool = FakeTool::with_pages(["keep", "keep", "keep", "keep"]);
    tool.fail_render.insert(3);
    let tool = Arc::new(tool);
    let target = Arc::new(FakeTarget::default());
    let config = fx
        .config()
        .filter(FilterPolicy::include_only("keep"))
        .build()
        .unwrap();

    let report = pipeline(config, &tool, &target)
        .run(&fx.document())
        .await
        .unwrap();

    let pages: Vec<(usize, bool)> = report
        .outcomes
        .iter()
        .map(|o| (o.page_num, o.is_success()))
        .collect();
    assert_eq!(pages, vec![(1, true), (2, true), (3, false), (4, true)]);
    assert!(matches!(
        report.outcomes[2].error,
        Some(PageError::RenderFailed { page: 3, .. })
    ));
    assert_eq!(report.outcomes[2].attempts, 0);
    assert_eq!(report.stats.failed_pages, 1);
    assert_eq!(target.stored_names().len(), 3);
}

#[tokio::test]
async fn extraction_failure_skips_only_that_page() {
    let fx = Fixture::new("report.pdf");
    let mut tool = FakeTool::with_pages(["keep", "keep", "keep"]);
    tool.fail_extract.insert(2);
    let tool = Arc::new(tool);
    let target = Arc::new(FakeTarget::default());
    let config = fx
        .config()
        .filter(FilterPolicy::include_only("keep"))
        .build()
        .unwrap();

    let report = pipeline(config, &tool, &target)
        .run(&fx.document())
        .await
        .unwrap();

    assert_eq!(tool.rendered(), vec![1, 3]);
    assert_eq!(report.extraction_errors.len(), 1);
    assert_eq!(report.extraction_errors[0].page(), 2);
    assert_eq!(report.stats.extraction_failures, 1);
}

#[tokio::test]
async fn file_raster_target_writes_then_removes_images() {
    let fx = Fixture::new("report.pdf");
    let tool = Arc::new(FakeTool::with_pages(["keep", "skip", "keep"]));
    let target = Arc::new(FakeTarget::default());
    let config = fx
        .config()
        .filter(FilterPolicy::include_only("keep"))
        .raster_target(RasterTarget::File)
        .build()
        .unwrap();

    pipeline(config, &tool, &target)
        .run(&fx.document())
        .await
        .unwrap();

    let stored = target.stored.lock().unwrap().clone();
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().all(|(_, len)| *len == PNG.len()));
    assert!(fx.work_root_is_empty());
}

// ── Delivery ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn upload_recovers_after_two_failures() {
    let fx = Fixture::new("report.pdf");
    let tool = Arc::new(FakeTool::with_pages(["a", "b"]));
    let target = Arc::new(FakeTarget::failing("report-2.png", 2));

    let report = pipeline(fx.config().build().unwrap(), &tool, &target)
        .run(&fx.document())
        .await
        .unwrap();

    assert!(report.is_complete());
    assert_eq!(report.outcomes[0].attempts, 1);
    assert_eq!(report.outcomes[1].attempts, 3);
    assert_eq!(target.attempts.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn upload_gives_up_after_three_attempts() {
    let fx = Fixture::new("report.pdf");
    let tool = Arc::new(FakeTool::with_pages(["a", "b"]));
    let target = Arc::new(FakeTarget::failing("report-1.png", 3));

    let report = pipeline(fx.config().build().unwrap(), &tool, &target)
        .run(&fx.document())
        .await
        .unwrap();

    let failed: Vec<_> = report.failed().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].page_num, 1);
    match &failed[0].error {
        Some(PageError::DeliveryFailed {
            attempts, detail, ..
        }) => {
            assert_eq!(*attempts, 3);
            // The last attempt's error, not the first.
            assert!(detail.contains("call 3"), "got: {detail}");
        }
        other => panic!("unexpected: {other:?}"),
    }
    assert!(report.outcomes[1].is_success());
}

#[tokio::test]
async fn all_pages_failed_is_reported_or_raised() {
    let tool = Arc::new(FakeTool::with_pages(["a"]));

    let fx = Fixture::new("report.pdf");
    let target = Arc::new(FakeTarget::failing("report.png", 3));
    let report = pipeline(fx.config().build().unwrap(), &tool, &target)
        .run(&fx.document())
        .await
        .unwrap();
    assert_eq!(report.stats.delivered_pages, 0);
    assert_eq!(report.stats.failed_pages, 1);

    let fx = Fixture::new("report.pdf");
    let target = Arc::new(FakeTarget::failing("report.png", 3));
    let config = fx.config().fail_on_all_pages_failed(true).build().unwrap();
    let err = pipeline(config, &tool, &target)
        .run(&fx.document())
        .await
        .unwrap_err();
    assert!(matches!(err, Pdf2ImgError::AllPagesFailed { total: 1, .. }));
    assert!(!fx.source.exists());
    assert!(fx.work_root_is_empty());
}

// ── Validation + cleanup ─────────────────────────────────────────────────

#[tokio::test]
async fn cleanup_runs_after_success() {
    let fx = Fixture::new("report.pdf");
    let tool = Arc::new(FakeTool::with_pages(["a", "b"]));
    let target = Arc::new(FakeTarget::default());

    pipeline(fx.config().build().unwrap(), &tool, &target)
        .run(&fx.document())
        .await
        .unwrap();

    assert!(!fx.source.exists());
    assert!(fx.work_root_is_empty());
}

#[tokio::test]
async fn cleanup_runs_after_page_count_failure() {
    let fx = Fixture::new("report.pdf");
    let mut tool = FakeTool::with_pages(["a"]);
    tool.fail_count = true;
    let tool = Arc::new(tool);
    let target = Arc::new(FakeTarget::default());
    let config = fx
        .config()
        .filter(FilterPolicy::include_only("a"))
        .build()
        .unwrap();

    let err = pipeline(config, &tool, &target)
        .run(&fx.document())
        .await
        .unwrap_err();

    assert!(matches!(err, Pdf2ImgError::PageCountFailed { .. }));
    assert!(!fx.source.exists());
    assert!(fx.work_root_is_empty());
}

#[tokio::test]
async fn whole_document_render_failure_is_fatal() {
    let fx = Fixture::new("report.pdf");
    let mut tool = FakeTool::with_pages(["a", "b"]);
    tool.fail_render.insert(1);
    let tool = Arc::new(tool);
    let target = Arc::new(FakeTarget::default());

    let err = pipeline(fx.config().build().unwrap(), &tool, &target)
        .run(&fx.document())
        .await
        .unwrap_err();

    assert!(matches!(err, Pdf2ImgError::RasterisationFailed { .. }));
    assert_eq!(target.attempts.load(Ordering::SeqCst), 0);
    assert!(fx.work_root_is_empty());
}

#[tokio::test]
async fn non_pdf_is_rejected_and_still_removed() {
    let fx = Fixture::new("notes.txt");
    let tool = Arc::new(FakeTool::with_pages(["a"]));
    let target = Arc::new(FakeTarget::default());

    let err = pipeline(fx.config().build().unwrap(), &tool, &target)
        .run(&fx.document())
        .await
        .unwrap_err();

    assert!(matches!(err, Pdf2ImgError::InvalidInput { .. }));
    assert!(tool.rendered().is_empty());
    assert!(!fx.source.exists());
}

#[tokio::test]
async fn declared_media_type_overrides_extension() {
    let fx = Fixture::new("upload.bin");
    let tool = Arc::new(FakeTool::with_pages(["a"]));
    let target = Arc::new(FakeTarget::default());

    let report = pipeline(fx.config().build().unwrap(), &tool, &target)
        .run(&fx.document().with_media_type("application/pdf"))
        .await
        .unwrap();
    assert!(report.is_complete());
}

#[tokio::test]
async fn source_kept_when_removal_is_off() {
    let fx = Fixture::new("report.pdf");
    let tool = Arc::new(FakeTool::with_pages(["a"]));
    let target = Arc::new(FakeTarget::default());
    let config = fx.config().remove_source(false).build().unwrap();

    pipeline(config, &tool, &target)
        .run(&fx.document())
        .await
        .unwrap();

    assert!(fx.source.exists());
    assert!(fx.work_root_is_empty());
}

#[tokio::test]
async fn select_pages_previews_without_side_effects() {
    let fx = Fixture::new("report.pdf");
    let tool = Arc::new(five_page_report());
    let target = Arc::new(FakeTarget::default());
    let config = fx
        .config()
        .filter(FilterPolicy::new("plano de acao", "historico"))
        .build()
        .unwrap();

    let result = pipeline(config, &tool, &target)
        .select_pages(&fx.document())
        .await
        .unwrap();

    assert_eq!(result.selection.pages(), &[2]);
    assert!(tool.rendered().is_empty());
    assert_eq!(target.attempts.load(Ordering::SeqCst), 0);
    assert!(fx.source.exists());
}

// ── Progress ─────────────────────────────────────────────────────────────

#[derive(Default)]
struct Counting {
    total: AtomicUsize,
    started: AtomicUsize,
    delivered: AtomicUsize,
    errors: AtomicUsize,
    completed: Mutex<Option<(usize, usize)>>,
}

impl ConversionProgressCallback for Counting {
    fn on_run_start(&self, total_pages: usize) {
        self.total.store(total_pages, Ordering::SeqCst);
    }
    fn on_page_start(&self, _page_num: usize, _total_pages: usize) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }
    fn on_page_delivered(&self, _page_num: usize, _total_pages: usize, bytes: u64) {
        assert_eq!(bytes, PNG.len() as u64);
        self.delivered.fetch_add(1, Ordering::SeqCst);
    }
    fn on_page_error(&self, _page_num: usize, _total_pages: usize, _error: String) {
        self.errors.fetch_add(1, Ordering::SeqCst);
    }
    fn on_run_complete(&self, total_pages: usize, delivered: usize) {
        *self.completed.lock().unwrap() = Some((total_pages, delivered));
    }
}

#[tokio::test]
async fn progress_events_follow_the_run() {
    let fx = Fixture::new("report.pdf");
    let mut tool = FakeTool::with_pages(["keep", "keep", "skip", "keep"]);
    tool.fail_render.insert(4);
    let tool = Arc::new(tool);
    let target = Arc::new(FakeTarget::default());
    let progress = Arc::new(Counting::default());
    let config = fx
        .config()
        .filter(FilterPolicy::include_only("keep"))
        .progress_callback(progress.clone())
        .build()
        .unwrap();

    pipeline(config, &tool, &target)
        .run(&fx.document())
        .await
        .unwrap();

    assert_eq!(progress.total.load(Ordering::SeqCst), 3);
    assert_eq!(progress.started.load(Ordering::SeqCst), 3);
    assert_eq!(progress.delivered.load(Ordering::SeqCst), 2);
    assert_eq!(progress.errors.load(Ordering::SeqCst), 1);
    assert_eq!(*progress.completed.lock().unwrap(), Some((3, 2)));
}

// ── Concurrency ──────────────────────────────────────────────────────────

/// Every page qualifies; rendering sleeps and records how many renders overlap.
#[derive(Default)]
struct SlowTool {
    pages: usize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl DocumentTool for SlowTool {
    fn name(&self) -> &'static str {
        "slow"
    }

    async fn page_count(&self, _document: &Path) -> Result<usize, ToolError> {
        Ok(self.pages)
    }

    async fn extract_text(&self, _document: &Path, _page: usize) -> Result<String, ToolError> {
        Ok("keep".into())
    }

    async fn rasterize_all(
        &self,
        _document: &Path,
        _out_dir: &Path,
        _prefix: &str,
    ) -> Result<(), ToolError> {
        unreachable!("selective runs render page by page")
    }

    async fn rasterize_page_to_file(
        &self,
        _document: &Path,
        _page: usize,
        _out_stem: &Path,
    ) -> Result<PathBuf, ToolError> {
        unreachable!("memory target")
    }

    async fn rasterize_page(&self, _document: &Path, _page: usize) -> Result<Vec<u8>, ToolError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(PNG.to_vec())
    }
}

#[tokio::test]
async fn pages_overlap_up_to_the_concurrency_cap() {
    let fx = Fixture::new("report.pdf");
    let tool = Arc::new(SlowTool {
        pages: 10,
        ..SlowTool::default()
    });
    let target = Arc::new(FakeTarget::default());
    let config = fx
        .config()
        .concurrency(3)
        .filter(FilterPolicy::include_only("keep"))
        .build()
        .unwrap();

    let report = ConversionPipeline::new(config, tool.clone(), target.clone())
        .run(&fx.document())
        .await
        .unwrap();

    assert_eq!(report.outcomes.len(), 10);
    assert!(report.is_complete());
    assert_eq!(tool.peak.load(Ordering::SeqCst), 3);
    assert_eq!(tool.in_flight.load(Ordering::SeqCst), 0);
}
