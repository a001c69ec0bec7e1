use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use serde::Serialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

use idscan_core::{Rect, RecordReport, ScanRecord};
use idscan_ocr::{Extractor, NameMatch, OcrBackend, PipelineError, ScanOutcome, ScanPipeline};
use idscan_storage::{DbPool, SavedScan, ScanStore};

use crate::config::Config;

pub type SharedPipeline = Arc<ScanPipeline<Box<dyn OcrBackend>>>;

/// Grace period before reading a file the watcher just saw created.
const WATCH_SETTLE: Duration = Duration::from_millis(500);

/// Everything a capture needs after the frame is in hand.
pub struct AppContext {
    pub pipeline: SharedPipeline,
    pub store: ScanStore,
    pub db: DbPool,
    pub timeout: Duration,
}

impl AppContext {
    pub async fn from_config(config: &Config) -> Result<Self> {
        let pipeline = ScanPipeline::new(config.ocr.build_backend()).with_mode(config.ocr.page_seg_mode);
        let db = open_db(config).await?;
        let store = ScanStore::new(&config.storage.output_dir).with_images(config.storage.save_images);
        Ok(Self { pipeline: Arc::new(pipeline), store, db, timeout: config.ocr.timeout() })
    }

    /// Runs `job` on the blocking pool, bounded by the OCR timeout.
    pub async fn run_scan<F>(&self, job: F) -> Result<ScanOutcome>
    where
        F: FnOnce(&ScanPipeline<Box<dyn OcrBackend>>) -> Result<ScanOutcome, PipelineError> + Send + 'static,
    {
        let pipeline = Arc::clone(&self.pipeline);
        let handle = tokio::task::spawn_blocking(move || job(&pipeline));
        match tokio::time::timeout(self.timeout, handle).await {
            Err(_) => Err(anyhow!("OCR did not finish within {}s", self.timeout.as_secs())),
            Ok(Err(join_err)) => Err(anyhow!("Scan task failed: {join_err}")),
            Ok(Ok(result)) => Ok(result?),
        }
    }

    pub async fn scan_frame(&self, frame: RgbImage, rect: Option<Rect>) -> Result<ScanOutcome> {
        self.run_scan(move |p| p.process_frame(&frame, rect)).await
    }

    pub async fn scan_file(&self, path: PathBuf, rect: Option<Rect>) -> Result<ScanOutcome> {
        self.run_scan(move |p| p.process_file(&path, rect)).await
    }

    /// Write the capture files and index the scan.
    pub async fn persist(&self, outcome: &ScanOutcome) -> Result<SavedScan> {
        let saved = self
            .store
            .save(&outcome.scan, &outcome.original, outcome.processed.as_gray())
            .await
            .context("Failed to save scan files")?;
        idscan_storage::insert_scan(&self.db, &outcome.scan, Some(&saved))
            .await
            .context("Failed to index scan")?;
        Ok(saved)
    }
}

pub async fn open_db(config: &Config) -> Result<DbPool> {
    let path = config.storage.database_path();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    idscan_storage::create_db(&path)
        .await
        .with_context(|| format!("Failed to open scan index {}", path.display()))
}

// ── Reporting ─────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ScanReport<'a> {
    #[serde(flatten)]
    pub scan: &'a ScanRecord,
    pub name_match: Option<NameMatch>,
    pub data_path: Option<&'a Path>,
    pub original_path: Option<&'a Path>,
    pub processed_path: Option<&'a Path>,
}

impl<'a> ScanReport<'a> {
    pub fn new(outcome: &'a ScanOutcome, saved: Option<&'a SavedScan>) -> Self {
        Self {
            scan: &outcome.scan,
            name_match: outcome.name_match,
            data_path: saved.map(|s| s.data_path.as_path()),
            original_path: saved.and_then(|s| s.original_path.as_deref()),
            processed_path: saved.and_then(|s| s.processed_path.as_deref()),
        }
    }

    pub fn render_text(&self) -> String {
        let rule = "=".repeat(60);
        let mut out = format!("{rule}\nSCAN CAPTURED AND PROCESSED\n");
        if let Some(p) = self.original_path {
            out.push_str(&format!("Original:  {}\n", p.display()));
        }
        if let Some(p) = self.processed_path {
            out.push_str(&format!("Processed: {}\n", p.display()));
        }
        if let Some(p) = self.data_path {
            out.push_str(&format!("Data:      {}\n", p.display()));
        }
        out.push_str(&format!("{}\n", "-".repeat(60)));
        out.push_str(&RecordReport(&self.scan.record).to_string());
        out.push_str(&rule);
        out
    }
}

pub fn print_report(report: &ScanReport<'_>, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!("{}", report.render_text());
    }
    Ok(())
}

// ── Commands ──────────────────────────────────────────────────────────────────

pub fn extract(file: Option<&Path>, json: bool) -> Result<()> {
    let text = match file {
        Some(path) => std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf).context("Failed to read stdin")?;
            buf
        }
    };

    let extraction = Extractor::extract_traced(&text);
    if json {
        println!("{}", serde_json::to_string_pretty(&extraction)?);
    } else {
        print!("{}", RecordReport(&extraction.record));
        if let Some(m) = extraction.name_match {
            info!(line = m.line, source = %m.source, "Name resolved");
        }
    }
    Ok(())
}

pub async fn scan(config: &Config, image: PathBuf, region: Option<Rect>, save: bool, json: bool) -> Result<()> {
    let ctx = AppContext::from_config(config).await?;
    info!(image = %image.display(), "Scanning image");

    let outcome = ctx
        .scan_file(image.clone(), region)
        .await
        .with_context(|| format!("Failed to scan {}", image.display()))?;
    let saved = if save { Some(ctx.persist(&outcome).await?) } else { None };

    print_report(&ScanReport::new(&outcome, saved.as_ref()), json)
}

pub async fn watch(config: &Config, dir: PathBuf) -> Result<()> {
    let ctx = AppContext::from_config(config).await?;
    tokio::fs::create_dir_all(&dir)
        .await
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    // The channel bridges the notify watcher thread and the async processor.
    let (tx, mut rx) = mpsc::channel::<PathBuf>(64);
    let _watcher = idscan_ocr::spawn_intake_watcher(&dir, tx).context("Failed to start folder watcher")?;
    info!(dir = %dir.display(), "Watching for new images, Ctrl-C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Stopping watcher");
                return Ok(());
            }
            Some(path) = rx.recv() => {
                tokio::time::sleep(WATCH_SETTLE).await;
                info!(path = %path.display(), "Processing new image");
                match ctx.scan_file(path.clone(), None).await {
                    Ok(outcome) => match ctx.persist(&outcome).await {
                        Ok(saved) => print_report(&ScanReport::new(&outcome, Some(&saved)), false)?,
                        Err(e) => warn!(path = %path.display(), "Failed to store scan: {e:#}"),
                    },
                    Err(e) => warn!(path = %path.display(), "Capture failed: {e:#}"),
                }
            }
        }
    }
}

pub async fn history(config: &Config, limit: u32, json: bool) -> Result<()> {
    let db = open_db(config).await?;
    let scans = idscan_storage::get_recent_scans(&db, limit).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&scans)?);
        return Ok(());
    }
    if scans.is_empty() {
        println!("No scans recorded.");
        return Ok(());
    }
    for s in &scans {
        let r = &s.record;
        println!(
            "{:>5}  {}  {:<8}  {:<30}  {:<8}  {}",
            s.id,
            s.captured_at,
            or_dash(&r.student_no),
            or_dash(&r.name),
            or_dash(&r.course),
            or_dash(&r.year),
        );
    }
    Ok(())
}

fn or_dash(s: &str) -> &str {
    if s.is_empty() {
        "-"
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use idscan_ocr::MockRecognizer;
    use image::{ImageBuffer, Rgb};

    async fn test_context(dir: &Path, recognizer: MockRecognizer) -> AppContext {
        let backend: Box<dyn OcrBackend> = Box::new(recognizer);
        AppContext {
            pipeline: Arc::new(ScanPipeline::new(backend)),
            store: ScanStore::new(dir),
            db: idscan_storage::create_memory_db().await.unwrap(),
            timeout: Duration::from_secs(10),
        }
    }

    fn frame() -> RgbImage {
        ImageBuffer::from_fn(320, 240, |x, _| if x % 7 == 0 { Rgb([0, 0, 0]) } else { Rgb([250, 250, 250]) })
    }

    #[tokio::test]
    async fn scan_and_persist() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path(), MockRecognizer::new("1234-56\nNAME: John Smith\nBSIT\nSECOND YEAR")).await;

        let outcome = ctx.scan_frame(frame(), None).await.unwrap();
        let saved = ctx.persist(&outcome).await.unwrap();

        assert!(saved.data_path.exists());
        let rows = idscan_storage::get_recent_scans(&ctx.db, 5).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].record.name, "John Smith");
    }

    #[tokio::test]
    async fn ocr_failure_is_an_error_and_nothing_is_stored() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path(), MockRecognizer::failing("boom")).await;

        let err = ctx.scan_frame(frame(), None).await.unwrap_err();
        assert!(err.to_string().contains("boom"), "{err:#}");
        assert!(idscan_storage::get_recent_scans(&ctx.db, 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn slow_scan_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = test_context(dir.path(), MockRecognizer::new("")).await;
        ctx.timeout = Duration::from_millis(50);

        let err = ctx
            .run_scan(|_| {
                std::thread::sleep(Duration::from_millis(500));
                Err(PipelineError::Ocr(idscan_ocr::OcrError::Engine("late".into())))
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("did not finish"));
    }

    #[tokio::test]
    async fn report_lists_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path(), MockRecognizer::new("2020-11")).await;
        let outcome = ctx.scan_frame(frame(), None).await.unwrap();

        let text = ScanReport::new(&outcome, None).render_text();
        assert!(text.contains("STUDENT NO: 2020-11\n"));
        assert!(text.contains("NAME: Not found\n"));

        let json = serde_json::to_value(ScanReport::new(&outcome, None)).unwrap();
        assert_eq!(json["record"]["student_no"], "2020-11");
        assert_eq!(json["raw_text"], "2020-11");
        assert!(json["data_path"].is_null());
    }

    #[test]
    fn dash_for_empty() {
        assert_eq!(or_dash(""), "-");
        assert_eq!(or_dash("BSIT"), "BSIT");
    }
}
