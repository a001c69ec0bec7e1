use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info};

use idscan_core::{scan_area, Rect, ScanRecord};
use image::RgbImage;

use crate::extract::Extractor;
use crate::preprocess::{self, BinaryImage, PixelRegion, PreprocessError};
use crate::recognizer::{OcrBackend, OcrError, PageSegMode};
use crate::types::NameMatch;

/// File extensions the intake watcher and `scan` accept.
pub const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "tif", "tiff"];

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Image preprocessing failed: {0}")]
    Preprocess(#[from] PreprocessError),
    #[error("OCR recognition failed: {0}")]
    Ocr(#[from] OcrError),
}

/// Everything one capture produced.
#[derive(Debug)]
pub struct ScanOutcome {
    /// The color region that was cropped from the frame.
    pub original: RgbImage,
    pub processed: BinaryImage,
    pub scan: ScanRecord,
    pub name_match: Option<NameMatch>,
}

/// Orchestrates: crop → binarize → OCR → extract.
///
/// Every call is synchronous and blocks for as long as the backend does.
pub struct ScanPipeline<R: OcrBackend> {
    recognizer: R,
    mode: PageSegMode,
}

impl<R: OcrBackend> ScanPipeline<R> {
    pub fn new(recognizer: R) -> Self {
        Self { recognizer, mode: PageSegMode::SingleBlock }
    }

    pub fn with_mode(mut self, mode: PageSegMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn mode(&self) -> PageSegMode {
        self.mode
    }

    /// Crop `rect` (default: the computed scan area) out of `frame` and process it.
    pub fn process_frame(&self, frame: &RgbImage, rect: Option<Rect>) -> Result<ScanOutcome, PipelineError> {
        let rect = rect.unwrap_or_else(|| scan_area(frame.width(), frame.height()));
        debug!(%rect, frame_width = frame.width(), frame_height = frame.height(), "Cropping scan region");
        let region = PixelRegion::from_frame(frame, rect)?;
        self.process_region(region)
    }

    /// Load an image file as a frame and process it.
    pub fn process_file(&self, path: &Path, rect: Option<Rect>) -> Result<ScanOutcome, PipelineError> {
        let frame = image::open(path).map_err(PreprocessError::from)?.to_rgb8();
        self.process_frame(&frame, rect)
    }

    pub fn process_region(&self, region: PixelRegion) -> Result<ScanOutcome, PipelineError> {
        // 1. Binarize.
        let processed = preprocess::binarize(&region);

        // 2. Run OCR.
        let raw_text = self.recognizer.recognize(&processed, self.mode)?;
        debug!(chars = raw_text.len(), "OCR returned text");

        // 3. Extract structured fields.
        let extraction = Extractor::extract_traced(&raw_text);
        info!(
            found = extraction.record.found_count(),
            student_no = %extraction.record.student_no,
            "Processed capture"
        );

        Ok(ScanOutcome {
            original: region.into_rgb(),
            processed,
            scan: ScanRecord::now(extraction.record, raw_text),
            name_match: extraction.name_match,
        })
    }
}

pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

// ── Watch-folder integration ──────────────────────────────────────────────────

/// Spawn a notify watcher on `watch_dir` that sends newly created image paths to `tx`.
/// The returned watcher must be kept alive for watching to continue.
pub fn spawn_intake_watcher(
    watch_dir: &Path,
    tx: mpsc::Sender<PathBuf>,
) -> notify::Result<impl notify::Watcher> {
    use notify::{EventKind, RecursiveMode, Watcher};

    let mut watcher = notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
        if let Ok(ev) = event {
            if matches!(ev.kind, EventKind::Create(_)) {
                for path in ev.paths.into_iter().filter(|p| is_image_path(p)) {
                    let _ = tx.try_send(path);
                }
            }
        }
    })?;

    watcher.watch(watch_dir, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
