use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::process::Command;
use thiserror::Error;
use tracing::debug;

use crate::preprocess::BinaryImage;

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("Failed to encode image for OCR: {0}")]
    Encode(String),
    #[error("OCR engine error: {0}")]
    Engine(String),
    #[error("OCR engine not available: {0}")]
    NotAvailable(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Layout hint handed to the engine. Codes follow Tesseract's `--psm` numbering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageSegMode {
    Auto,
    SingleColumn,
    /// Treat the image as one uniform block of text. Used for ID cards.
    #[default]
    SingleBlock,
    SingleLine,
    SparseText,
}

impl PageSegMode {
    pub fn code(self) -> u8 {
        match self {
            PageSegMode::Auto => 3,
            PageSegMode::SingleColumn => 4,
            PageSegMode::SingleBlock => 6,
            PageSegMode::SingleLine => 7,
            PageSegMode::SparseText => 11,
        }
    }
}

impl fmt::Display for PageSegMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Abstraction over an OCR engine.
///
/// `recognize` blocks until the engine returns and has no timeout of its own.
pub trait OcrBackend: Send + Sync {
    fn recognize(&self, image: &BinaryImage, mode: PageSegMode) -> Result<String, OcrError>;
}

impl<T: OcrBackend + ?Sized> OcrBackend for Box<T> {
    fn recognize(&self, image: &BinaryImage, mode: PageSegMode) -> Result<String, OcrError> {
        (**self).recognize(image, mode)
    }
}

// ── Mock backend (always available, used for tests) ───────────────────────────

/// Returns a pre-set string, or a pre-set failure.
pub struct MockRecognizer {
    pub text: String,
    pub fail_with: Option<String>,
}

impl MockRecognizer {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), fail_with: None }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self { text: String::new(), fail_with: Some(message.into()) }
    }
}

impl OcrBackend for MockRecognizer {
    fn recognize(&self, _image: &BinaryImage, _mode: PageSegMode) -> Result<String, OcrError> {
        match &self.fail_with {
            Some(message) => Err(OcrError::Engine(message.clone())),
            None => Ok(self.text.clone()),
        }
    }
}

// ── Tesseract executable ──────────────────────────────────────────────────────

/// Runs the `tesseract` command-line program on a temporary PNG and reads the
/// text from its stdout.
#[derive(Debug, Clone)]
pub struct TesseractCli {
    pub executable: PathBuf,
    pub tessdata_dir: Option<PathBuf>,
    pub language: String,
}

impl Default for TesseractCli {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("tesseract"),
            tessdata_dir: None,
            language: "eng".to_string(),
        }
    }
}

impl TesseractCli {
    pub fn new(executable: impl Into<PathBuf>, tessdata_dir: Option<PathBuf>, language: &str) -> Self {
        Self { executable: executable.into(), tessdata_dir, language: language.to_string() }
    }

    fn command(&self, input: &std::path::Path, mode: PageSegMode) -> Command {
        let mut cmd = Command::new(&self.executable);
        cmd.arg(input).arg("stdout");
        if let Some(dir) = &self.tessdata_dir {
            cmd.arg("--tessdata-dir").arg(dir);
        }
        cmd.arg("-l").arg(&self.language).arg("--psm").arg(mode.code().to_string());
        cmd
    }
}

impl OcrBackend for TesseractCli {
    fn recognize(&self, image: &BinaryImage, mode: PageSegMode) -> Result<String, OcrError> {
        let input = tempfile::Builder::new().prefix("idscan-").suffix(".png").tempfile()?;
        image
            .as_gray()
            .save_with_format(input.path(), image::ImageFormat::Png)
            .map_err(|e| OcrError::Encode(e.to_string()))?;

        debug!(executable = %self.executable.display(), psm = mode.code(), "Running tesseract");
        let output = self.command(input.path(), mode).output().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                OcrError::NotAvailable(format!("'{}' not found", self.executable.display()))
            } else {
                OcrError::Io(e)
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::Engine(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

// ── Tesseract library backend (optional, gated behind `tesseract` feature) ─────

#[cfg(feature = "tesseract")]
pub mod tesseract_backend {
    use super::{OcrBackend, OcrError, PageSegMode};
    use crate::preprocess::BinaryImage;
    use leptess::{LepTess, Variable};

    pub struct TesseractRecognizer {
        data_path: Option<String>,
        lang: String,
    }

    impl TesseractRecognizer {
        pub fn new(data_path: Option<String>, lang: &str) -> Self {
            Self { data_path, lang: lang.to_string() }
        }
    }

    impl OcrBackend for TesseractRecognizer {
        fn recognize(&self, image: &BinaryImage, mode: PageSegMode) -> Result<String, OcrError> {
            let png = image.to_png_bytes().map_err(|e| OcrError::Encode(e.to_string()))?;
            let mut lt = LepTess::new(self.data_path.as_deref(), &self.lang)
                .map_err(|e| OcrError::Engine(e.to_string()))?;
            lt.set_variable(Variable::TesseditPagesegMode, &mode.code().to_string())
                .map_err(|e| OcrError::Engine(e.to_string()))?;
            lt.set_image_from_mem(&png)
                .map_err(|e| OcrError::Encode(e.to_string()))?;
            lt.get_utf8_text().map_err(|e| OcrError::Engine(e.to_string()))
        }
    }
}
