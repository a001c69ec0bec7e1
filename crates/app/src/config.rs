use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use idscan_ocr::{MockRecognizer, OcrBackend, PageSegMode, TesseractCli};

pub const CONFIG_FILE_NAME: &str = "idscan.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub ocr: OcrConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    #[default]
    TesseractCli,
    Mock,
    /// In-process libtesseract, only with the `tesseract` feature.
    #[cfg(feature = "tesseract")]
    Tesseract,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OcrConfig {
    pub backend: BackendKind,
    pub tesseract_path: PathBuf,
    pub tessdata_dir: Option<PathBuf>,
    pub language: String,
    pub page_seg_mode: PageSegMode,
    /// Upper bound on a single recognition call.
    pub timeout_secs: u64,
    /// Text returned by the `mock` backend.
    pub mock_text: String,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            tesseract_path: PathBuf::from("tesseract"),
            tessdata_dir: None,
            language: "eng".to_string(),
            page_seg_mode: PageSegMode::SingleBlock,
            timeout_secs: 30,
            mock_text: String::new(),
        }
    }
}

impl OcrConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    pub fn build_backend(&self) -> Box<dyn OcrBackend> {
        match self.backend {
            BackendKind::TesseractCli => Box::new(TesseractCli::new(
                &self.tesseract_path,
                self.tessdata_dir.clone(),
                &self.language,
            )),
            BackendKind::Mock => Box::new(MockRecognizer::new(self.mock_text.clone())),
            #[cfg(feature = "tesseract")]
            BackendKind::Tesseract => Box::new(idscan_ocr::recognizer::tesseract_backend::TesseractRecognizer::new(
                self.tessdata_dir.as_ref().map(|p| p.display().to_string()),
                &self.language,
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub output_dir: PathBuf,
    /// Scan index. Defaults to `idscan.db` inside `output_dir`.
    pub database: Option<PathBuf>,
    pub save_images: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("id_screenshots"),
            database: None,
            save_images: true,
        }
    }
}

impl StorageConfig {
    pub fn database_path(&self) -> PathBuf {
        self.database
            .clone()
            .unwrap_or_else(|| self.output_dir.join("idscan.db"))
    }
}

impl Config {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Loads `explicit` if given (it must exist), otherwise the per-user
    /// config file if there is one, otherwise defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(p) => p.to_path_buf(),
            None => match default_config_path() {
                Some(p) if p.exists() => p,
                _ => {
                    tracing::debug!("No config file found, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "Loaded config");
        Self::from_toml_str(&content)
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("com", "idscan", "idscan")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.ocr.backend, BackendKind::TesseractCli);
        assert_eq!(config.ocr.page_seg_mode, PageSegMode::SingleBlock);
        assert_eq!(config.storage.output_dir, PathBuf::from("id_screenshots"));
        assert_eq!(config.storage.database_path(), PathBuf::from("id_screenshots/idscan.db"));
    }

    #[test]
    fn full_file() {
        let config = Config::from_toml_str(
            r#"
            [ocr]
            backend = "mock"
            tesseract_path = "/usr/local/bin/tesseract"
            tessdata_dir = "/usr/share/tessdata"
            language = "eng+spa"
            page_seg_mode = "sparse_text"
            timeout_secs = 5
            mock_text = "1234-56"

            [storage]
            output_dir = "/tmp/scans"
            database = "/tmp/index.db"
            save_images = false
            "#,
        )
        .unwrap();

        assert_eq!(config.ocr.backend, BackendKind::Mock);
        assert_eq!(config.ocr.tessdata_dir, Some(PathBuf::from("/usr/share/tessdata")));
        assert_eq!(config.ocr.page_seg_mode, PageSegMode::SparseText);
        assert_eq!(config.ocr.timeout(), Duration::from_secs(5));
        assert_eq!(config.storage.database_path(), PathBuf::from("/tmp/index.db"));
        assert!(!config.storage.save_images);
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config = Config::from_toml_str("[ocr]\nlanguage = \"fil\"\n").unwrap();
        assert_eq!(config.ocr.language, "fil");
        assert_eq!(config.ocr.timeout_secs, 30);
        assert!(config.storage.save_images);
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let err = Config::from_toml_str("[ocr]\nbackend = \"cloud\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn unknown_key_is_rejected() {
        assert!(Config::from_toml_str("[storage]\noutput = \"x\"\n").is_err());
    }

    #[test]
    fn zero_timeout_is_clamped() {
        let config = Config::from_toml_str("[ocr]\ntimeout_secs = 0\n").unwrap();
        assert_eq!(config.ocr.timeout(), Duration::from_secs(1));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err = Config::load(Some(Path::new("/nonexistent/idscan.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn explicit_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[ocr]\nbackend = \"mock\"\nmock_text = \"NAME: Ana Reyes\"\n").unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.ocr.mock_text, "NAME: Ana Reyes");
    }

    #[test]
    fn mock_backend_returns_configured_text() {
        let config = Config::from_toml_str("[ocr]\nbackend = \"mock\"\nmock_text = \"2020-11\"\n").unwrap();
        let backend = config.ocr.build_backend();
        let region = idscan_ocr::PixelRegion::new(image::RgbImage::new(4, 4)).unwrap();
        let text = backend
            .recognize(&idscan_ocr::binarize(&region), PageSegMode::SingleBlock)
            .unwrap();
        assert_eq!(text, "2020-11");
    }
}
