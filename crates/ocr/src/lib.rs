pub mod extract;
pub mod pipeline;
pub mod preprocess;
pub mod recognizer;
pub mod types;

pub use extract::{title_case, Extractor, LineContext, NameCandidate, NameStrategy};
pub use pipeline::{is_image_path, spawn_intake_watcher, PipelineError, ScanOutcome, ScanPipeline};
pub use preprocess::{binarize, BinaryImage, PixelRegion, PreprocessError};
pub use recognizer::{MockRecognizer, OcrBackend, OcrError, PageSegMode, TesseractCli};
pub use types::{Extraction, KeywordRule, NameMatch, NameSource};
