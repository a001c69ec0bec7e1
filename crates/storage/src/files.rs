use image::{GrayImage, ImageFormat, RgbImage};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::info;

use idscan_core::ScanRecord;

use crate::StorageError;

/// Paths written for one capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedScan {
    pub data_path: PathBuf,
    pub original_path: Option<PathBuf>,
    pub processed_path: Option<PathBuf>,
}

/// Writes captures into a flat output directory as
/// `id_scan_<stamp>_original.jpg`, `id_scan_<stamp>_processed.jpg` and
/// `id_scan_<stamp>_data.txt`.
#[derive(Debug, Clone)]
pub struct ScanStore {
    output_dir: PathBuf,
    save_images: bool,
}

impl ScanStore {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self { output_dir: output_dir.into(), save_images: true }
    }

    pub fn with_images(mut self, save_images: bool) -> Self {
        self.save_images = save_images;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn path_for(&self, scan: &ScanRecord, suffix: &str) -> PathBuf {
        self.output_dir.join(format!("id_scan_{}_{suffix}", scan.file_stamp()))
    }

    pub async fn save(
        &self,
        scan: &ScanRecord,
        original: &RgbImage,
        processed: &GrayImage,
    ) -> Result<SavedScan, StorageError> {
        tokio::fs::create_dir_all(&self.output_dir).await?;

        let (original_path, processed_path) = if self.save_images {
            let original_path = self.path_for(scan, "original.jpg");
            tokio::fs::write(&original_path, encode_jpeg(original)?).await?;
            let processed_path = self.path_for(scan, "processed.jpg");
            tokio::fs::write(&processed_path, encode_jpeg(processed)?).await?;
            (Some(original_path), Some(processed_path))
        } else {
            (None, None)
        };

        let data_path = self.path_for(scan, "data.txt");
        let contents = data_file_contents(scan, original_path.as_deref(), processed_path.as_deref());
        tokio::fs::write(&data_path, contents).await?;

        info!(path = %data_path.display(), "Saved scan");
        Ok(SavedScan { data_path, original_path, processed_path })
    }
}

fn encode_jpeg<P>(img: &image::ImageBuffer<P, Vec<u8>>) -> Result<Vec<u8>, StorageError>
where
    P: image::PixelWithColorType<Subpixel = u8>,
{
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg)?;
    Ok(buf)
}

/// Header lines followed by the labeled record block. Image lines are
/// omitted when the images were not written.
pub fn data_file_contents(scan: &ScanRecord, original: Option<&Path>, processed: Option<&Path>) -> String {
    let mut out = format!("Scan Date: {}\n", scan.captured_at.format("%Y-%m-%d %H:%M:%S"));
    if let Some(p) = original {
        out.push_str(&format!("Original Image: {}\n", p.display()));
    }
    if let Some(p) = processed {
        out.push_str(&format!("Processed Image: {}\n", p.display()));
    }
    out.push_str(&scan.to_labeled_text());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};
    use idscan_core::ExtractedRecord;
    use image::{ImageBuffer, Luma, Rgb};

    fn scan() -> ScanRecord {
        let record = ExtractedRecord {
            student_no: "1234-56".into(),
            name: "John Smith".into(),
            course: "BSIT".into(),
            year: "SECOND YEAR".into(),
        };
        let at = Local.with_ymd_and_hms(2026, 10, 15, 14, 22, 33).unwrap();
        ScanRecord::new(record, "1234-56\nNAME: John Smith", at)
    }

    fn images() -> (RgbImage, GrayImage) {
        (
            ImageBuffer::from_fn(16, 8, |_, _| Rgb([200, 10, 10])),
            ImageBuffer::from_fn(16, 8, |x, _| Luma([if x % 2 == 0 { 0 } else { 255 }])),
        )
    }

    #[test]
    fn data_file_layout() {
        let text = data_file_contents(
            &scan(),
            Some(Path::new("out/a_original.jpg")),
            Some(Path::new("out/a_processed.jpg")),
        );
        assert_eq!(
            text,
            "Scan Date: 2026-10-15 14:22:33\n\
             Original Image: out/a_original.jpg\n\
             Processed Image: out/a_processed.jpg\n\
             STUDENT NO: 1234-56\n\
             NAME: John Smith\n\
             COURSE: BSIT\n\
             YEAR: SECOND YEAR\n\
             \n\
             Raw OCR Text:\n\
             1234-56\n\
             NAME: John Smith\n"
        );
    }

    #[tokio::test]
    async fn save_writes_three_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = ScanStore::new(dir.path().join("id_screenshots"));
        let (original, processed) = images();

        let saved = store.save(&scan(), &original, &processed).await.unwrap();

        let out = dir.path().join("id_screenshots");
        assert_eq!(saved.data_path, out.join("id_scan_20261015_142233_data.txt"));
        assert_eq!(saved.original_path, Some(out.join("id_scan_20261015_142233_original.jpg")));
        assert!(saved.original_path.as_ref().unwrap().exists());
        assert!(saved.processed_path.as_ref().unwrap().exists());

        let reloaded = image::open(saved.original_path.as_ref().unwrap()).unwrap();
        assert_eq!((reloaded.width(), reloaded.height()), (16, 8));

        let text = std::fs::read_to_string(&saved.data_path).unwrap();
        assert!(text.starts_with("Scan Date: 2026-10-15 14:22:33\nOriginal Image: "));
        assert!(text.contains("NAME: John Smith\n"));
    }

    #[tokio::test]
    async fn images_can_be_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = ScanStore::new(dir.path()).with_images(false);
        let (original, processed) = images();

        let saved = store.save(&scan(), &original, &processed).await.unwrap();

        assert_eq!(saved.original_path, None);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
        let text = std::fs::read_to_string(&saved.data_path).unwrap();
        assert!(text.starts_with("Scan Date: 2026-10-15 14:22:33\nSTUDENT NO: 1234-56\n"));
    }
}
