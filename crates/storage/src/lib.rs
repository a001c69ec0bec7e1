pub mod db;
pub mod files;

use thiserror::Error;

pub use db::{create_db, create_memory_db, get_recent_scans, get_scans_by_student_no, insert_scan, DbPool, StoredScan};
pub use files::{data_file_contents, SavedScan, ScanStore};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Failed to encode image: {0}")]
    Image(#[from] image::ImageError),
}
