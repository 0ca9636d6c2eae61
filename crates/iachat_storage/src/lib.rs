pub mod files;
pub mod repository;

pub use files::{media_type_for, sanitize_file_name};
pub use repository::{StorageConfig, UploadRecord, UploadStore};
