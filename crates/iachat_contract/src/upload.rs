use serde::{Deserialize, Serialize};

/// Path the drop client posts to.
pub const UPLOAD_PATH: &str = "/upload";

/// Multipart field name shared by every file part.
pub const UPLOAD_FIELD: &str = "file";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadedFile {
    pub upload_id: String,
    pub file_name: String,
    pub stored_name: String,
    pub size_bytes: u64,
    pub media_type: String,
    pub uploaded_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// Body of a successful `POST /upload`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadAck {
    pub ok: bool,
    pub files: Vec<UploadedFile>,
}

impl UploadAck {
    pub fn new(files: Vec<UploadedFile>) -> Self {
        Self { ok: true, files }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UploadErrorCode {
    NoFiles,
    InvalidMultipart,
    InternalError,
}

/// Body of a rejected `POST /upload`. Always JSON so the client can parse it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadFailure {
    pub ok: bool,
    pub error: UploadErrorCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl UploadFailure {
    pub fn new(error: UploadErrorCode, detail: Option<String>) -> Self {
        Self {
            ok: false,
            error,
            detail,
        }
    }
}
