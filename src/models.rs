//! Wire types for the file-transfer endpoints (§6): `/file/upload`,
//! `/file/multipart_upload`, `/request-download-attachments`. Grounded on
//! `examples/original_source/app/types/messages.py`'s upload/download request
//! shapes; field names follow it where the distilled spec is silent.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct FileUploadResponse {
    pub status: &'static str,
    pub requires_multipart: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommended_part_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl FileUploadResponse {
    pub fn requires_multipart(recommended_part_size: u64) -> Self {
        Self {
            status: "success",
            requires_multipart: true,
            recommended_part_size: Some(recommended_part_size),
            filename: None,
            path: None,
            size: None,
        }
    }

    pub fn stored(filename: String, path: String, size: u64) -> Self {
        Self {
            status: "success",
            requires_multipart: false,
            recommended_part_size: None,
            filename: Some(filename),
            path: Some(path),
            size: Some(size),
        }
    }
}

/// `POST /file/multipart_upload`: one server-side call given an existing
/// local file path and a part size — the server slices, stores, and
/// concatenates, returning the final location (§6, scenario 6).
#[derive(Debug, Clone, Deserialize)]
pub struct MultipartUploadRequest {
    pub path: String,
    pub part_size: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MultipartUploadResponse {
    pub status: &'static str,
    pub filename: String,
    pub path: String,
    pub size: u64,
    pub part_count: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DownloadAttachment {
    pub url: String,
    pub filename: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequestDownloadAttachmentsRequest {
    pub attachments: Vec<DownloadAttachment>,
    #[serde(default)]
    pub subfolder: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadedAttachment {
    pub filename: String,
    pub path: String,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestDownloadAttachmentsResponse {
    pub status: &'static str,
    pub downloaded: Vec<DownloadedAttachment>,
}
