//! Local object storage (§6 `/file/*`, §9 upload part handle).
//!
//! Grounded on `examples/original_source/app/helpers/local_storage.py`: a flat
//! directory of uploaded files, plus a `tmp/<timestamp>/` scratch area for
//! multipart assembly. The original stored each part's local path under a field
//! literally named `etag` (meant for an S3-style `ETag`); per the §9 open
//! question this implementation calls that field `handle` instead, since
//! nothing here computes a real content-addressed ETag.

use std::path::{Path, PathBuf};

use chrono::Local;
use serde::Serialize;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::{HostError, HostResult};

/// Files at or above this size must go through the multipart path.
pub const MULTIPART_THRESHOLD: u64 = 10 * 1024 * 1024;

pub struct LocalStorage {
    base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadedFile {
    pub filename: String,
    pub path: String,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PartHandle {
    pub part_number: u32,
    pub handle: String,
}

impl LocalStorage {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    fn timestamp() -> String {
        Local::now().format("%Y%m%d_%H%M%S").to_string()
    }

    /// Appends `_<timestamp>` before the extension so repeated uploads of the
    /// same logical name never collide.
    pub fn unique_filename(original: &str) -> String {
        let path = Path::new(original);
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("file");
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => format!("{stem}_{}.{ext}", Self::timestamp()),
            None => format!("{stem}_{}", Self::timestamp()),
        }
    }

    pub async fn ensure_dir(&self) -> HostResult<()> {
        fs::create_dir_all(&self.base_dir).await?;
        Ok(())
    }

    /// Stores `bytes` under a unique name derived from `original_filename` and
    /// returns the file's on-disk location and size.
    pub async fn upload(&self, original_filename: &str, bytes: &[u8]) -> HostResult<UploadedFile> {
        self.ensure_dir().await?;
        let filename = Self::unique_filename(original_filename);
        let path = self.base_dir.join(&filename);
        fs::write(&path, bytes).await?;
        Ok(UploadedFile {
            filename,
            path: path.to_string_lossy().into_owned(),
            size: bytes.len() as u64,
        })
    }

    /// Writes one part of a multipart upload into a per-session tmp directory,
    /// returning a handle (its local path) rather than a computed ETag.
    pub async fn upload_part(
        &self,
        session_dir: &str,
        part_number: u32,
        bytes: &[u8],
    ) -> HostResult<PartHandle> {
        let dir = self.base_dir.join("tmp").join(session_dir);
        fs::create_dir_all(&dir).await?;
        let part_path = dir.join(format!("part_{part_number:05}"));
        fs::write(&part_path, bytes).await?;
        Ok(PartHandle {
            part_number,
            handle: part_path.to_string_lossy().into_owned(),
        })
    }

    /// Allocates a fresh `tmp/<timestamp>/` scratch directory for a new
    /// multipart upload session.
    pub fn new_session_dir(&self) -> String {
        Self::timestamp()
    }

    /// Concatenates parts in ascending `part_number` order into `output_path`
    /// under the storage root and returns its final location.
    pub async fn combine_parts(
        &self,
        mut parts: Vec<PartHandle>,
        output_filename: &str,
    ) -> HostResult<UploadedFile> {
        parts.sort_by_key(|p| p.part_number);
        self.ensure_dir().await?;
        let output_path = self.base_dir.join(Self::unique_filename(output_filename));
        let mut out = fs::File::create(&output_path).await?;
        let mut total: u64 = 0;
        for part in &parts {
            let data = fs::read(&part.handle).await?;
            total += data.len() as u64;
            out.write_all(&data).await?;
        }
        out.flush().await?;
        Ok(UploadedFile {
            filename: output_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            path: output_path.to_string_lossy().into_owned(),
            size: total,
        })
    }

    pub fn path_of(&self, filename: &str) -> PathBuf {
        self.base_dir.join(filename)
    }

    /// `/file/multipart_upload`: reads an existing file at `source_path`,
    /// slices it server-side into `part_size`-byte chunks, stores each part
    /// under a fresh `tmp/<session>/` directory, then concatenates them back
    /// into a single file under the storage root. The tmp directory is
    /// removed once the combined file is written.
    pub async fn multipart_upload_from_path(
        &self,
        source_path: &Path,
        part_size: u64,
    ) -> HostResult<(UploadedFile, u32)> {
        if part_size == 0 {
            return Err(HostError::Validation("part_size must be greater than zero".into()));
        }
        let data = fs::read(source_path).await.map_err(|_| {
            HostError::NotFound(format!("{} does not exist", source_path.display()))
        })?;
        let filename = source_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());

        let session_dir = self.new_session_dir();
        let part_size = part_size as usize;
        let mut parts = Vec::new();
        for (i, chunk) in data.chunks(part_size.max(1)).enumerate() {
            let part = self.upload_part(&session_dir, (i + 1) as u32, chunk).await?;
            parts.push(part);
        }
        let part_count = parts.len() as u32;

        let combined = self.combine_parts(parts, &filename).await?;

        let tmp_dir = self.base_dir.join("tmp").join(&session_dir);
        fs::remove_dir_all(&tmp_dir).await.ok();

        Ok((combined, part_count))
    }
}

/// Downloads `url` and stores it under `upload_dir/subfolder?/filename`.
pub async fn download_to(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
) -> HostResult<u64> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| HostError::Internal(format!("download request failed: {e}")))?;
    let bytes = response
        .bytes()
        .await
        .map_err(|e| HostError::Internal(format!("download body read failed: {e}")))?;
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::write(dest, &bytes).await?;
    Ok(bytes.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_filename_inserts_timestamp_before_extension() {
        let name = LocalStorage::unique_filename("photo.png");
        assert!(name.starts_with("photo_"));
        assert!(name.ends_with(".png"));
    }

    #[tokio::test]
    async fn upload_then_combine_parts_roundtrips_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path().to_path_buf());
        let session = storage.new_session_dir();
        let p1 = storage.upload_part(&session, 1, b"hello ").await.unwrap();
        let p2 = storage.upload_part(&session, 2, b"world").await.unwrap();
        let combined = storage
            .combine_parts(vec![p2, p1], "greeting.txt")
            .await
            .unwrap();
        let data = tokio::fs::read(&combined.path).await.unwrap();
        assert_eq!(data, b"hello world");
    }

    #[tokio::test]
    async fn multipart_upload_from_path_slices_stores_and_concatenates() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path().join("storage"));
        let source = dir.path().join("input.bin");
        let content = b"0123456789".repeat(3); // 30 bytes
        tokio::fs::write(&source, &content).await.unwrap();

        let (uploaded, part_count) = storage.multipart_upload_from_path(&source, 10).await.unwrap();
        assert_eq!(part_count, 3);
        assert_eq!(uploaded.size, 30);
        let data = tokio::fs::read(&uploaded.path).await.unwrap();
        assert_eq!(data, content);

        // the tmp session directory is cleaned up once combined
        let tmp_root = dir.path().join("storage").join("tmp");
        let remaining: Vec<_> = std::fs::read_dir(&tmp_root).unwrap().collect();
        assert!(remaining.is_empty());
    }
}
