//! `POST /zip-file` (§6): archives a directory into a zip, excluding build
//! artifacts; for `frontend` projects, wraps a `dist/` output into a `public/`
//! directory alongside a generated `wrangler.toml`.
//!
//! Grounded on the teacher's use of `walkdir` for recursive directory walks
//! and `zip` for archive writing (both already teacher dependencies); the
//! `wrangler.toml` template and exclusion list follow
//! `examples/original_source/`'s deploy-packaging step.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;

use crate::error::{HostError, HostResult};

const EXCLUDED_DIRS: &[&str] = &["node_modules", ".next", ".open-next", ".turbo", ".wrangler", ".git"];

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProjectType {
    Frontend,
    Backend,
    Nextjs,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ZipFileRequest {
    pub source_dir: String,
    pub project_type: ProjectType,
    #[serde(default)]
    pub output_path: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ZipFileResult {
    pub status: &'static str,
    pub archive_path: String,
    pub entry_count: u64,
}

pub fn create_archive(request: ZipFileRequest) -> HostResult<ZipFileResult> {
    let source_dir = PathBuf::from(&request.source_dir);
    if !source_dir.is_dir() {
        return Err(HostError::Validation(format!(
            "{} is not a directory",
            source_dir.display()
        )));
    }

    if request.project_type == ProjectType::Frontend {
        wrap_dist_into_public(&source_dir)?;
    }

    let output_path = request
        .output_path
        .map(PathBuf::from)
        .unwrap_or_else(|| source_dir.with_extension("zip"));

    let entry_count = write_zip(&source_dir, &output_path)?;

    Ok(ZipFileResult {
        status: "success",
        archive_path: output_path.to_string_lossy().into_owned(),
        entry_count,
    })
}

/// Moves `dist/` to `public/` and drops a Cloudflare Pages-style
/// `wrangler.toml` next to it, since frontend deploys expect that layout.
fn wrap_dist_into_public(source_dir: &Path) -> HostResult<()> {
    let dist = source_dir.join("dist");
    let public = source_dir.join("public");
    if dist.is_dir() {
        if public.exists() {
            std::fs::remove_dir_all(&public)?;
        }
        std::fs::rename(&dist, &public)?;
    }

    let project_name = source_dir
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("app");
    let wrangler_toml = format!(
        "name = \"{project_name}\"\ncompatibility_date = \"2024-01-01\"\npages_build_output_dir = \"public\"\n"
    );
    std::fs::write(source_dir.join("wrangler.toml"), wrangler_toml)?;
    Ok(())
}

fn is_excluded(entry: &walkdir::DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| EXCLUDED_DIRS.contains(&name))
        .unwrap_or(false)
}

fn write_zip(source_dir: &Path, output_path: &Path) -> HostResult<u64> {
    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(output_path)?;
    let mut writer = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    let mut entry_count = 0u64;
    let walker = WalkDir::new(source_dir).into_iter().filter_entry(|e| !is_excluded(e));
    for entry in walker {
        let entry = entry.map_err(|e| HostError::Internal(e.to_string()))?;
        let path = entry.path();
        let relative = path
            .strip_prefix(source_dir)
            .map_err(|e| HostError::Internal(e.to_string()))?;
        if relative.as_os_str().is_empty() {
            continue;
        }
        let name = relative.to_string_lossy().replace('\\', "/");

        if entry.file_type().is_dir() {
            writer
                .add_directory(format!("{name}/"), options)
                .map_err(|e| HostError::Internal(e.to_string()))?;
        } else {
            writer
                .start_file(name, options)
                .map_err(|e| HostError::Internal(e.to_string()))?;
            let mut buf = Vec::new();
            File::open(path)?.read_to_end(&mut buf)?;
            writer.write_all(&buf)?;
            entry_count += 1;
        }
    }
    writer.finish().map_err(|e| HostError::Internal(e.to_string()))?;
    Ok(entry_count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excludes_node_modules_from_the_archive() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.js"), "console.log(1)").unwrap();
        std::fs::create_dir_all(dir.path().join("node_modules/pkg")).unwrap();
        std::fs::write(dir.path().join("node_modules/pkg/index.js"), "x").unwrap();

        let output = dir.path().with_file_name("out.zip");
        let count = write_zip(dir.path(), &output).unwrap();
        assert_eq!(count, 1);

        let file = File::open(&output).unwrap();
        let archive = zip::ZipArchive::new(file).unwrap();
        assert!(archive.file_names().any(|n| n == "index.js"));
        assert!(!archive.file_names().any(|n| n.contains("node_modules")));
        std::fs::remove_file(&output).ok();
    }

    #[test]
    fn frontend_project_wraps_dist_into_public_with_wrangler_toml() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("dist")).unwrap();
        std::fs::write(dir.path().join("dist/index.html"), "<html></html>").unwrap();

        wrap_dist_into_public(dir.path()).unwrap();

        assert!(dir.path().join("public/index.html").exists());
        assert!(!dir.path().join("dist").exists());
        let toml = std::fs::read_to_string(dir.path().join("wrangler.toml")).unwrap();
        assert!(toml.contains("pages_build_output_dir = \"public\""));
    }
}
