use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::{AppError, AppResult};

const PARTIAL_SUFFIX: &str = ".partial";

/// Result of one export write.
#[derive(Debug, Clone, Serialize)]
pub struct ExportOutcome {
    pub path: PathBuf,
    pub bytes: u64,
    pub sha256: String,
}

/// Default export file name, timestamped to avoid collisions.
pub fn default_export_filename(timestamp: &DateTime<Utc>) -> String {
    format!("releve-{}.csv", timestamp.format("%Y%m%d-%H%M%S"))
}

/// Write the export text atomically: the contents land in a `.partial`
/// sibling first, get fsynced, then rename into place. Readers never see a
/// half-written file, and a crash leaves only the partial behind.
pub fn write_export(path: &Path, contents: &str) -> AppResult<ExportOutcome> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|err| {
                AppError::from(err)
                    .with_context("operation", "create_export_dir")
                    .with_context("path", parent.display().to_string())
            })?;
        }
    }

    let tmp = tmp_path(path);
    let write_err = |err: std::io::Error| {
        AppError::from(err)
            .with_context("operation", "write_export")
            .with_context("path", tmp.display().to_string())
    };

    let mut file = File::create(&tmp).map_err(write_err)?;
    file.write_all(contents.as_bytes()).map_err(write_err)?;
    file.sync_all().map_err(write_err)?;
    drop(file);

    fs::rename(&tmp, path).map_err(|err| {
        AppError::from(err)
            .with_context("operation", "rename_export")
            .with_context("path", path.display().to_string())
    })?;

    let sha256 = file_sha256(path)?;
    let bytes = contents.len() as u64;
    info!(
        target: "releve",
        event = "export_written",
        path = %path.display(),
        bytes,
        sha256 = %sha256,
    );

    Ok(ExportOutcome {
        path: path.to_path_buf(),
        bytes,
        sha256,
    })
}

fn tmp_path(final_path: &Path) -> PathBuf {
    let mut s = OsString::from(final_path.as_os_str());
    s.push(PARTIAL_SUFFIX);
    PathBuf::from(s)
}

pub fn file_sha256(path: &Path) -> AppResult<String> {
    let mut file = File::open(path).map_err(|err| {
        AppError::from(err)
            .with_context("operation", "open_for_hashing")
            .with_context("path", path.display().to_string())
    })?;
    let mut hasher = Sha256::new();
    let mut buf = [0_u8; 8192];
    loop {
        let read = file.read(&mut buf).map_err(AppError::from)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_export_leaves_no_partial_behind() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("out.csv");
        let outcome = write_export(&path, "a;b\n1;2\n").unwrap();

        assert_eq!(outcome.path, path);
        assert_eq!(outcome.bytes, 8);
        assert_eq!(fs::read_to_string(&path).unwrap(), "a;b\n1;2\n");
        assert!(!tmp_path(&path).exists());
    }

    #[test]
    fn sha_matches_final_bytes() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("out.csv");
        let outcome = write_export(&path, "abc123").unwrap();
        let expected = format!("{:x}", Sha256::digest(b"abc123"));
        assert_eq!(outcome.sha256, expected);
    }

    #[test]
    fn creates_missing_parent_directories() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("nested/dir/out.csv");
        write_export(&path, "x").unwrap();
        assert!(path.exists());
    }

    #[test]
    fn default_filename_is_timestamped_csv() {
        let ts = DateTime::parse_from_rfc3339("2026-08-24T10:15:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(default_export_filename(&ts), "releve-20260824-101500.csv");
    }
}
