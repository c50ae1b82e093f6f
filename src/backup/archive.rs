// snapshotdump/src/backup/archive.rs
use chrono::{DateTime, Local};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs::File;
use std::path::{Path, PathBuf};
use tar::Builder;
use tracing::info;
use walkdir::WalkDir;

use crate::errors::{AppError, Result};

/// `<YYYY-MM-DD--HH-MM>-<source instance>.tar.gz`
pub fn archive_file_name(now: DateTime<Local>, source_instance_id: &str) -> String {
    format!("{}-{}.tar.gz", now.format("%Y-%m-%d--%H-%M"), source_instance_id)
}

/// Creates a GZipped TAR archive from a source directory.
///
/// Entries are stored below the source directory's own name
/// (`out/app-snap.dump` for `/out`). When `archive_dest_path` lies inside
/// `source_dir` it is left out of the archive.
pub fn create_tar_gz_archive(source_dir: &Path, archive_dest_path: &Path) -> Result<PathBuf> {
    if !source_dir.is_dir() {
        return Err(AppError::Archive(format!(
            "Source for archival is not a directory: {}",
            source_dir.display()
        )));
    }
    if let Some(parent) = archive_dest_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }

    info!(
        "🗜 Compressing {} into {}",
        source_dir.display(),
        archive_dest_path.display()
    );

    let root_name = source_dir
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("out"));

    let archive_file = File::create(archive_dest_path)?;
    // Compare against the file we just created, whatever spelling the caller used.
    let dest_canonical = archive_dest_path.canonicalize()?;

    let enc = GzEncoder::new(archive_file, Compression::default());
    let mut tar_builder = Builder::new(enc);

    for entry in WalkDir::new(source_dir).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            AppError::Archive(format!("Failed to walk directory {}: {}", source_dir.display(), e))
        })?;
        let path = entry.path();
        let relative = path.strip_prefix(source_dir).map_err(|e| {
            AppError::Archive(format!(
                "Failed to strip prefix {} from {}: {}",
                source_dir.display(),
                path.display(),
                e
            ))
        })?;
        let name = root_name.join(relative);

        if entry.file_type().is_dir() {
            tar_builder.append_dir(&name, path)?;
        } else if entry.file_type().is_file() {
            if path.canonicalize()? == dest_canonical {
                continue;
            }
            tar_builder.append_path_with_name(path, &name)?;
        }
    }

    let encoder = tar_builder.into_inner()?;
    encoder.finish()?;

    info!("✓ Archive created at {}", archive_dest_path.display());
    Ok(archive_dest_path.to_path_buf())
}
