use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use zip::ZipArchive;

use crate::backends::BackendKind;

use super::error::PipelineError;
use super::fetcher::LocalArchive;

/// Where the archive was unpacked and which file the backend imports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionResult {
    destination_dir: PathBuf,
    entry_point: PathBuf,
}

impl ExtractionResult {
    pub fn destination_dir(&self) -> &Path {
        &self.destination_dir
    }

    pub fn entry_point(&self) -> &Path {
        &self.entry_point
    }
}

/// Unpacks zip archives for one backend, resuming over files that are
/// already on disk.
#[derive(Debug, Clone, Copy)]
pub struct ArchiveExtractor {
    backend: BackendKind,
}

impl ArchiveExtractor {
    pub fn new(backend: BackendKind) -> Self {
        Self { backend }
    }

    /// Resolve the backend first so an unknown name costs no I/O.
    pub fn for_hypervisor(name: &str) -> Result<Self, PipelineError> {
        Ok(Self::new(name.parse()?))
    }

    /// `<dir>/image.zip` unpacks into `<dir>/image/`.
    /// A name without an extension would unpack onto the archive itself.
    pub fn destination_for(archive: &Path) -> Result<PathBuf, PipelineError> {
        if archive.extension().is_none() {
            return Err(PipelineError::archive_format("archive name has no extension", archive));
        }
        let stem = archive.file_stem().ok_or_else(|| {
            PipelineError::archive_format("archive path has no file name", archive)
        })?;
        Ok(archive.with_file_name(stem))
    }

    /// Extract next to the archive, see [`Self::destination_for`].
    pub fn extract(&self, archive: &LocalArchive) -> Result<ExtractionResult, PipelineError> {
        let destination = Self::destination_for(archive.path())?;
        self.extract_into(archive.path(), &destination)
    }

    pub fn extract_into(
        &self,
        archive_path: &Path,
        destination_dir: &Path,
    ) -> Result<ExtractionResult, PipelineError> {
        let file = File::open(archive_path).map_err(|e| PipelineError::filesystem(e, archive_path))?;
        let mut archive = ZipArchive::new(BufReader::new(file))
            .map_err(|e| PipelineError::archive_format(e.to_string(), archive_path))?;

        fs::create_dir_all(destination_dir)
            .map_err(|e| PipelineError::filesystem(e, destination_dir))?;
        info!(dir = %destination_dir.display(), "unpack data");

        let mut candidates = Vec::new();
        for index in 0..archive.len() {
            let mut entry = archive
                .by_index(index)
                .map_err(|e| PipelineError::archive_format(e.to_string(), archive_path))?;

            let relative = entry.enclosed_name().ok_or_else(|| {
                PipelineError::archive_format(
                    format!("entry '{}' escapes the destination", entry.name()),
                    archive_path,
                )
            })?;
            let target = destination_dir.join(relative);

            if entry.is_dir() {
                debug!(entry = entry.name(), "directory");
                fs::create_dir_all(&target).map_err(|e| PipelineError::filesystem(e, &target))?;
                continue;
            }

            let exists = target
                .try_exists()
                .map_err(|e| PipelineError::filesystem(e, &target))?;
            if exists {
                info!(path = %target.display(), "file already exists, skip");
                candidates.push(target);
                continue;
            }

            info!(entry = entry.name(), "unpacking");
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| PipelineError::filesystem(e, parent))?;
            }
            write_entry(&mut entry, archive_path, &target)?;
            #[cfg(unix)]
            if let Some(mode) = entry.unix_mode() {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(&target, fs::Permissions::from_mode(mode & 0o7777))
                    .map_err(|e| PipelineError::filesystem(e, &target))?;
            }
            candidates.push(target);
        }

        let entry_point = select_entry_point(self.backend, &candidates, destination_dir)?;
        info!(path = %entry_point.display(), backend = %self.backend, "entry point");

        Ok(ExtractionResult {
            destination_dir: destination_dir.to_path_buf(),
            entry_point,
        })
    }
}

/// Copy one entry, telling archive read errors apart from disk write errors.
fn write_entry(entry: &mut impl Read, archive_path: &Path, target: &Path) -> Result<(), PipelineError> {
    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(target)
        .map_err(|e| PipelineError::filesystem(e, target))?;
    let mut out = BufWriter::new(file);

    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = entry
            .read(&mut buf)
            .map_err(|e| PipelineError::archive_format(e.to_string(), archive_path))?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n])
            .map_err(|e| PipelineError::filesystem(e, target))?;
    }
    out.flush().map_err(|e| PipelineError::filesystem(e, target))
}

/// The single candidate whose name ends with the backend's entry suffix.
pub fn select_entry_point(
    backend: BackendKind,
    candidates: &[PathBuf],
    destination_dir: &Path,
) -> Result<PathBuf, PipelineError> {
    let suffix = backend.entry_suffix();
    let mut matches: Vec<&PathBuf> = candidates
        .iter()
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(suffix))
        })
        .collect();

    match matches.len() {
        0 => Err(PipelineError::EntryPointNotFound {
            backend,
            dir: destination_dir.to_path_buf(),
        }),
        1 => Ok(matches.remove(0).clone()),
        _ => Err(PipelineError::AmbiguousEntryPoint {
            backend,
            dir: destination_dir.to_path_buf(),
            candidates: matches.into_iter().cloned().collect(),
        }),
    }
}
