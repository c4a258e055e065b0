use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use reqwest::Client;
use tracing::{info, warn};

use crate::catalog::{ChecksumKind, HexCase};
use crate::settings::Settings;

use super::error::PipelineError;
use super::progress::ProgressObserver;
use super::stream::{HashingWriter, ProgressWriter, hash_file};

/// A downloaded (or previously downloaded) archive whose checksum matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalArchive {
    path: PathBuf,
    expected_checksum: String,
}

impl LocalArchive {
    pub fn new(path: impl Into<PathBuf>, expected_checksum: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            expected_checksum: expected_checksum.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn expected_checksum(&self) -> &str {
        &self.expected_checksum
    }
}

/// Streams a remote archive to disk while hashing it in the same pass.
#[derive(Debug, Clone)]
pub struct StreamingFetcher {
    client: Client,
    user_agent: String,
    checksum: ChecksumKind,
    hex_case: HexCase,
    progress_step: u64,
}

impl StreamingFetcher {
    pub fn new(client: Client, settings: &Settings) -> Self {
        Self {
            client,
            user_agent: settings.user_agent().to_string(),
            checksum: settings.checksum(),
            hex_case: settings.hex_case(),
            progress_step: settings.progress_step_bytes(),
        }
    }

    /// Make sure `destination` holds the archive published at `file_url`
    /// and that it hashes to `expected`.
    ///
    /// An existing file is never re-downloaded: it is verified in place and
    /// a mismatch is reported rather than repaired. A fresh download that
    /// fails verification is left on disk.
    pub async fn fetch(
        &self,
        file_url: &str,
        destination: &Path,
        expected: &str,
        observer: &mut dyn ProgressObserver,
    ) -> Result<LocalArchive, PipelineError> {
        let exists = destination
            .try_exists()
            .map_err(|e| PipelineError::filesystem(e, destination))?;

        let actual = if exists {
            info!(path = %destination.display(), "file already exists, checking checksum");
            self.verify_existing(destination).await?
        } else {
            info!(url = %file_url, path = %destination.display(), "download");
            self.download(file_url, destination, observer).await?
        };

        info!(checksum = %actual, "local file checksum");
        if actual != expected {
            warn!(path = %destination.display(), "checksum doesn't match");
            return Err(PipelineError::IntegrityMismatch {
                path: destination.to_path_buf(),
                expected: expected.to_string(),
                actual,
            });
        }

        info!("checksum matches");
        Ok(LocalArchive::new(destination, expected))
    }

    async fn verify_existing(&self, path: &Path) -> Result<String, PipelineError> {
        let owned = path.to_path_buf();
        let kind = self.checksum;
        let case = self.hex_case;
        tokio::task::spawn_blocking(move || hash_file(&owned, kind, case))
            .await
            .map_err(|e| PipelineError::filesystem(io::Error::other(e), path))?
            .map_err(|e| PipelineError::filesystem(e, path))
    }

    async fn download(
        &self,
        file_url: &str,
        destination: &Path,
        observer: &mut dyn ProgressObserver,
    ) -> Result<String, PipelineError> {
        let res = self
            .client
            .get(file_url)
            .header("User-Agent", &self.user_agent)
            .send()
            .await
            .map_err(|e| PipelineError::network(e, file_url))?;

        let status = res.status();
        if !status.is_success() {
            return Err(PipelineError::HttpStatus {
                url: file_url.to_string(),
                status,
            });
        }

        let total = res.content_length();
        info!(bytes = ?total, "file size");

        let fs_err = |e| PipelineError::filesystem(e, destination);
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(destination)
            .map_err(fs_err)?;

        let progress = ProgressWriter::new(
            BufWriter::with_capacity(1024 * 1024, file),
            observer,
            total,
            self.progress_step,
        );
        let mut writer = HashingWriter::new(progress, self.checksum);

        // The writer pulls one chunk at a time; nothing is read ahead of the
        // disk.
        let mut stream = res.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| PipelineError::network(e, file_url))?;
            writer.write_all(&chunk).map_err(fs_err)?;
        }
        writer.flush().map_err(fs_err)?;

        let (progress, digest) = writer.finish(self.hex_case);
        let file = progress
            .into_inner()
            .into_inner()
            .map_err(|e| fs_err(e.into_error()))?;
        file.sync_all().map_err(fs_err)?;

        Ok(digest)
    }
}
