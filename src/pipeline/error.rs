//! Error taxonomy for the acquisition / extraction / install pipeline.

use std::fmt;
use std::path::PathBuf;

use crate::backends::BackendKind;

/// Every failure the pipeline can surface. Stages return these as-is; the
/// orchestrator wraps them in a [`StageFailure`] without reinterpreting them.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Transport failure talking to a remote host.
    #[error("failed to GET '{url}': {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The remote host answered with a non-success status.
    #[error("HTTP {status} for '{url}'")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
    },

    /// Computed checksum differs from the published one.
    #[error("checksum mismatch for '{}': expected {expected}, got {actual}", path.display())]
    IntegrityMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// Create / write / mkdir failure, with the offending path.
    #[error("I/O error at '{}': {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The archive cannot be read as a valid container.
    #[error("invalid archive '{}': {message}", path.display())]
    ArchiveFormat { path: PathBuf, message: String },

    /// Extraction finished but nothing matches the backend's entry suffix.
    #[error("no '{}' file for {backend} found in '{}'", backend.entry_suffix(), dir.display())]
    EntryPointNotFound { backend: BackendKind, dir: PathBuf },

    /// More than one extracted file matches the backend's entry suffix.
    #[error("{} '{}' files for {backend} found in '{}'", candidates.len(), backend.entry_suffix(), dir.display())]
    AmbiguousEntryPoint {
        backend: BackendKind,
        dir: PathBuf,
        candidates: Vec<PathBuf>,
    },

    #[error("hypervisor '{0}' isn't supported")]
    UnsupportedBackend(String),

    /// A required host tool is absent or did not answer as expected.
    #[error("{tool} is not available: {detail}")]
    ToolMissing { tool: String, detail: String },

    /// The hypervisor's own tooling reported a failure.
    #[error("{backend} import failed: {detail}")]
    ImportFailed { backend: BackendKind, detail: String },

    /// A backend step was requested before the step it depends on.
    #[error("{backend}: cannot {step} while {state}")]
    OutOfOrder {
        backend: BackendKind,
        step: &'static str,
        state: &'static str,
    },
}

/// Coarse classification matching the documented failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Network,
    IntegrityMismatch,
    Filesystem,
    ArchiveFormat,
    EntryPointNotFound,
    UnsupportedBackend,
    ToolMissing,
    ImportFailed,
}

impl PipelineError {
    pub fn filesystem(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }

    pub fn network(source: reqwest::Error, url: impl Into<String>) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    pub fn archive_format(message: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::ArchiveFormat {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn tool_missing(tool: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::ToolMissing {
            tool: tool.into(),
            detail: detail.into(),
        }
    }

    pub fn import_failed(backend: BackendKind, detail: impl Into<String>) -> Self {
        Self::ImportFailed {
            backend,
            detail: detail.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network { .. } | Self::HttpStatus { .. } => ErrorKind::Network,
            Self::IntegrityMismatch { .. } => ErrorKind::IntegrityMismatch,
            Self::Filesystem { .. } => ErrorKind::Filesystem,
            Self::ArchiveFormat { .. } => ErrorKind::ArchiveFormat,
            Self::EntryPointNotFound { .. } | Self::AmbiguousEntryPoint { .. } => {
                ErrorKind::EntryPointNotFound
            }
            Self::UnsupportedBackend(_) => ErrorKind::UnsupportedBackend,
            Self::ToolMissing { .. } => ErrorKind::ToolMissing,
            Self::ImportFailed { .. } | Self::OutOfOrder { .. } => ErrorKind::ImportFailed,
        }
    }
}

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Resolve,
    Checksum,
    Fetch,
    Extract,
    Check,
    Prepare,
    Import,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Resolve => "resolve",
            Stage::Checksum => "checksum",
            Stage::Fetch => "fetch",
            Stage::Extract => "extract",
            Stage::Check => "check",
            Stage::Prepare => "prepare",
            Stage::Import => "import",
        }
    }

    /// What the user can do before re-running.
    pub fn resume_hint(&self) -> &'static str {
        match self {
            Stage::Resolve => "nothing was written; pick a supported hypervisor and re-run",
            Stage::Checksum => {
                "nothing was downloaded; check the network connection and re-run"
            }
            Stage::Fetch => {
                "the archive was left on disk for inspection; remove it if it is corrupt and re-run"
            }
            Stage::Extract => {
                "archive is downloaded and valid; already extracted files are kept, re-run extraction"
            }
            Stage::Check => {
                "files are extracted; install the hypervisor command line tools and re-run"
            }
            Stage::Prepare => {
                "files are extracted; remove any partially converted VM files and re-run"
            }
            Stage::Import => {
                "the VM files are ready; import them manually or re-run after fixing the hypervisor"
            }
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stage failure, carrying the untouched cause.
#[derive(Debug, thiserror::Error)]
#[error("{stage} failed: {cause} ({})", stage.resume_hint())]
pub struct StageFailure {
    pub stage: Stage,
    #[source]
    pub cause: PipelineError,
}

impl StageFailure {
    pub fn new(stage: Stage, cause: PipelineError) -> Self {
        Self { stage, cause }
    }

    pub fn kind(&self) -> ErrorKind {
        self.cause.kind()
    }
}
