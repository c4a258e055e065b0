use serde::{Deserialize, Serialize};

use crate::catalog::{ChecksumKind, HexCase};

pub const DEFAULT_CATALOG_URL: &str =
    "https://dev.windows.com/en-us/microsoft-edge/tools/vms/windows/";
pub const DEFAULT_USER_AGENT: &str = "vm-image-installer-rust/0.1";
/// Roughly one progress update per MiB written.
pub const DEFAULT_PROGRESS_STEP_BYTES: u64 = 1024 * 1024;

/// Public model; serde is confined to this module tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub(crate) catalog_url: String,
    pub(crate) user_agent: String,
    pub(crate) checksum: ChecksumKind,
    pub(crate) hex_case: HexCase,
    pub(crate) progress_step_bytes: u64,
    pub(crate) skip_hypervisors: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            catalog_url: DEFAULT_CATALOG_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            checksum: ChecksumKind::Md5,
            hex_case: HexCase::Upper,
            progress_step_bytes: DEFAULT_PROGRESS_STEP_BYTES,
            skip_hypervisors: vec!["Vagrant".to_string()],
        }
    }
}

impl Settings {
    pub fn catalog_url(&self) -> &str {
        &self.catalog_url
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn checksum(&self) -> ChecksumKind {
        self.checksum
    }

    pub fn hex_case(&self) -> HexCase {
        self.hex_case
    }

    pub fn progress_step_bytes(&self) -> u64 {
        self.progress_step_bytes.max(1)
    }

    pub fn skip_hypervisors(&self) -> &[String] {
        &self.skip_hypervisors
    }

    pub fn with_progress_step_bytes(mut self, step: u64) -> Self {
        self.progress_step_bytes = step;
        self
    }
}
