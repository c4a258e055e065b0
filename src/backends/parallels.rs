use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::pipeline::PipelineError;

use super::runner::{CommandRunner, invoke};
use super::{BackendKind, Hypervisor};

// The version lives with the server control tool, VM management with prlctl.
const PRLSRVCTL: &str = "prlsrvctl";
const PRLCTL: &str = "prlctl";

/// `Version: Desktop 18.1.1-53328` line of `prlsrvctl info`.
pub fn probe_info(output: &str) -> Option<&str> {
    output
        .lines()
        .map(str::trim)
        .find_map(|l| l.strip_prefix("Version:"))
        .map(str::trim)
}

pub struct Parallels {
    runner: Arc<dyn CommandRunner>,
}

impl Parallels {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

impl Hypervisor for Parallels {
    fn kind(&self) -> BackendKind {
        BackendKind::Parallels
    }

    fn check_installed(&self) -> Result<(), PipelineError> {
        info!("checking Parallels installation");
        let out = invoke(self.runner.as_ref(), PRLSRVCTL, &[OsStr::new("info")])?;
        if !out.success() {
            return Err(PipelineError::tool_missing(PRLSRVCTL, out.describe()));
        }
        match probe_info(&out.stdout) {
            Some(version) => info!(version, "detected Parallels"),
            None => info!("detected Parallels, version unknown"),
        }
        Ok(())
    }

    fn import(&self, vm_path: &Path) -> Result<(), PipelineError> {
        info!(path = %vm_path.display(), "import VM into Parallels, please wait");
        let out = invoke(
            self.runner.as_ref(),
            PRLCTL,
            &[OsStr::new("register"), vm_path.as_os_str()],
        )?;
        if !out.success() {
            return Err(PipelineError::import_failed(self.kind(), out.describe()));
        }
        info!("{}", out.stdout.trim());
        Ok(())
    }
}
