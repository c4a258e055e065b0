use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::pipeline::PipelineError;

use super::runner::{CommandRunner, invoke};
use super::{BackendKind, Hypervisor};

const VBOXMANAGE: &str = "vboxmanage";

/// First non-empty line of `vboxmanage --version`.
pub fn probe_version(output: &str) -> Option<&str> {
    output.lines().map(str::trim).find(|l| !l.is_empty())
}

pub struct VirtualBox {
    runner: Arc<dyn CommandRunner>,
}

impl VirtualBox {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

impl Hypervisor for VirtualBox {
    fn kind(&self) -> BackendKind {
        BackendKind::VirtualBox
    }

    fn check_installed(&self) -> Result<(), PipelineError> {
        info!("checking VirtualBox installation");
        let out = invoke(self.runner.as_ref(), VBOXMANAGE, &[OsStr::new("--version")])?;
        if !out.success() {
            return Err(PipelineError::tool_missing(VBOXMANAGE, out.describe()));
        }
        let version = probe_version(&out.stdout)
            .ok_or_else(|| PipelineError::tool_missing(VBOXMANAGE, "empty version output"))?;
        info!(version, "detected vboxmanage");
        Ok(())
    }

    // Importing the same appliance twice registers a second VM; vboxmanage
    // does not refuse it and neither do we.
    fn import(&self, vm_path: &Path) -> Result<(), PipelineError> {
        info!(path = %vm_path.display(), "import VM into VirtualBox, please wait");
        let out = invoke(
            self.runner.as_ref(),
            VBOXMANAGE,
            &[OsStr::new("import"), vm_path.as_os_str()],
        )?;
        if !out.success() {
            return Err(PipelineError::import_failed(self.kind(), out.describe()));
        }
        info!("{}", out.stdout.trim());
        Ok(())
    }
}
