use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::pipeline::PipelineError;

use super::runner::{CommandRunner, invoke};
use super::{BackendKind, Hypervisor};

const POWERSHELL: &str = "powershell";

pub const NETWORK_NOTE: &str =
    "Please check Network adapter settings. By default it isn't connected.";

/// `Get-Command -Module Hyper-V` succeeds with no output when the module is
/// absent, so the listing itself has to mention the module.
pub fn probe_module_listing(output: &str) -> bool {
    output.lines().any(|l| l.contains("Hyper-V"))
}

/// Quote a path for a PowerShell command line, doubling embedded quotes.
fn ps_quote(path: &Path) -> String {
    format!("'{}'", path.display().to_string().replace('\'', "''"))
}

pub struct HyperV {
    runner: Arc<dyn CommandRunner>,
}

impl HyperV {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

impl Hypervisor for HyperV {
    fn kind(&self) -> BackendKind {
        BackendKind::HyperV
    }

    fn check_installed(&self) -> Result<(), PipelineError> {
        info!("checking Hyper-V installation");
        let runner = self.runner.as_ref();

        let out = invoke(runner, POWERSHELL, &[OsStr::new("-Command"), OsStr::new("Get-Host")])?;
        if !out.success() {
            return Err(PipelineError::tool_missing(POWERSHELL, out.describe()));
        }
        info!("powershell is present");

        let out = invoke(
            runner,
            POWERSHELL,
            &[
                OsStr::new("-Command"),
                OsStr::new("Get-Command"),
                OsStr::new("-Module"),
                OsStr::new("Hyper-V"),
            ],
        )?;
        if !out.success() || !probe_module_listing(&out.stdout) {
            return Err(PipelineError::tool_missing("Hyper-V cmdlets", out.describe()));
        }
        info!("Hyper-V cmdlets are present");
        Ok(())
    }

    fn import(&self, vm_path: &Path) -> Result<(), PipelineError> {
        info!(path = %vm_path.display(), "import, please wait");
        let quoted = ps_quote(vm_path);
        let out = invoke(
            self.runner.as_ref(),
            POWERSHELL,
            &[
                OsStr::new("-Command"),
                OsStr::new("Import-VM"),
                OsStr::new("-Path"),
                OsStr::new(&quoted),
            ],
        )?;
        if !out.success() {
            return Err(PipelineError::import_failed(self.kind(), out.describe()));
        }
        // Hyper-V has no switch attached after import and may have several
        // to choose from; the adapter is left for the user.
        warn!("{NETWORK_NOTE}");
        Ok(())
    }

    fn manual_steps(&self) -> Vec<String> {
        vec![NETWORK_NOTE.to_string()]
    }
}
