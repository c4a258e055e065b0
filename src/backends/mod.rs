//! Hypervisor adapters: tool detection, artifact preparation and import.

pub mod hyperv;
pub mod parallels;
pub mod runner;
pub mod virtualbox;
pub mod vmware;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use tracing::info;

use crate::pipeline::PipelineError;

pub use hyperv::HyperV;
pub use parallels::Parallels;
pub use runner::{CommandOutput, CommandRunner, SystemRunner};
pub use virtualbox::VirtualBox;
pub use vmware::VMware;

/// Supported virtualization products.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    VirtualBox,
    VMware,
    HyperV,
    Parallels,
}

impl BackendKind {
    pub const ALL: [BackendKind; 4] = [
        BackendKind::VirtualBox,
        BackendKind::VMware,
        BackendKind::HyperV,
        BackendKind::Parallels,
    ];

    /// Catalog spelling of the product name.
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::VirtualBox => "VirtualBox",
            BackendKind::VMware => "VMware",
            BackendKind::HyperV => "HyperV",
            BackendKind::Parallels => "Parallels",
        }
    }

    /// Suffix of the file the product imports.
    pub fn entry_suffix(&self) -> &'static str {
        match self {
            BackendKind::VirtualBox => ".ova",
            BackendKind::VMware => ".ovf",
            BackendKind::HyperV => ".xml",
            BackendKind::Parallels => ".pvs",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        if name.eq_ignore_ascii_case("Hyper-V") {
            return Ok(BackendKind::HyperV);
        }
        BackendKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| PipelineError::UnsupportedBackend(s.to_string()))
    }
}

/// One virtualization product's host-side operations.
pub trait Hypervisor: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Verify the product's command line tools are usable.
    fn check_installed(&self) -> Result<(), PipelineError>;

    /// Turn the extracted entry point into what `import` consumes.
    fn prepare(&self, entry_point: &Path) -> Result<PathBuf, PipelineError> {
        Ok(entry_point.to_path_buf())
    }

    fn import(&self, vm_path: &Path) -> Result<(), PipelineError>;

    /// Steps left to the user after a successful import.
    fn manual_steps(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Build the adapter for `kind`.
pub fn adapter(kind: BackendKind, runner: Arc<dyn CommandRunner>) -> Box<dyn Hypervisor> {
    match kind {
        BackendKind::VirtualBox => Box::new(VirtualBox::new(runner)),
        BackendKind::VMware => Box::new(VMware::new(runner)),
        BackendKind::HyperV => Box::new(HyperV::new(runner)),
        BackendKind::Parallels => Box::new(Parallels::new(runner)),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    NotChecked,
    Checked,
    Prepared(PathBuf),
    Imported(PathBuf),
    Failed,
}

impl SessionState {
    fn name(&self) -> &'static str {
        match self {
            SessionState::NotChecked => "not checked",
            SessionState::Checked => "checked",
            SessionState::Prepared(_) => "prepared",
            SessionState::Imported(_) => "imported",
            SessionState::Failed => "failed",
        }
    }
}

/// Drives an adapter through check → prepare → import. Each step runs at
/// most once and only after the previous one succeeded; any failure is
/// terminal for the session.
pub struct BackendSession {
    adapter: Box<dyn Hypervisor>,
    state: SessionState,
}

impl BackendSession {
    pub fn new(adapter: Box<dyn Hypervisor>) -> Self {
        Self {
            adapter,
            state: SessionState::NotChecked,
        }
    }

    /// Fails with `UnsupportedBackend` before anything is run.
    pub fn for_hypervisor(name: &str, runner: Arc<dyn CommandRunner>) -> Result<Self, PipelineError> {
        let kind: BackendKind = name.parse()?;
        Ok(Self::new(adapter(kind, runner)))
    }

    pub fn kind(&self) -> BackendKind {
        self.adapter.kind()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn manual_steps(&self) -> Vec<String> {
        self.adapter.manual_steps()
    }

    pub fn check(&mut self) -> Result<(), PipelineError> {
        self.require_state("check", |s| matches!(s, SessionState::NotChecked))?;
        let result = self.adapter.check_installed();
        self.advance(result, |_| SessionState::Checked)
    }

    pub fn prepare(&mut self, entry_point: &Path) -> Result<PathBuf, PipelineError> {
        self.require_state("prepare", |s| matches!(s, SessionState::Checked))?;
        let result = self.adapter.prepare(entry_point);
        let path = self.advance(result, |p| SessionState::Prepared(p.clone()))?;
        info!(backend = %self.kind(), path = %path.display(), "prepared");
        Ok(path)
    }

    pub fn import(&mut self) -> Result<PathBuf, PipelineError> {
        let SessionState::Prepared(path) = &self.state else {
            return Err(self.out_of_order("import"));
        };
        let path = path.clone();
        let result = self.adapter.import(&path).map(|()| path);
        let path = self.advance(result, |p| SessionState::Imported(p.clone()))?;
        info!(backend = %self.kind(), path = %path.display(), "imported");
        Ok(path)
    }

    fn require_state(
        &self,
        step: &'static str,
        allowed: impl Fn(&SessionState) -> bool,
    ) -> Result<(), PipelineError> {
        if allowed(&self.state) {
            Ok(())
        } else {
            Err(self.out_of_order(step))
        }
    }

    fn out_of_order(&self, step: &'static str) -> PipelineError {
        PipelineError::OutOfOrder {
            backend: self.kind(),
            step,
            state: self.state.name(),
        }
    }

    fn advance<T>(
        &mut self,
        result: Result<T, PipelineError>,
        next: impl FnOnce(&T) -> SessionState,
    ) -> Result<T, PipelineError> {
        match &result {
            Ok(value) => self.state = next(value),
            Err(_) => self.state = SessionState::Failed,
        }
        result
    }
}
