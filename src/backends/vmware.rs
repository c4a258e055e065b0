use std::ffi::OsStr;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use crate::pipeline::PipelineError;

use super::runner::{CommandRunner, invoke};
use super::{BackendKind, Hypervisor};

const OVFTOOL: &str = "ovftool";
const VMRUN: &str = "vmrun";

/// The images ship without a network adapter; these lines add a NAT one.
pub const NETWORK_FIXUP: [&str; 4] = [
    "ethernet0.present = \"TRUE\"",
    "ethernet0.connectionType = \"nat\"",
    "ethernet0.wakeOnPcktRcv = \"FALSE\"",
    "ethernet0.addressType = \"generated\"",
];

/// `ovftool --version` prints a single line such as
/// `VMware ovftool 4.4.0 (build-16360108)`.
pub fn probe_ovftool(output: &str) -> Option<&str> {
    output
        .lines()
        .map(str::trim)
        .find(|l| l.contains("ovftool"))
}

/// vmrun has no version flag. Run without arguments it exits non-zero and
/// prints usage whose second line reads `vmrun version ...`; that line is
/// the only sign the tool is present.
pub fn probe_vmrun(output: &str) -> Option<&str> {
    output
        .lines()
        .nth(1)
        .map(str::trim)
        .filter(|l| l.contains("vmrun version"))
}

/// `<dir>/image.ovf` converts into `<dir>/image.vmx`.
pub fn vmx_path_for(ovf: &Path) -> PathBuf {
    ovf.with_extension("vmx")
}

pub struct VMware {
    runner: Arc<dyn CommandRunner>,
}

impl VMware {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    fn append_network_fixup(vmx: &Path) -> Result<(), PipelineError> {
        let mut file = OpenOptions::new()
            .append(true)
            .open(vmx)
            .map_err(|e| PipelineError::filesystem(e, vmx))?;
        for line in NETWORK_FIXUP {
            writeln!(file, "{line}").map_err(|e| PipelineError::filesystem(e, vmx))?;
        }
        file.flush().map_err(|e| PipelineError::filesystem(e, vmx))
    }

    fn vmrun(&self, verb: &str, vmx: &Path) -> Result<(), PipelineError> {
        let out = invoke(
            self.runner.as_ref(),
            VMRUN,
            &[OsStr::new(verb), vmx.as_os_str()],
        )?;
        if !out.success() {
            return Err(PipelineError::import_failed(
                self.kind(),
                format!("vmrun {verb}: {}", out.describe()),
            ));
        }
        Ok(())
    }
}

impl Hypervisor for VMware {
    fn kind(&self) -> BackendKind {
        BackendKind::VMware
    }

    fn check_installed(&self) -> Result<(), PipelineError> {
        info!("checking VMware installation");

        let out = invoke(self.runner.as_ref(), OVFTOOL, &[OsStr::new("--version")])?;
        if !out.success() {
            return Err(PipelineError::tool_missing(OVFTOOL, out.describe()));
        }
        let version = probe_ovftool(&out.combined())
            .map(str::to_string)
            .ok_or_else(|| PipelineError::tool_missing(OVFTOOL, out.describe()))?;
        info!(%version, "detected");

        // Exit status is meaningless here, only the usage text counts.
        let out = invoke(self.runner.as_ref(), VMRUN, &[])?;
        let combined = out.combined();
        let version = probe_vmrun(&combined)
            .ok_or_else(|| PipelineError::tool_missing(VMRUN, out.describe()))?;
        info!(version, "detected");
        Ok(())
    }

    /// Convert the OVF into a VMX and add the missing network adapter.
    /// ovftool refuses to overwrite, so an existing VMX is an error.
    fn prepare(&self, entry_point: &Path) -> Result<PathBuf, PipelineError> {
        let vmx = vmx_path_for(entry_point);
        if vmx.exists() {
            return Err(PipelineError::filesystem(
                io::Error::new(io::ErrorKind::AlreadyExists, "converted VM already exists"),
                vmx,
            ));
        }

        info!(ovf = %entry_point.display(), vmx = %vmx.display(), "convert, please wait");
        let out = invoke(
            self.runner.as_ref(),
            OVFTOOL,
            &[entry_point.as_os_str(), vmx.as_os_str()],
        )?;
        if !out.success() {
            return Err(PipelineError::import_failed(
                self.kind(),
                format!("ovftool conversion: {}", out.describe()),
            ));
        }

        Self::append_network_fixup(&vmx)?;
        info!(vmx = %vmx.display(), "network adapter added");
        Ok(vmx)
    }

    // vmrun has no import verb; starting and stopping the VM is what adds
    // it to the library.
    fn import(&self, vm_path: &Path) -> Result<(), PipelineError> {
        info!(vmx = %vm_path.display(), "starting VM");
        self.vmrun("start", vm_path)?;
        info!(vmx = %vm_path.display(), "stopping VM");
        self.vmrun("stop", vm_path)
    }
}

#[cfg(test)]
mod tests {
    use super::{NETWORK_FIXUP, VMware, probe_ovftool, probe_vmrun, vmx_path_for};
    use crate::backends::Hypervisor;
    use crate::backends::runner::CommandOutput;
    use crate::backends::runner::tests::FakeRunner;
    use crate::pipeline::error::ErrorKind;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    const VMRUN_USAGE: &str = "\nvmrun version 1.17.0 build-17964953\n\nUsage: vmrun [AUTHENTICATION-FLAGS] COMMAND [PARAMETERS]\n";

    /// ovftool stand-in that writes a minimal VMX at the target path.
    fn converting_runner() -> FakeRunner {
        FakeRunner::new().on("ovftool", |args| {
            if args.len() == 2 {
                std::fs::write(&args[1], "config.version = \"8\"\n")?;
            }
            Ok(CommandOutput::ok("Completed successfully\n"))
        })
    }

    #[test]
    fn vmrun_probe_reads_second_line() {
        assert_eq!(probe_vmrun(VMRUN_USAGE), Some("vmrun version 1.17.0 build-17964953"));
        assert_eq!(probe_vmrun("vmrun version 1.17.0\n"), None);
        assert_eq!(probe_vmrun(""), None);
        assert_eq!(probe_vmrun("x\ncommand not found\n"), None);
    }

    #[test]
    fn ovftool_probe() {
        assert_eq!(
            probe_ovftool("VMware ovftool 4.4.0 (build-16360108)\n"),
            Some("VMware ovftool 4.4.0 (build-16360108)")
        );
        assert_eq!(probe_ovftool("something else"), None);
    }

    #[test]
    fn check_needs_both_tools() {
        let runner = Arc::new(
            FakeRunner::new()
                .answer("ovftool", CommandOutput::ok("VMware ovftool 4.4.0\n"))
                .answer(
                    "vmrun",
                    CommandOutput {
                        code: Some(255),
                        stdout: VMRUN_USAGE.to_string(),
                        stderr: String::new(),
                    },
                ),
        );
        VMware::new(runner.clone()).check_installed().unwrap();
        assert_eq!(runner.calls(), vec!["ovftool --version", "vmrun"]);

        let only_ovftool = Arc::new(
            FakeRunner::new().answer("ovftool", CommandOutput::ok("VMware ovftool 4.4.0\n")),
        );
        let err = VMware::new(only_ovftool).check_installed().unwrap_err();
        assert!(matches!(err, crate::pipeline::PipelineError::ToolMissing { ref tool, .. } if tool == "vmrun"));
    }

    #[test]
    fn unexpected_vmrun_output_is_tool_missing() {
        let runner = Arc::new(
            FakeRunner::new()
                .answer("ovftool", CommandOutput::ok("VMware ovftool 4.4.0\n"))
                .answer("vmrun", CommandOutput::failed(127, "sh: vmrun: broken\n")),
        );
        let err = VMware::new(runner).check_installed().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ToolMissing);
    }

    #[test]
    fn prepare_converts_and_appends_network_lines() {
        let dir = tempfile::tempdir().unwrap();
        let ovf = dir.path().join("image.ovf");
        std::fs::write(&ovf, "<Envelope/>").unwrap();
        let runner = Arc::new(converting_runner());

        let vmx = VMware::new(runner.clone()).prepare(&ovf).unwrap();

        assert_eq!(vmx, dir.path().join("image.vmx"));
        let content = std::fs::read_to_string(&vmx).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(&lines[1..], NETWORK_FIXUP);
        assert_eq!(
            runner.calls(),
            vec![format!("ovftool {} {}", ovf.display(), vmx.display())]
        );
    }

    #[test]
    fn prepare_refuses_existing_vmx() {
        let dir = tempfile::tempdir().unwrap();
        let ovf = dir.path().join("image.ovf");
        std::fs::write(dir.path().join("image.vmx"), "old").unwrap();
        let runner = Arc::new(converting_runner());

        let err = VMware::new(runner.clone()).prepare(&ovf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Filesystem);
        assert!(runner.calls().is_empty());
        assert_eq!(std::fs::read_to_string(dir.path().join("image.vmx")).unwrap(), "old");
    }

    #[test]
    fn failed_conversion_is_import_failure() {
        let runner = Arc::new(FakeRunner::new().answer("ovftool", CommandOutput::failed(1, "Error: bad OVF")));
        let err = VMware::new(runner).prepare(Path::new("/nowhere/image.ovf")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ImportFailed);
    }

    #[test]
    fn import_starts_then_stops() {
        let runner = Arc::new(FakeRunner::new().answer("vmrun", CommandOutput::ok("")));
        VMware::new(runner.clone())
            .import(Path::new("/dl/win10/image.vmx"))
            .unwrap();
        assert_eq!(
            runner.calls(),
            vec![
                "vmrun start /dl/win10/image.vmx",
                "vmrun stop /dl/win10/image.vmx"
            ]
        );
    }

    #[test]
    fn failed_start_skips_stop() {
        let runner = Arc::new(FakeRunner::new().answer("vmrun", CommandOutput::failed(255, "Error: cannot open VM")));
        let err = VMware::new(runner.clone())
            .import(Path::new("/dl/win10/image.vmx"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ImportFailed);
        assert_eq!(runner.calls().len(), 1);
    }

    #[test]
    fn vmx_sits_next_to_ovf() {
        assert_eq!(
            vmx_path_for(Path::new("/dl/MSEdge.Win10/MSEdge - Win10.ovf")),
            PathBuf::from("/dl/MSEdge.Win10/MSEdge - Win10.vmx")
        );
    }
}
