use std::ffi::OsStr;
use std::io;
use std::process::Command;

use tracing::debug;

use crate::pipeline::PipelineError;

/// Captured result of one external tool invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// stdout followed by stderr, the way a terminal would show them.
    pub fn combined(&self) -> String {
        let mut out = self.stdout.clone();
        out.push_str(&self.stderr);
        out
    }

    /// Short description for error messages.
    pub fn describe(&self) -> String {
        let text = self.combined();
        let text = text.trim();
        let status = match self.code {
            Some(code) => format!("exit status {code}"),
            None => "terminated by signal".to_string(),
        };
        if text.is_empty() {
            status
        } else {
            format!("{status}: {text}")
        }
    }
}

/// Runs host tools. Adapters only talk to the outside world through this.
pub trait CommandRunner: Send + Sync {
    fn run(&self, program: &str, args: &[&OsStr]) -> io::Result<CommandOutput>;
}

/// Spawns real processes and waits for them.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&OsStr]) -> io::Result<CommandOutput> {
        debug!(program, ?args, "running");
        let output = Command::new(program).args(args).output()?;
        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Run `program`, mapping a spawn failure (usually "not found") to
/// `ToolMissing`. The exit status is left for the caller to judge.
pub(crate) fn invoke(
    runner: &dyn CommandRunner,
    program: &str,
    args: &[&OsStr],
) -> Result<CommandOutput, PipelineError> {
    runner
        .run(program, args)
        .map_err(|e| PipelineError::tool_missing(program, e.to_string()))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::{CommandOutput, CommandRunner, invoke};
    use crate::pipeline::error::ErrorKind;
    use std::collections::HashMap;
    use std::ffi::OsStr;
    use std::io;
    use std::sync::Mutex;

    type Handler = Box<dyn Fn(&[String]) -> io::Result<CommandOutput> + Send + Sync>;

    /// Scripted runner: answers per program and records every call as
    /// `program arg1 arg2 ...`.
    #[derive(Default)]
    pub(crate) struct FakeRunner {
        handlers: HashMap<String, Handler>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeRunner {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn on(
            mut self,
            program: &str,
            handler: impl Fn(&[String]) -> io::Result<CommandOutput> + Send + Sync + 'static,
        ) -> Self {
            self.handlers.insert(program.to_string(), Box::new(handler));
            self
        }

        pub(crate) fn answer(self, program: &str, output: CommandOutput) -> Self {
            self.on(program, move |_| Ok(output.clone()))
        }

        pub(crate) fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl CommandRunner for FakeRunner {
        fn run(&self, program: &str, args: &[&OsStr]) -> io::Result<CommandOutput> {
            let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
            let mut line = program.to_string();
            for arg in &args {
                line.push(' ');
                line.push_str(arg);
            }
            self.calls.lock().unwrap().push(line);

            match self.handlers.get(program) {
                Some(handler) => handler(&args),
                None => Err(io::Error::new(io::ErrorKind::NotFound, "program not found")),
            }
        }
    }

    #[test]
    fn spawn_failure_is_tool_missing() {
        let runner = FakeRunner::new();
        let err = invoke(&runner, "vboxmanage", &[OsStr::new("--version")]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ToolMissing);
        assert_eq!(runner.calls(), vec!["vboxmanage --version"]);
    }

    #[test]
    fn describe_includes_status_and_output() {
        assert_eq!(CommandOutput::failed(2, " boom\n").describe(), "exit status 2: boom");
        assert_eq!(CommandOutput::default().describe(), "terminated by signal");
    }
}
