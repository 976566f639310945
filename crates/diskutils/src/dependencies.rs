use std::{
    ffi::{OsStr, OsString},
    io::{self, Write},
    os::unix::process::ExitStatusExt,
    path::PathBuf,
    process::{Command as StdCommand, Output, Stdio},
};

use log::trace;
use strum_macros::IntoStaticStr;

#[derive(Debug, thiserror::Error)]
pub enum DependencyError {
    #[error("Failed to find dependency '{dependency}': {source}")]
    NotFound {
        dependency: Dependency,
        #[source]
        source: which::Error,
    },

    #[error("Failed to execute dependency '{dependency}': {inner}")]
    CouldNotExecute {
        dependency: Dependency,
        #[source]
        inner: io::Error,
    },

    #[error("Dependency '{dependency}' finished unsuccessfully: {explanation}\nCmdline: {rendered_command}\n{output}")]
    ExecutionFailed {
        dependency: Dependency,
        rendered_command: String,
        code: Option<i32>,
        signal: Option<i32>,
        explanation: String,
        output: String,
    },
}

/// External binaries the volume manager drives at runtime.
#[derive(Debug, Clone, Copy, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum Dependency {
    Cryptsetup,
    Mkfs,
    Partprobe,
    Sgdisk,
    Udevadm,
    // Test dependencies
    #[cfg(test)]
    Cat,
    #[cfg(test)]
    DoesNotExist,
    #[cfg(test)]
    Echo,
    #[cfg(test)]
    False,
}

impl std::fmt::Display for Dependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.into())
    }
}

impl Dependency {
    /// Gets the name of the dependency, e.g. `Dependency::Sgdisk => "sgdisk"`.
    pub fn name(&self) -> &'static str {
        self.into()
    }

    /// Checks if the dependency is present on the system.
    pub fn exists(&self) -> bool {
        self.path().is_ok()
    }

    /// Resolves the dependency through $PATH.
    pub fn path(&self) -> Result<PathBuf, Box<DependencyError>> {
        which::which(self.name()).map_err(|source| {
            Box::new(DependencyError::NotFound {
                dependency: *self,
                source,
            })
        })
    }

    /// Converts the dependency to a new [`Command`] instance.
    pub fn cmd(&self) -> Command {
        Command {
            dependency: *self,
            args: vec![],
            input: None,
        }
    }
}

pub struct Command {
    dependency: Dependency,
    args: Vec<OsString>,
    input: Option<Vec<u8>>,
}

impl Command {
    pub fn arg<S: AsRef<OsStr>>(&mut self, arg: S) -> &mut Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(&mut self, args: I) -> &mut Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        for arg in args {
            self.arg(arg.as_ref());
        }
        self
    }

    /// Feeds `input` to the child's stdin. Without it stdin is inherited.
    pub fn input(&mut self, input: impl Into<Vec<u8>>) -> &mut Self {
        self.input = Some(input.into());
        self
    }

    pub fn run_and_check(&self) -> Result<(), Box<DependencyError>> {
        self.output()?.check()
    }

    pub fn output_and_check(&self) -> Result<String, Box<DependencyError>> {
        self.output()?.check_output()
    }

    fn render_command(&self) -> String {
        if self.args.is_empty() {
            self.dependency.to_string()
        } else {
            format!(
                "{} {}",
                self.dependency,
                self.args
                    .iter()
                    .map(|arg| arg.to_string_lossy())
                    .map(|arg| if arg.contains(' ') {
                        format!("'{arg}'")
                    } else {
                        arg.into()
                    })
                    .collect::<Vec<_>>()
                    .join(" "),
            )
        }
    }

    pub fn output(&self) -> Result<CommandOutput, Box<DependencyError>> {
        let mut cmd = StdCommand::new(self.dependency.path()?);
        cmd.args(&self.args);
        let rendered_command = self.render_command();
        trace!("Executing '{rendered_command}'");
        let output = match &self.input {
            Some(input) => run_with_input(&mut cmd, input),
            None => cmd.output(),
        }
        .map_err(|inner| {
            Box::new(DependencyError::CouldNotExecute {
                dependency: self.dependency,
                inner,
            })
        })?;
        let output = CommandOutput {
            rendered_command: rendered_command.clone(),
            dependency: self.dependency,
            inner: output,
        };
        trace!(
            "Executed '{rendered_command}': {}. Report:\n{}",
            output.explain_exit(),
            output.output_report(),
        );
        Ok(output)
    }
}

fn run_with_input(cmd: &mut StdCommand, input: &[u8]) -> io::Result<Output> {
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut child = cmd.spawn()?;
    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(input)?;
    }
    // stdin is dropped here so the child sees EOF.
    child.wait_with_output()
}

#[derive(Debug)]
pub struct CommandOutput {
    rendered_command: String,
    dependency: Dependency,
    inner: Output,
}

impl CommandOutput {
    /// Checks if the process exited successfully
    pub fn success(&self) -> bool {
        self.inner.status.success()
    }

    /// Gets the exit code of the process, if it exited normally
    pub fn code(&self) -> Option<i32> {
        self.inner.status.code()
    }

    /// Gets the signal that terminated the process, if it was terminated by a signal
    fn signal(&self) -> Option<i32> {
        self.inner.status.signal()
    }

    /// Gets stderr
    pub fn error_output(&self) -> String {
        String::from_utf8_lossy(&self.inner.stderr).into()
    }

    /// Gets stdout
    pub fn output(&self) -> String {
        String::from_utf8_lossy(&self.inner.stdout).into()
    }

    /// Gets all available output, useful for reporting or debugging
    pub fn output_report(&self) -> String {
        let stdout = self.output();
        let stderr = self.error_output();

        let mut res = String::with_capacity(stdout.len() + stderr.len() + 20);

        if !stdout.is_empty() {
            res += &format!("stdout:\n{stdout}\n");
        }

        if !stderr.is_empty() {
            if !res.is_empty() {
                res += "\n";
            }
            res += &format!("stderr:\n{stderr}\n");
        }

        res
    }

    /// Checks if the process exited successfully, otherwise produces an error
    pub fn check(&self) -> Result<(), Box<DependencyError>> {
        if self.success() {
            return Ok(());
        }

        Err(Box::new(DependencyError::ExecutionFailed {
            dependency: self.dependency,
            rendered_command: self.rendered_command.clone(),
            code: self.code(),
            signal: self.signal(),
            explanation: self.explain_exit(),
            output: match self.output_report() {
                s if !s.is_empty() => s,
                _ => "(no output collected)".into(),
            },
        }))
    }

    /// Checks if the process exited successfully and returns the output,
    /// otherwise produces an error with the output
    pub fn check_output(&self) -> Result<String, Box<DependencyError>> {
        self.check()?;
        Ok(self.output())
    }

    /// Produces a string explaining the exit status of the process
    fn explain_exit(&self) -> String {
        if let Some(code) = self.code() {
            format!("exited with status: {code}")
        } else if let Some(signal) = self.signal() {
            format!("terminated by signal: {signal}")
        } else {
            "exited with unknown status".into()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command() {
        Dependency::Echo
            .cmd()
            .arg("Hello, world")
            .run_and_check()
            .unwrap();

        let output_and_check_res = Dependency::Echo
            .cmd()
            .arg("Hello, world")
            .output_and_check();
        assert_eq!(output_and_check_res.unwrap(), "Hello, world\n");

        let render_command_res = Dependency::Echo.cmd().arg("Hello, world").render_command();
        assert_eq!(render_command_res, "echo 'Hello, world'");

        let output_res = Dependency::Echo.cmd().arg("Hello, world").output();
        assert_eq!(output_res.unwrap().output(), "Hello, world\n");
    }

    #[test]
    fn test_input_is_fed_to_stdin() {
        let output = Dependency::Cat.cmd().input("fed via stdin").output_and_check();
        assert_eq!(output.unwrap(), "fed via stdin");
    }

    #[test]
    fn test_nonexistent_dep() {
        let output = Dependency::DoesNotExist.cmd().output().unwrap_err();
        assert!(matches!(*output, DependencyError::NotFound { .. }));
        assert_eq!(
            output.to_string(),
            "Failed to find dependency 'doesnotexist': cannot find binary path"
        );
    }

    #[test]
    fn test_commandoutput() {
        // This command should succeed
        let output = Dependency::Echo.cmd().arg("Hello, world").output().unwrap();
        assert!(output.success());
        assert_eq!(output.code(), Some(0));
        assert_eq!(output.signal(), None);
        assert_eq!(output.error_output(), "");
        assert_eq!(output.output(), "Hello, world\n");
        assert_eq!(output.output_report(), "stdout:\nHello, world\n\n");
        assert!(matches!(output.check(), Ok(())));
        assert!(matches!(output.check_output(), Ok(s) if s == "Hello, world\n"));
        assert_eq!(output.explain_exit(), "exited with status: 0");

        // This command should fail
        let output = Dependency::False.cmd().output().unwrap();
        assert!(!output.success());
        assert_eq!(output.code(), Some(1));
        assert_eq!(output.output_report(), "");
        assert!(matches!(
            *output.check().unwrap_err(),
            DependencyError::ExecutionFailed { .. }
        ));
        assert_eq!(output.explain_exit(), "exited with status: 1");
    }
}
