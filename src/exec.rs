use std::fmt::{Display, Formatter};
use std::process::Stdio;
use async_trait::async_trait;
use log::debug;

#[cfg(test)]
use mockall::automock;

/// Session context handed to every wrapper call instead of relying on
/// whatever the `az` and `kubectl` CLIs picked up from the environment.
#[derive(Debug, Clone, Default)]
pub struct Session {
    /// Azure subscription, `--subscription` on every `az` call except login.
    pub subscription: Option<String>,
    /// Kubeconfig context, `--context` on every `kubectl` call.
    pub kube_context: Option<String>,
}

/// A single external command line.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    /// Inherit the terminal instead of capturing output.
    pub interactive: bool,
    /// Values masked when the command line is displayed.
    secrets: Vec<String>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: vec![],
            interactive: false,
            secrets: vec![],
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add `flag value` if the value is set.
    pub fn opt(self, flag: &str, value: Option<&str>) -> Self {
        match value {
            Some(value) => self.arg(flag).arg(value),
            None => self,
        }
    }

    pub fn interactive(mut self) -> Self {
        self.interactive = true;
        self
    }

    pub fn secret(mut self, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.is_empty() {
            self.secrets.push(value);
        }
        self
    }

    /// Value following `flag`, e.g. `value_of("--namespace")`.
    pub fn value_of(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|arg| arg == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }
}

impl Display for Invocation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            let mut arg = arg.clone();
            for secret in &self.secrets {
                arg = arg.replace(secret, "***");
            }
            if arg.contains(' ') {
                write!(f, " '{arg}'")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// Exit code of a finished process; `None` when it was killed by a signal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExitCode(pub Option<i32>);

impl ExitCode {
    pub fn success(&self) -> bool {
        self.0 == Some(0)
    }
}

impl Display for ExitCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Some(code) => write!(f, "exit code {code}"),
            None => f.write_str("no exit code (terminated by signal)"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Output {
    pub status: ExitCode,
    /// Empty for interactive invocations.
    pub stdout: String,
    /// Empty for interactive invocations.
    pub stderr: String,
}

impl Output {
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

/// Runs external commands to completion.
///
/// Everything that talks to `az` or `kubectl` goes through this trait so
/// the orchestration logic can be exercised against a mock.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Executor: Send + Sync {
    async fn run(&self, invocation: &Invocation) -> std::io::Result<Output>;
}

/// Spawns real processes on the host.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemExecutor;

#[async_trait]
impl Executor for SystemExecutor {
    async fn run(&self, invocation: &Invocation) -> std::io::Result<Output> {
        debug!("exec: {invocation}");
        let mut command = tokio::process::Command::new(&invocation.program);
        command.args(&invocation.args).kill_on_drop(true);

        if invocation.interactive {
            let status = command
                .stdin(Stdio::inherit())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit())
                .status()
                .await?;
            Ok(Output {
                status: ExitCode(status.code()),
                ..Default::default()
            })
        } else {
            let output = command.stdin(Stdio::null()).output().await?;
            Ok(Output {
                status: ExitCode(output.status.code()),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        }
    }
}
