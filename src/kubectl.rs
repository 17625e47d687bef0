use std::path::Path;
use std::time::Duration;
use log::{debug, info};
use thiserror::Error;

use crate::exec::{ExitCode, Executor, Invocation, Output, Session};

/// Extra time granted to `kubectl` beyond its own `--timeout` before the
/// local guard gives up on the process.
const ROLLOUT_GRACE: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum Error {
    #[error("kubectl apply failed with {0}: {1}")]
    Apply(ExitCode, String),

    #[error("rollout of deployment/{deployment} failed with {status}: {stderr}")]
    RolloutFailed {
        deployment: String,
        status: ExitCode,
        stderr: String,
    },

    #[error("rollout of deployment/{deployment} did not complete within {}s", .timeout.as_secs())]
    RolloutTimeout {
        deployment: String,
        timeout: Duration,
    },

    #[error(transparent)]
    IOError(#[from] std::io::Error),
}

pub struct Kubectl<'a, E> {
    exec: &'a E,
    session: &'a Session,
}

impl<'a, E: Executor> Kubectl<'a, E> {
    pub fn new(exec: &'a E, session: &'a Session) -> Self {
        Self { exec, session }
    }

    fn command(&self) -> Invocation {
        Invocation::new("kubectl").opt("--context", self.session.kube_context.as_deref())
    }

    pub async fn apply(&self, manifest: &Path, namespace: &str) -> Result<(), Error> {
        let invocation = self
            .command()
            .arg("apply")
            .arg("--filename")
            .arg(manifest.to_string_lossy())
            .arg("--namespace")
            .arg(namespace);
        let output = self.exec.run(&invocation).await?;
        if !output.success() {
            return Err(Error::Apply(output.status, output.stderr.trim().to_string()));
        }
        for line in output.stdout.lines() {
            info!("{line}");
        }
        Ok(())
    }

    /// Block until the deployment's rollout is complete.
    ///
    /// `kubectl` enforces `timeout` itself; a local guard of `timeout` plus a
    /// grace period covers a `kubectl` process that never returns.
    pub async fn rollout_status(
        &self,
        deployment: &str,
        namespace: &str,
        timeout: Duration,
    ) -> Result<(), Error> {
        let invocation = self
            .command()
            .args(["rollout", "status"])
            .arg(format!("deployment/{deployment}"))
            .arg("--namespace")
            .arg(namespace)
            .arg(format!("--timeout={}s", timeout.as_secs()));

        let output: Output =
            match tokio::time::timeout(timeout + ROLLOUT_GRACE, self.exec.run(&invocation)).await {
                Ok(output) => output?,
                Err(_) => {
                    return Err(Error::RolloutTimeout {
                        deployment: deployment.to_string(),
                        timeout,
                    })
                }
            };

        if output.success() {
            for line in output.stdout.lines() {
                debug!("{line}");
            }
            return Ok(());
        }

        let stderr = output.stderr.trim().to_string();
        if is_timeout_message(&stderr) {
            Err(Error::RolloutTimeout {
                deployment: deployment.to_string(),
                timeout,
            })
        } else {
            Err(Error::RolloutFailed {
                deployment: deployment.to_string(),
                status: output.status,
                stderr,
            })
        }
    }
}

fn is_timeout_message(stderr: &str) -> bool {
    stderr.contains("timed out waiting") || stderr.contains("exceeded its progress deadline")
}
