use log::{debug, info};
use serde::Deserialize;
use thiserror::Error;

use crate::exec::{ExitCode, Executor, Invocation, Output, Session};

#[derive(Error, Debug)]
pub enum Error {
    #[error("az login failed with {0}")]
    Login(ExitCode),

    #[error("az group exists failed with {0}: {1}")]
    GroupExists(ExitCode, String),

    #[error("unexpected output from az group exists: {0:?}")]
    GroupExistsOutput(String),

    #[error("az group create failed with {0}: {1}")]
    GroupCreate(ExitCode, String),

    #[error("az deployment group create failed with {0}")]
    Deployment(ExitCode),

    #[error("az acr webhook create failed with {0}: {1}")]
    WebhookCreate(ExitCode, String),

    #[error("az acr webhook list failed with {0}: {1}")]
    WebhookList(ExitCode, String),

    #[error("decode webhook list: {0}")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    IOError(#[from] std::io::Error),
}

/// Bicep template deployment into a resource group.
#[derive(Debug, Clone)]
pub struct Deployment {
    pub name: String,
    pub resource_group: String,
    pub template_file: String,
    /// `key=value` pairs, passed as `--parameters`.
    pub parameters: Vec<String>,
}

/// Push webhook on a container registry.
#[derive(Debug, Clone)]
pub struct WebhookRequest {
    pub name: String,
    pub registry: String,
    pub uri: String,
    pub header: String,
    pub token: String,
    pub scope: String,
}

/// Webhook as reported by `az acr webhook list`.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Webhook {
    pub name: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub uri: Option<String>,
}

const WEBHOOK_LIST_QUERY: &str = "[].{name:name, status:status, scope:scope, uri:serviceUri}";

/// Thin wrapper over the Azure CLI.
pub struct Az<'a, E> {
    exec: &'a E,
    session: &'a Session,
}

impl<'a, E: Executor> Az<'a, E> {
    pub fn new(exec: &'a E, session: &'a Session) -> Self {
        Self { exec, session }
    }

    fn command<I, S>(&self, args: I) -> Invocation
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Invocation::new("az")
            .args(args)
            .opt("--subscription", self.session.subscription.as_deref())
    }

    async fn run(&self, invocation: Invocation) -> Result<Output, Error> {
        Ok(self.exec.run(&invocation).await?)
    }

    /// Whether the CLI holds a usable session.
    pub async fn is_logged_in(&self) -> Result<bool, Error> {
        let output = self.run(self.command(["account", "show", "--output", "none"])).await?;
        if !output.success() {
            debug!("az account show: {}", output.stderr.trim());
        }
        Ok(output.success())
    }

    pub async fn login(&self) -> Result<(), Error> {
        let output = self.run(Invocation::new("az").arg("login").interactive()).await?;
        if output.success() {
            Ok(())
        } else {
            Err(Error::Login(output.status))
        }
    }

    pub async fn group_exists(&self, name: &str) -> Result<bool, Error> {
        let output = self
            .run(self.command(["group", "exists", "--name", name]))
            .await?;
        if !output.success() {
            return Err(Error::GroupExists(output.status, output.stderr.trim().to_string()));
        }
        serde_json::from_str::<bool>(output.stdout.trim())
            .map_err(|_| Error::GroupExistsOutput(output.stdout.trim().to_string()))
    }

    pub async fn group_create(&self, name: &str, location: &str) -> Result<(), Error> {
        let invocation = self
            .command(["group", "create"])
            .arg("--name")
            .arg(name)
            .arg("--location")
            .arg(location)
            .arg("--output")
            .arg("none");
        let output = self.run(invocation).await?;
        if output.success() {
            Ok(())
        } else {
            Err(Error::GroupCreate(output.status, output.stderr.trim().to_string()))
        }
    }

    /// Apply a template; progress is streamed to the terminal.
    pub async fn deployment_create(&self, deployment: &Deployment) -> Result<(), Error> {
        let mut invocation = Invocation::new("az")
            .args(["deployment", "group", "create"])
            .arg("--name")
            .arg(&deployment.name)
            .arg("--resource-group")
            .arg(&deployment.resource_group)
            .arg("--template-file")
            .arg(&deployment.template_file);
        for parameter in &deployment.parameters {
            invocation = invocation.arg("--parameters").arg(parameter);
        }
        let invocation = invocation
            .opt("--subscription", self.session.subscription.as_deref())
            .interactive();

        info!("Deploying {} as {}", deployment.template_file, deployment.name);
        let output = self.run(invocation).await?;
        if output.success() {
            Ok(())
        } else {
            Err(Error::Deployment(output.status))
        }
    }

    pub async fn webhook_create(&self, request: &WebhookRequest) -> Result<(), Error> {
        let invocation = self
            .command(["acr", "webhook", "create"])
            .arg("--name")
            .arg(&request.name)
            .arg("--registry")
            .arg(&request.registry)
            .arg("--actions")
            .arg("push")
            .arg("--uri")
            .arg(&request.uri)
            .arg("--headers")
            .arg(format!("{}={}", request.header, request.token))
            .arg("--scope")
            .arg(&request.scope)
            .arg("--output")
            .arg("none")
            .secret(request.token.clone());
        let output = self.run(invocation).await?;
        if output.success() {
            Ok(())
        } else {
            Err(Error::WebhookCreate(output.status, output.stderr.trim().to_string()))
        }
    }

    pub async fn webhook_list(&self, registry: &str) -> Result<Vec<Webhook>, Error> {
        let invocation = self
            .command(["acr", "webhook", "list"])
            .arg("--registry")
            .arg(registry)
            .arg("--query")
            .arg(WEBHOOK_LIST_QUERY)
            .arg("--output")
            .arg("json");
        let output = self.run(invocation).await?;
        if !output.success() {
            return Err(Error::WebhookList(output.status, output.stderr.trim().to_string()));
        }
        if output.stdout.trim().is_empty() {
            return Ok(vec![]);
        }
        Ok(serde_json::from_str(&output.stdout)?)
    }
}
