//! Infrastructure deploy driver.
//!
//! 1. make sure the Azure CLI is logged in
//! 2. create the resource group if it does not exist
//! 3. optionally run the cleanup hook and wait for deletions to settle
//! 4. purge soft-deleted resources unless told not to
//! 5. deploy the Bicep template; failure stops everything
//! 6. run the post-deployment hook
use chrono::Utc;
use log::{info, warn};
use thiserror::Error;

use crate::az::{self, Az, Deployment};
use crate::config;
use crate::exec::{Executor, Invocation, Session};

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Az(#[from] az::Error),

    #[error("post-deployment hook failed: {0}")]
    PostDeploy(String),
}

/// Operator-supplied parameters; defaults come from the configuration file.
#[derive(Debug, Clone)]
pub struct Params {
    pub resource_group: String,
    pub location: String,
    pub cleanup_first: bool,
    pub skip_purge: bool,
}

enum Hook {
    Succeeded,
    /// Non-zero exit, or the hook could not be started at all.
    Failed(String),
    NotConfigured,
}

pub async fn run<E: Executor>(
    exec: &E,
    session: &Session,
    settings: &config::Infra,
    params: &Params,
) -> Result<(), Error> {
    let az = Az::new(exec, session);

    if az.is_logged_in().await? {
        info!("Azure CLI session found");
    } else {
        info!("Not logged in to Azure, starting interactive login");
        az.login().await?;
    }

    ensure_resource_group(&az, params).await?;

    if params.cleanup_first {
        info!("Cleaning up resource group {}", params.resource_group);
        match run_hook(exec, "cleanup", &settings.cleanup, params).await {
            Hook::Succeeded => {
                let delay = settings.cleanup_delay();
                info!("Waiting {}s for deletions to complete", delay.as_secs());
                tokio::time::sleep(delay).await;
                ensure_resource_group(&az, params).await?;
            }
            Hook::Failed(reason) => warn!("Cleanup failed ({reason}), continuing"),
            Hook::NotConfigured => warn!("No cleanup hook configured, skipping cleanup"),
        }
    }

    if params.skip_purge {
        info!("Skipping purge of soft-deleted resources");
    } else {
        info!("Purging soft-deleted resources in {}", params.location);
        match run_hook(exec, "purge", &settings.purge, params).await {
            Hook::Succeeded => {}
            Hook::Failed(reason) => warn!("Purge failed ({reason}), continuing"),
            Hook::NotConfigured => info!("No purge hook configured"),
        }
    }

    let mut parameters = vec![];
    if !settings.location_parameter.is_empty() {
        parameters.push(format!("{}={}", settings.location_parameter, params.location));
    }
    parameters.extend(settings.parameters.iter().cloned());
    let deployment = Deployment {
        name: deployment_name(&settings.deployment_name_prefix),
        resource_group: params.resource_group.clone(),
        template_file: settings.template_file.display().to_string(),
        parameters,
    };
    az.deployment_create(&deployment).await?;
    info!("Infrastructure deployment {} succeeded", deployment.name);

    match run_hook(exec, "post-deploy", &settings.post_deploy, params).await {
        Hook::Succeeded => info!("Post-deployment configuration complete"),
        Hook::Failed(reason) => return Err(Error::PostDeploy(reason)),
        Hook::NotConfigured => info!("No post-deployment hook configured"),
    }
    Ok(())
}

async fn ensure_resource_group<E: Executor>(az: &Az<'_, E>, params: &Params) -> Result<(), Error> {
    if az.group_exists(&params.resource_group).await? {
        info!("Resource group {} already exists", params.resource_group);
    } else {
        info!(
            "Creating resource group {} in {}",
            params.resource_group, params.location
        );
        az.group_create(&params.resource_group, &params.location).await?;
    }
    Ok(())
}

/// Hooks never abort the run by themselves; the caller decides what a
/// failure means.
async fn run_hook<E: Executor>(exec: &E, name: &str, argv: &[String], params: &Params) -> Hook {
    let Some(invocation) = hook_invocation(argv, params) else {
        return Hook::NotConfigured;
    };
    info!("Running {name} hook: {invocation}");
    match exec.run(&invocation).await {
        Ok(output) if output.success() => Hook::Succeeded,
        Ok(output) => Hook::Failed(output.status.to_string()),
        Err(err) => Hook::Failed(format!("could not run {}: {err}", invocation.program)),
    }
}

fn hook_invocation(argv: &[String], params: &Params) -> Option<Invocation> {
    let expand = |arg: &String| {
        arg.replace("{resource_group}", &params.resource_group)
            .replace("{location}", &params.location)
    };
    let (program, args) = argv.split_first()?;
    Some(
        Invocation::new(expand(program))
            .args(args.iter().map(expand))
            .interactive(),
    )
}

fn deployment_name(prefix: &str) -> String {
    format!("{prefix}-{}", Utc::now().format("%Y%m%d%H%M%S"))
}
