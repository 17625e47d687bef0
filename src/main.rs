/// respondr deployment tooling
use std::path::PathBuf;
use clap::{Parser, Subcommand};
use log::{error, info};
use thiserror::Error;

use respondr_deploy::exec::{Session, SystemExecutor};
use respondr_deploy::report::Report;
use respondr_deploy::webhooks::Listing;
use respondr_deploy::{config, environment, infra, reconcile, webhooks};

/// Provision, roll out and wire up respondr across its environments.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file. Defaults to ./respondr-deploy.toml when present.
    #[arg(long, global = true, env = "RESPONDR_DEPLOY_CONFIG")]
    config: Option<PathBuf>,

    /// Azure subscription used for every az call.
    #[arg(long, global = true)]
    subscription: Option<String>,

    /// Kubeconfig context used for every kubectl call.
    #[arg(long, global = true)]
    context: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Ensure the resource group exists and deploy the Bicep template.
    Infra {
        /// Resource group to deploy into.
        #[arg(long)]
        resource_group: Option<String>,

        /// Azure region of the resource group.
        #[arg(long)]
        location: Option<String>,

        /// Run the cleanup hook before deploying.
        #[arg(long)]
        cleanup_first: bool,

        /// Do not purge soft-deleted resources before deploying.
        #[arg(long)]
        skip_purge: bool,
    },
    /// Render, apply and await the manifests of every environment.
    Reconcile {
        /// Only reconcile this environment. May be repeated.
        #[arg(long = "environment")]
        environments: Vec<String>,

        /// Stop at the first environment that fails.
        #[arg(long)]
        fail_fast: bool,
    },
    /// Create the registry push webhooks and list the result.
    Webhooks {
        /// Shared webhook token. Defaults to the variable named by registry.token_env.
        #[arg(long)]
        token: Option<String>,
    },
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration: {0}")]
    Config(#[from] config::Error),

    #[error("environments: {0}")]
    Environment(#[from] environment::Error),

    #[error("infrastructure: {0}")]
    Infra(#[from] infra::Error),

    #[error("webhooks: {0}")]
    Webhooks(#[from] webhooks::Error),

    #[error("{failed} of {total} steps failed")]
    Incomplete { failed: usize, total: usize },
}

#[tokio::main]
async fn main() {
    match run().await {
        Ok(_) => std::process::exit(0),
        Err(err) => {
            error!("fatal: {}", err.to_string());
            std::process::exit(1)
        }
    }
}

async fn run() -> Result<(), Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Cli::parse();
    let cfg = config::File::discover(args.config.as_deref())?;

    let session = Session {
        subscription: args.subscription.or(cfg.azure.subscription.clone()),
        kube_context: args.context.or(cfg.kubernetes.context.clone()),
    };
    let exec = SystemExecutor;

    match args.command {
        Commands::Infra {
            resource_group,
            location,
            cleanup_first,
            skip_purge,
        } => {
            let params = infra::Params {
                resource_group: resource_group.unwrap_or(cfg.infra.resource_group.clone()),
                location: location.unwrap_or(cfg.infra.location.clone()),
                cleanup_first,
                skip_purge,
            };
            info!(
                "Deploying infrastructure to {} in {}",
                params.resource_group, params.location
            );
            infra::run(&exec, &session, &cfg.infra, &params).await?;
            info!("Infrastructure deployment complete");
            Ok(())
        }
        Commands::Reconcile {
            environments,
            fail_fast,
        } => {
            let options = reconcile::Options {
                only: environments,
                fail_fast,
            };
            let report =
                reconcile::run(&exec, &session, &cfg.kubernetes, &cfg.environments, &options)
                    .await?;
            println!("\n{report}");
            check(&report)
        }
        Commands::Webhooks { token } => {
            let token = token
                .or_else(|| std::env::var(&cfg.registry.token_env).ok())
                .unwrap_or_default();
            let provisioning =
                webhooks::run(&exec, &session, &cfg.registry, &cfg.environments, &token).await?;
            println!("\nWebhooks on {}:", cfg.registry.name);
            println!("{}", Listing(&provisioning.webhooks));
            println!("{}", provisioning.report);
            check(&provisioning.report)
        }
    }
}

fn check(report: &Report) -> Result<(), Error> {
    let failed = report.failures().count();
    if failed == 0 {
        Ok(())
    } else {
        Err(Error::Incomplete {
            failed,
            total: report.results.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use respondr_deploy::report::Outcome;

    #[test]
    fn check_counts_failed_steps() {
        let mut report = Report::default();
        report.record("production", "render", Outcome::Succeeded);
        report.record("production", "apply", Outcome::Failed("forbidden".into()));
        report.record("production", "rollout", Outcome::Skipped);
        report.record("preprod", "render", Outcome::Succeeded);

        let err = check(&report).unwrap_err();
        assert!(matches!(err, Error::Incomplete { failed: 1, total: 4 }));
        assert_eq!(err.to_string(), "1 of 4 steps failed");
    }

    #[test]
    fn check_accepts_skipped_steps() {
        let mut report = Report::default();
        report.record("production", "render", Outcome::Succeeded);
        report.record("production", "apply", Outcome::Skipped);
        assert!(check(&report).is_ok());
    }
}
