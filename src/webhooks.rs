use std::fmt::{Display, Formatter};
use log::{error, info};
use thiserror::Error;

use crate::az::{Az, Webhook, WebhookRequest};
use crate::config;
use crate::environment::{self, Environment};
use crate::exec::{Executor, Session};
use crate::report::{Outcome, Report};

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Environment(#[from] environment::Error),

    #[error("webhook token is empty; set {0} or pass --token")]
    MissingToken(String),
}

/// Result of a provisioning run. Creation failures and a failed listing
/// are recorded in `report`; `webhooks` holds whatever the listing returned.
#[derive(Debug, Default)]
pub struct Provisioning {
    pub report: Report,
    pub webhooks: Vec<Webhook>,
}

/// Create one push webhook per environment, then list what the registry
/// holds.
///
/// Creation is best-effort: a failure for one environment is recorded and
/// the next one is still attempted, and the listing always runs.
pub async fn run<E: Executor>(
    exec: &E,
    session: &Session,
    registry: &config::Registry,
    environments: &[Environment],
    token: &str,
) -> Result<Provisioning, Error> {
    if token.is_empty() {
        return Err(Error::MissingToken(registry.token_env.clone()));
    }
    environment::validate(environments, &registry.repository)?;

    let az = Az::new(exec, session);
    let mut provisioning = Provisioning::default();

    for env in environments {
        let request = WebhookRequest {
            name: env.webhook_name.clone(),
            registry: registry.name.clone(),
            uri: env.callback_url.clone(),
            header: registry.token_header.clone(),
            token: token.to_string(),
            scope: env.scope(&registry.repository),
        };
        info!(
            "Creating webhook {} for {} (scope {})",
            request.name, env.name, request.scope
        );
        match az.webhook_create(&request).await {
            Ok(()) => {
                info!("Webhook {} created", request.name);
                provisioning.report.record(&env.name, "create", Outcome::Succeeded);
            }
            Err(err) => {
                error!("Webhook {} failed: {err}", request.name);
                provisioning
                    .report
                    .record(&env.name, "create", Outcome::Failed(err.to_string()));
            }
        }
    }

    match az.webhook_list(&registry.name).await {
        Ok(webhooks) => {
            provisioning.report.record(&registry.name, "list", Outcome::Succeeded);
            provisioning.webhooks = webhooks;
        }
        Err(err) => {
            error!("Listing webhooks on {} failed: {err}", registry.name);
            provisioning
                .report
                .record(&registry.name, "list", Outcome::Failed(err.to_string()));
        }
    }
    Ok(provisioning)
}

/// Webhook table for operator verification.
pub struct Listing<'a>(pub &'a [Webhook]);

impl Display for Listing<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let column = |value: &Option<String>| value.clone().unwrap_or_else(|| "-".to_string());
        let rows: Vec<[String; 4]> = self
            .0
            .iter()
            .map(|w| [w.name.clone(), column(&w.status), column(&w.scope), column(&w.uri)])
            .collect();
        let header = ["NAME", "STATUS", "SCOPE", "URI"].map(String::from);

        let mut widths = [0usize; 3];
        for row in std::iter::once(&header).chain(rows.iter()) {
            for (width, cell) in widths.iter_mut().zip(row.iter()) {
                *width = (*width).max(cell.len());
            }
        }
        for row in std::iter::once(&header).chain(rows.iter()) {
            writeln!(
                f,
                "{:w0$}  {:w1$}  {:w2$}  {}",
                row[0],
                row[1],
                row[2],
                row[3],
                w0 = widths[0],
                w1 = widths[1],
                w2 = widths[2]
            )?;
        }
        Ok(())
    }
}
