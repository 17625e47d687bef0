//! Operator tooling for the respondr deployment: Azure infrastructure,
//! per-environment Kubernetes rollouts and registry push webhooks.
//!
//! Each subcommand is a short sequence of `az` and `kubectl` calls. The
//! calls go through [`exec::Executor`] so the sequencing can be tested
//! without touching real infrastructure.

pub mod az;
pub mod config;
pub mod environment;
pub mod exec;
pub mod infra;
pub mod kubectl;
pub mod reconcile;
pub mod report;
pub mod template;
pub mod webhooks;
