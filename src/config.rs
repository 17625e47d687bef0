use std::path::{Path, PathBuf};
use std::time::Duration;
use log::debug;
use serde::Deserialize;
use serde_inline_default::serde_inline_default;
use thiserror::Error;

use crate::environment::Environment;

const DEFAULT_CONFIG: &str = include_str!("../default.toml");

/// Picked up from the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "respondr-deploy.toml";

#[derive(Error, Debug)]
pub enum Error {
    #[error("read {path}: {err}")]
    ReadFile {
        err: std::io::Error,
        path: String,
    },

    #[error("parse {path}: {err}")]
    Parse {
        err: toml::de::Error,
        path: String,
    },
}

/// A respondr-deploy.toml file.
#[derive(Deserialize, Debug, Clone)]
pub struct File {
    pub description: Option<String>,
    #[serde(default)]
    pub azure: Azure,
    pub infra: Infra,
    pub kubernetes: Kubernetes,
    pub registry: Registry,
    #[serde(rename = "environment", default)]
    pub environments: Vec<Environment>,
}

impl Default for File {
    fn default() -> Self {
        // The default config is compiled into the program, so
        // make sure to test default() to catch panics compile-time.
        toml::from_str(DEFAULT_CONFIG).unwrap()
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct Azure {
    pub subscription: Option<String>,
}

#[serde_inline_default]
#[derive(Deserialize, Debug, Clone)]
pub struct Infra {
    #[serde_inline_default("respondr".to_string())]
    pub resource_group: String,
    #[serde_inline_default("westus".to_string())]
    pub location: String,
    pub template_file: PathBuf,
    /// Template parameter that receives the location. Empty when the
    /// template takes no location parameter.
    #[serde_inline_default("location".to_string())]
    pub location_parameter: String,
    /// Extra `key=value` template parameters.
    #[serde(default)]
    pub parameters: Vec<String>,
    #[serde_inline_default("respondr".to_string())]
    pub deployment_name_prefix: String,
    #[serde_inline_default(30)]
    pub cleanup_delay_secs: u64,
    /// Hooks are argument vectors; `{resource_group}` and `{location}`
    /// are substituted. An empty vector disables the hook.
    #[serde(default)]
    pub cleanup: Vec<String>,
    #[serde(default)]
    pub purge: Vec<String>,
    #[serde(default)]
    pub post_deploy: Vec<String>,
}

impl Infra {
    pub fn cleanup_delay(&self) -> Duration {
        Duration::from_secs(self.cleanup_delay_secs)
    }
}

#[serde_inline_default]
#[derive(Deserialize, Debug, Clone)]
pub struct Kubernetes {
    pub context: Option<String>,
    /// Manifest template shared by every environment.
    pub template: PathBuf,
    #[serde_inline_default(300)]
    pub rollout_timeout_secs: u64,
}

impl Kubernetes {
    pub fn rollout_timeout(&self) -> Duration {
        Duration::from_secs(self.rollout_timeout_secs)
    }
}

#[serde_inline_default]
#[derive(Deserialize, Debug, Clone)]
pub struct Registry {
    pub name: String,
    /// Image repository the webhook scopes are built from.
    pub repository: String,
    #[serde_inline_default("X-ACR-Token".to_string())]
    pub token_header: String,
    /// Environment variable holding the shared webhook token.
    #[serde_inline_default("ACR_WEBHOOK_TOKEN".to_string())]
    pub token_env: String,
}

impl File {
    /// Read a configuration file from disk and merge it over the built-in
    /// defaults. Tables merge key by key; any other value, arrays of
    /// environments included, replaces the default.
    pub fn default_with_user_config_file(path: &Path) -> Result<Self, Error> {
        let display = path.display().to_string();
        let user = std::fs::read_to_string(path).map_err(|err| Error::ReadFile {
            err,
            path: display.clone(),
        })?;
        Self::default_with_user_config(&user, &display)
    }

    fn default_with_user_config(user: &str, path: &str) -> Result<Self, Error> {
        let parse_err = |err| Error::Parse {
            err,
            path: path.to_string(),
        };
        let mut merged: toml::Value = toml::from_str(DEFAULT_CONFIG).map_err(parse_err)?;
        let user: toml::Value = toml::from_str(user).map_err(parse_err)?;
        merge(&mut merged, user);
        merged.try_into().map_err(parse_err)
    }

    /// Use `explicit` if given, otherwise `respondr-deploy.toml` in the
    /// working directory if it exists, otherwise the built-in defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, Error> {
        let implicit = Path::new(DEFAULT_CONFIG_FILE);
        match explicit {
            Some(path) => Self::default_with_user_config_file(path),
            None if implicit.is_file() => {
                debug!("Using configuration file {DEFAULT_CONFIG_FILE}");
                Self::default_with_user_config_file(implicit)
            }
            None => Ok(Self::default()),
        }
    }
}

fn merge(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
