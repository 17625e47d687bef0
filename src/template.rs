//! Manifest templating.
//!
//! Templates are Tera (Jinja2-style) documents rendered with the values of
//! a YAML file. Nested mappings are reachable with dotted access, so
//! `image: { tag: preprod }` is available as `{{ image.tag }}`.
use std::path::Path;
use chrono::{SecondsFormat, Utc};
use log::debug;
use serde_yaml::Value;
use tera::{Context, Tera};
use thiserror::Error;
use Error::*;

#[derive(Error, Debug)]
pub enum Error {
    #[error("read {path}: {err}")]
    ReadFile {
        err: std::io::Error,
        path: String,
    },

    #[error("write {path}: {err}")]
    WriteFile {
        err: std::io::Error,
        path: String,
    },

    #[error("deserialize values: {0}")]
    Deserialize(#[from] serde_yaml::Error),

    #[error("values must be a mapping at the top level")]
    ValuesNotMapping,

    #[error("render: {0}")]
    Render(String),
}

impl From<tera::Error> for Error {
    /// Tera keeps the useful part (which variable, which line) in the
    /// source chain, so flatten it into the message.
    fn from(err: tera::Error) -> Self {
        let mut message = err.to_string();
        let mut source = std::error::Error::source(&err);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = std::error::Error::source(cause);
        }
        Render(message)
    }
}

/// Template values loaded from YAML.
#[derive(Debug, Default)]
pub struct Values(Context);

impl Values {
    pub fn parse(yaml_string: &str) -> Result<Self, Error> {
        match serde_yaml::from_str::<Value>(yaml_string)? {
            Value::Mapping(mapping) => Ok(Self(Context::from_serialize(&mapping)?)),
            Value::Null => Ok(Self::default()),
            _ => Err(ValuesNotMapping),
        }
    }

    pub fn parse_file(path: &Path) -> Result<Self, Error> {
        Self::parse(&read(path)?)
    }
}

/// Render a single template string; undefined variables are errors.
pub fn render(template: &str, values: &Values) -> Result<String, Error> {
    Ok(Tera::one_off(template, &values.0, false)?)
}

/// Render `template` with `values` into `output`, prefixed with a
/// generated-file header.
pub fn render_file(template: &Path, values: &Path, output: &Path) -> Result<(), Error> {
    debug!(
        "Rendering {} with {} into {}",
        template.display(),
        values.display(),
        output.display()
    );
    let body = render(&read(template)?, &Values::parse_file(values)?)?;
    let header = format!(
        "# Generated by respondr-deploy from {} and {} at {}. Do not edit.\n",
        template.display(),
        values.display(),
        Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
    );
    std::fs::write(output, header + &body).map_err(|err| WriteFile {
        err,
        path: output.display().to_string(),
    })
}

fn read(path: &Path) -> Result<String, Error> {
    std::fs::read_to_string(path).map_err(|err| ReadFile {
        err,
        path: path.display().to_string(),
    })
}
