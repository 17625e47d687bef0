use std::path::PathBuf;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum Error {
    #[error("no environments configured")]
    NoEnvironments,

    #[error("environment {0} is configured more than once")]
    Duplicate(String),

    #[error("unknown environment {0}")]
    Unknown(String),

    #[error("webhook scopes overlap: {first} ({first_scope}) and {second} ({second_scope})")]
    OverlappingScopes {
        first: String,
        first_scope: String,
        second: String,
        second_scope: String,
    },

    #[error("webhook name {0:?} must be 5 to 50 alphanumeric characters")]
    InvalidWebhookName(String),
}

/// One deployment target of the application.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Environment {
    pub name: String,
    /// Kubernetes namespace the manifest is applied to.
    pub namespace: String,
    /// Values file merged into the shared manifest template.
    pub values: PathBuf,
    /// Rendered manifest; a generated artifact.
    pub output: PathBuf,
    /// Deployment whose rollout is awaited.
    pub deployment: String,
    /// Image tag pushed for this environment.
    pub image_tag: String,
    pub webhook_name: String,
    pub callback_url: String,
}

impl Environment {
    /// Registry webhook scope, `<repository>:<tag>`.
    ///
    /// The scope must equal the reference used at push time or the webhook
    /// either never fires or fires for another environment's pushes.
    pub fn scope(&self, repository: &str) -> String {
        format!("{repository}:{}", self.image_tag)
    }
}

/// Whether a push matching one scope can trigger the other's webhook.
/// Registry scopes accept a trailing `*` wildcard.
pub fn scopes_overlap(a: &str, b: &str) -> bool {
    fn matches(pattern: &str, scope: &str) -> bool {
        match pattern.strip_suffix('*') {
            Some(prefix) => scope.starts_with(prefix),
            None => pattern == scope,
        }
    }
    matches(a, b) || matches(b, a)
}

/// Reject configurations where environments could trigger each other.
pub fn validate(environments: &[Environment], repository: &str) -> Result<(), Error> {
    if environments.is_empty() {
        return Err(Error::NoEnvironments);
    }
    for (i, first) in environments.iter().enumerate() {
        let name_ok = (5..=50).contains(&first.webhook_name.len())
            && first.webhook_name.chars().all(|c| c.is_ascii_alphanumeric());
        if !name_ok {
            return Err(Error::InvalidWebhookName(first.webhook_name.clone()));
        }
        for second in &environments[i + 1..] {
            if first.name == second.name {
                return Err(Error::Duplicate(first.name.clone()));
            }
            let (first_scope, second_scope) = (first.scope(repository), second.scope(repository));
            if scopes_overlap(&first_scope, &second_scope) {
                return Err(Error::OverlappingScopes {
                    first: first.name.clone(),
                    first_scope,
                    second: second.name.clone(),
                    second_scope,
                });
            }
        }
    }
    Ok(())
}

/// Environments named in `only`, in configuration order; all of them when
/// `only` is empty.
pub fn select<'a>(environments: &'a [Environment], only: &[String]) -> Result<Vec<&'a Environment>, Error> {
    if let Some(unknown) = only
        .iter()
        .find(|name| !environments.iter().any(|e| &e.name == *name))
    {
        return Err(Error::Unknown(unknown.clone()));
    }
    Ok(environments
        .iter()
        .filter(|e| only.is_empty() || only.contains(&e.name))
        .collect())
}

#[cfg(test)]
pub mod test {
    use super::*;

    pub fn environment(name: &str, tag: &str) -> Environment {
        Environment {
            name: name.to_string(),
            namespace: format!("respondr-{name}"),
            values: format!("deployment/values-{name}.yaml").into(),
            output: format!("deployment/respondr-{name}.yaml").into(),
            deployment: "respondr".to_string(),
            image_tag: tag.to_string(),
            webhook_name: format!("respondr{name}"),
            callback_url: format!("https://{name}.respondr.example.org/internal/acr-webhook"),
        }
    }

    #[test]
    fn scope_is_repository_and_tag() {
        assert_eq!(environment("prod", "latest").scope("respondr"), "respondr:latest");
    }

    #[test]
    fn overlap_rules() {
        assert!(scopes_overlap("respondr:latest", "respondr:latest"));
        assert!(scopes_overlap("respondr:*", "respondr:preprod"));
        assert!(scopes_overlap("respondr:pre*", "respondr:preprod"));
        assert!(!scopes_overlap("respondr:latest", "respondr:preprod"));
        assert!(!scopes_overlap("respondr:pre*", "respondr:latest"));
    }

    #[test]
    fn validate_rejects_shared_tag() {
        let envs = vec![environment("prod", "latest"), environment("preprod", "latest")];
        assert!(matches!(
            validate(&envs, "respondr"),
            Err(Error::OverlappingScopes { .. })
        ));
    }

    #[test]
    fn validate_rejects_wildcard_and_bad_names() {
        let envs = vec![environment("prod", "*"), environment("preprod", "preprod")];
        assert!(matches!(
            validate(&envs, "respondr"),
            Err(Error::OverlappingScopes { .. })
        ));

        let mut bad = environment("prod", "latest");
        bad.webhook_name = "respondr-prod".into();
        assert_eq!(
            validate(&[bad], "respondr"),
            Err(Error::InvalidWebhookName("respondr-prod".into()))
        );
        assert_eq!(validate(&[], "respondr"), Err(Error::NoEnvironments));
    }

    #[test]
    fn validate_rejects_duplicate_names() {
        let envs = vec![environment("prod", "latest"), environment("prod", "preprod")];
        assert_eq!(validate(&envs, "respondr"), Err(Error::Duplicate("prod".into())));
    }

    #[test]
    fn select_keeps_configuration_order() {
        let envs = vec![environment("prod", "latest"), environment("preprod", "preprod")];
        let names = |selected: Vec<&Environment>| {
            selected.iter().map(|e| e.name.clone()).collect::<Vec<_>>()
        };
        assert_eq!(names(select(&envs, &[]).unwrap()), vec!["prod", "preprod"]);
        assert_eq!(
            names(select(&envs, &["preprod".into(), "prod".into()]).unwrap()),
            vec!["prod", "preprod"]
        );
        assert_eq!(
            select(&envs, &["staging".into()]),
            Err(Error::Unknown("staging".into()))
        );
    }
}
