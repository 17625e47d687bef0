use log::{error, info};

use crate::config;
use crate::environment::{self, Environment};
use crate::exec::{Executor, Session};
use crate::kubectl::Kubectl;
use crate::report::{Outcome, Report};
use crate::template;

#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Restrict the run to these environments.
    pub only: Vec<String>,
    /// Stop at the first environment that fails.
    pub fail_fast: bool,
}

const STEPS: [&str; 3] = ["render", "apply", "rollout"];

/// Render, apply and await every selected environment in order.
///
/// A failing environment does not stop the next one unless `fail_fast`
/// is set; the returned report decides the exit status.
pub async fn run<E: Executor>(
    exec: &E,
    session: &Session,
    kubernetes: &config::Kubernetes,
    environments: &[Environment],
    options: &Options,
) -> Result<Report, environment::Error> {
    let selected = environment::select(environments, &options.only)?;
    let kubectl = Kubectl::new(exec, session);
    let mut report = Report::default();

    let mut halted = false;
    for env in selected {
        if halted {
            for step in STEPS {
                report.record(&env.name, step, Outcome::Skipped);
            }
            continue;
        }
        info!("Reconciling {} in namespace {}", env.name, env.namespace);
        let failed = reconcile_one(&kubectl, kubernetes, env, &mut report).await;
        if failed && options.fail_fast {
            error!("{} failed, skipping remaining environments", env.name);
            halted = true;
        }
    }
    Ok(report)
}

/// Returns whether any step failed.
async fn reconcile_one<E: Executor>(
    kubectl: &Kubectl<'_, E>,
    kubernetes: &config::Kubernetes,
    env: &Environment,
    report: &mut Report,
) -> bool {
    let result = async {
        template::render_file(&kubernetes.template, &env.values, &env.output)
            .map_err(|err| ("render", err.to_string()))?;
        report.record(&env.name, "render", Outcome::Succeeded);

        kubectl
            .apply(&env.output, &env.namespace)
            .await
            .map_err(|err| ("apply", err.to_string()))?;
        report.record(&env.name, "apply", Outcome::Succeeded);

        kubectl
            .rollout_status(&env.deployment, &env.namespace, kubernetes.rollout_timeout())
            .await
            .map_err(|err| ("rollout", err.to_string()))?;
        report.record(&env.name, "rollout", Outcome::Succeeded);
        Ok::<(), (&'static str, String)>(())
    }
    .await;

    match result {
        Ok(()) => {
            info!("{} rolled out", env.name);
            false
        }
        Err((step, reason)) => {
            error!("{}: {step} failed: {reason}", env.name);
            report.record(&env.name, step, Outcome::Failed(reason));
            for remaining in STEPS.iter().copied().skip_while(|s| *s != step).skip(1) {
                report.record(&env.name, remaining, Outcome::Skipped);
            }
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::test::environment;
    use crate::exec::test::{fail, ok, starts};
    use crate::exec::{Invocation, MockExecutor, Output};
    use mockall::Sequence;
    use std::path::Path;

    type Answer = fn(&Invocation) -> std::io::Result<Output>;

    struct Workspace {
        _dir: tempfile::TempDir,
        kubernetes: config::Kubernetes,
        environments: Vec<Environment>,
    }

    fn workspace() -> Workspace {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("template.yaml");
        std::fs::write(
            &template,
            "metadata:\n  namespace: {{ namespace }}\nimage: respondr:{{ image.tag }}\n",
        )
        .unwrap();

        let mut environments = vec![];
        for (name, tag) in [("production", "latest"), ("preprod", "preprod")] {
            let mut env = environment(name, tag);
            env.values = dir.path().join(format!("values-{name}.yaml"));
            env.output = dir.path().join(format!("out-{name}.yaml"));
            std::fs::write(
                &env.values,
                format!("namespace: {}\nimage:\n  tag: {tag}\n", env.namespace),
            )
            .unwrap();
            environments.push(env);
        }

        Workspace {
            kubernetes: config::Kubernetes {
                context: None,
                template,
                rollout_timeout_secs: 300,
            },
            environments,
            _dir: dir,
        }
    }

    fn expect_apply(
        exec: &mut MockExecutor,
        seq: &mut Sequence,
        env: &Environment,
        answer: Answer,
    ) {
        let output = env.output.clone();
        let namespace = env.namespace.clone();
        exec.expect_run()
            .withf(move |i| {
                starts("kubectl apply")(i)
                    && i.value_of("--filename").map(Path::new) == Some(output.as_path())
                    && i.value_of("--namespace") == Some(namespace.as_str())
            })
            .times(1)
            .in_sequence(seq)
            .returning(answer);
    }

    fn expect_rollout(
        exec: &mut MockExecutor,
        seq: &mut Sequence,
        env: &Environment,
        answer: Answer,
    ) {
        let namespace = env.namespace.clone();
        exec.expect_run()
            .withf(move |i| {
                starts("kubectl rollout status deployment/respondr")(i)
                    && i.value_of("--namespace") == Some(namespace.as_str())
            })
            .times(1)
            .in_sequence(seq)
            .returning(answer);
    }

    #[tokio::test]
    async fn each_environment_uses_its_own_inputs() {
        let ws = workspace();
        let mut exec = MockExecutor::new();
        let mut seq = Sequence::new();
        // production first
        for env in &ws.environments {
            expect_apply(&mut exec, &mut seq, env, |_| ok("configured"));
            expect_rollout(&mut exec, &mut seq, env, |_| ok(""));
        }

        let report = run(
            &exec,
            &Session::default(),
            &ws.kubernetes,
            &ws.environments,
            &Options::default(),
        )
        .await
        .unwrap();
        assert!(report.is_success());

        for env in &ws.environments {
            let rendered = std::fs::read_to_string(&env.output).unwrap();
            assert!(rendered.contains(&format!("namespace: {}", env.namespace)));
            assert!(rendered.contains(&format!("image: respondr:{}", env.image_tag)));
        }
    }

    #[tokio::test]
    async fn rollout_failure_does_not_stop_next_environment() {
        let ws = workspace();
        let (production, preprod) = (&ws.environments[0], &ws.environments[1]);
        let mut exec = MockExecutor::new();
        let mut seq = Sequence::new();
        expect_apply(&mut exec, &mut seq, production, |_| ok(""));
        expect_rollout(&mut exec, &mut seq, production, |_| {
            fail(1, "error: timed out waiting for the condition")
        });
        expect_apply(&mut exec, &mut seq, preprod, |_| ok(""));
        expect_rollout(&mut exec, &mut seq, preprod, |_| ok(""));

        let report = run(
            &exec,
            &Session::default(),
            &ws.kubernetes,
            &ws.environments,
            &Options::default(),
        )
        .await
        .unwrap();

        assert!(!report.is_success());
        assert!(matches!(
            report.outcome("production", "rollout"),
            Some(Outcome::Failed(reason)) if reason.contains("did not complete within 300s")
        ));
        assert_eq!(report.outcome("preprod", "rollout"), Some(&Outcome::Succeeded));
    }

    #[tokio::test]
    async fn fail_fast_skips_remaining_environments() {
        let ws = workspace();
        let mut exec = MockExecutor::new();
        let mut seq = Sequence::new();
        expect_apply(&mut exec, &mut seq, &ws.environments[0], |_| fail(1, "forbidden"));

        let options = Options {
            fail_fast: true,
            ..Default::default()
        };
        let report = run(&exec, &Session::default(), &ws.kubernetes, &ws.environments, &options)
            .await
            .unwrap();

        assert_eq!(report.outcome("production", "rollout"), Some(&Outcome::Skipped));
        assert_eq!(report.outcome("preprod", "render"), Some(&Outcome::Skipped));
        assert_eq!(report.failures().count(), 1);
    }

    #[tokio::test]
    async fn render_failure_skips_kubectl_for_that_environment() {
        let ws = workspace();
        std::fs::remove_file(&ws.environments[0].values).unwrap();
        let mut exec = MockExecutor::new();
        let mut seq = Sequence::new();
        expect_apply(&mut exec, &mut seq, &ws.environments[1], |_| ok(""));
        expect_rollout(&mut exec, &mut seq, &ws.environments[1], |_| ok(""));

        let report = run(
            &exec,
            &Session::default(),
            &ws.kubernetes,
            &ws.environments,
            &Options::default(),
        )
        .await
        .unwrap();

        assert!(matches!(report.outcome("production", "render"), Some(Outcome::Failed(_))));
        assert_eq!(report.outcome("production", "apply"), Some(&Outcome::Skipped));
        assert_eq!(report.outcome("preprod", "rollout"), Some(&Outcome::Succeeded));
    }

    #[tokio::test]
    async fn only_runs_selected_environment() {
        let ws = workspace();
        let mut exec = MockExecutor::new();
        let mut seq = Sequence::new();
        expect_apply(&mut exec, &mut seq, &ws.environments[1], |_| ok(""));
        expect_rollout(&mut exec, &mut seq, &ws.environments[1], |_| ok(""));

        let options = Options {
            only: vec!["preprod".into()],
            ..Default::default()
        };
        let report = run(&exec, &Session::default(), &ws.kubernetes, &ws.environments, &options)
            .await
            .unwrap();
        assert!(report.outcome("production", "render").is_none());
        assert!(!ws.environments[0].output.exists());

        let options = Options {
            only: vec!["staging".into()],
            ..Default::default()
        };
        assert!(run(&exec, &Session::default(), &ws.kubernetes, &ws.environments, &options)
            .await
            .is_err());
    }
}
