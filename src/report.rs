use std::fmt::{Display, Formatter};

/// Outcome of one best-effort step.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Succeeded,
    Failed(String),
    /// Not attempted because an earlier step failed.
    Skipped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    /// Environment name, or the registry for registry-wide steps.
    pub target: String,
    pub step: &'static str,
    pub outcome: Outcome,
}

/// Results collected while running a sequence of steps, so status is
/// decided from values rather than from what was printed along the way.
#[derive(Debug, Default)]
pub struct Report {
    pub results: Vec<StepResult>,
}

impl Report {
    pub fn record(&mut self, target: &str, step: &'static str, outcome: Outcome) {
        self.results.push(StepResult {
            target: target.to_string(),
            step,
            outcome,
        });
    }

    pub fn failures(&self) -> impl Iterator<Item = &StepResult> {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, Outcome::Failed(_)))
    }

    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }

    pub fn outcome(&self, target: &str, step: &str) -> Option<&Outcome> {
        self.results
            .iter()
            .find(|r| r.target == target && r.step == step)
            .map(|r| &r.outcome)
    }
}

impl Display for Report {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let width = self.results.iter().map(|r| r.target.len()).max().unwrap_or(0);
        for result in &self.results {
            let outcome = match &result.outcome {
                Outcome::Succeeded => "ok".to_string(),
                Outcome::Skipped => "skipped".to_string(),
                Outcome::Failed(reason) => format!("FAILED: {reason}"),
            };
            writeln!(f, "{:width$}  {:<8}  {}", result.target, result.step, outcome)?;
        }
        Ok(())
    }
}
