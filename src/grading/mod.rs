pub mod store;

use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::judge::ExecutionOutcome;

pub use store::{AttemptStore, InMemoryAttemptStore};

const WARNING_MARKER: &str = "warning:";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub expected_output: String,
}

/// The parts of an exercise that decide how a run is graded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExerciseSpec {
    pub id: i64,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
    #[serde(default)]
    pub requires_plot: bool,
}

/// Exactly one policy applies per grading call, chosen by exercise shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradingPolicy<'a> {
    /// Normalized stdout must equal the first test case's expected output.
    ExpectedOutput { expected: &'a str, actual: &'a str },
    /// Run must be accepted and have produced a plot.
    PlotRequired,
    /// Run must be accepted with nothing but warnings on stderr and compile output.
    RanCleanly,
}

impl<'a> GradingPolicy<'a> {
    pub fn select(exercise: &'a ExerciseSpec, outcome: &'a ExecutionOutcome) -> Self {
        let stdout = outcome
            .result
            .stdout
            .as_deref()
            .filter(|stdout| !stdout.is_empty());

        match (exercise.test_cases.first(), stdout) {
            (Some(case), Some(actual)) => Self::ExpectedOutput {
                expected: &case.expected_output,
                actual,
            },
            _ if exercise.requires_plot => Self::PlotRequired,
            _ => Self::RanCleanly,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::ExpectedOutput { .. } => "expected-output",
            Self::PlotRequired => "plot-required",
            Self::RanCleanly => "ran-cleanly",
        }
    }

    pub fn verdict(&self, outcome: &ExecutionOutcome) -> bool {
        let accepted = outcome.result.status.is_accepted();
        match self {
            Self::ExpectedOutput { expected, actual } => {
                normalize_output(expected) == normalize_output(actual)
            }
            Self::PlotRequired => accepted && outcome.plot_image.is_some(),
            Self::RanCleanly => {
                accepted
                    && !has_real_errors(outcome.result.stderr.as_deref())
                    && !has_real_errors(outcome.result.compile_output.as_deref())
            }
        }
    }
}

/// Trims every line, drops blank ones and rejoins with `\n`.
pub fn normalize_output(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn has_real_errors(text: Option<&str>) -> bool {
    text.unwrap_or_default()
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .any(|line| !is_warning(line))
}

fn is_warning(line: &str) -> bool {
    line.get(..WARNING_MARKER.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(WARNING_MARKER))
}

/// Write-once record of a graded exercise run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradedAttempt {
    pub id: Uuid,
    pub user_id: String,
    pub exercise_id: i64,
    pub code: String,
    pub output: String,
    pub correct: bool,
    pub attempted_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct Grader {
    store: Arc<dyn AttemptStore>,
}

impl Grader {
    pub fn new(store: Arc<dyn AttemptStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn AttemptStore> {
        &self.store
    }

    /// Grades the outcome and records the attempt whatever the verdict.
    pub async fn grade_and_record(
        &self,
        user_id: &str,
        exercise: &ExerciseSpec,
        code: &str,
        outcome: &ExecutionOutcome,
    ) -> anyhow::Result<GradedAttempt> {
        let policy = GradingPolicy::select(exercise, outcome);
        let correct = policy.verdict(outcome);

        let attempt = GradedAttempt {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            exercise_id: exercise.id,
            code: code.to_string(),
            output: outcome.visible_output().to_string(),
            correct,
            attempted_at: Utc::now(),
        };

        self.store
            .insert(attempt.clone())
            .await
            .context("failed to record exercise attempt")?;

        tracing::info!(
            attempt_id = %attempt.id,
            exercise_id = exercise.id,
            policy = policy.name(),
            correct,
            "exercise attempt graded"
        );
        Ok(attempt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::judge::{ExecutionResult, JudgeStatus};

    fn grade(outcome: &ExecutionOutcome, exercise: &ExerciseSpec) -> bool {
        GradingPolicy::select(exercise, outcome).verdict(outcome)
    }

    fn outcome(status_id: i32, stdout: Option<&str>, stderr: Option<&str>) -> ExecutionOutcome {
        ExecutionOutcome {
            result: ExecutionResult {
                stdout: stdout.map(str::to_string),
                stderr: stderr.map(str::to_string),
                compile_output: None,
                status: JudgeStatus {
                    id: status_id,
                    description: String::new(),
                },
                time: None,
                memory: None,
            },
            plot_image: None,
        }
    }

    fn exercise(expected: Option<&str>, requires_plot: bool) -> ExerciseSpec {
        ExerciseSpec {
            id: 7,
            test_cases: expected
                .map(|e| TestCase {
                    expected_output: e.to_string(),
                })
                .into_iter()
                .collect(),
            requires_plot,
        }
    }

    #[test]
    fn normalization_ignores_padding_and_blank_lines() {
        assert_eq!(normalize_output("10 \n\n20"), "10\n20");
        assert_eq!(normalize_output("  a\r\n\r\n  b  \n"), "a\nb");
        assert_eq!(normalize_output("\n \n"), "");
    }

    #[test]
    fn expected_output_match_tolerates_whitespace() {
        let run = outcome(3, Some("10 \n\n20"), None);
        assert!(grade(&run, &exercise(Some("10\n20"), false)));
    }

    #[test]
    fn expected_output_mismatch_fails() {
        let run = outcome(3, Some("10\n21"), None);
        assert!(!grade(&run, &exercise(Some("10\n20"), false)));
    }

    #[test]
    fn expected_output_takes_precedence_over_plot() {
        let spec = exercise(Some("ok"), true);
        let run = outcome(3, Some("ok"), None);
        assert_eq!(
            GradingPolicy::select(&spec, &run),
            GradingPolicy::ExpectedOutput {
                expected: "ok",
                actual: "ok"
            }
        );
        assert!(grade(&run, &spec));
    }

    #[test]
    fn missing_stdout_falls_through_to_next_policy() {
        let spec = exercise(Some("10"), false);
        let run = outcome(3, None, None);
        assert_eq!(GradingPolicy::select(&spec, &run), GradingPolicy::RanCleanly);

        let plot_spec = exercise(Some("10"), true);
        assert_eq!(
            GradingPolicy::select(&plot_spec, &run),
            GradingPolicy::PlotRequired
        );
    }

    #[test]
    fn plot_policy_needs_accepted_status_and_image() {
        let spec = exercise(None, true);
        let mut run = outcome(3, None, None);
        assert!(!grade(&run, &spec));

        run.plot_image = Some("data:image/png;base64,QUJD".to_string());
        assert!(grade(&run, &spec));

        run.result.status.id = 11;
        assert!(!grade(&run, &spec));
    }

    #[test]
    fn heuristic_tolerates_warnings_only() {
        let spec = exercise(None, false);
        assert!(grade(
            &outcome(3, None, Some("warning: implicit conversion from numeric to char\n")),
            &spec
        ));
        assert!(grade(&outcome(3, Some("ans = 1"), Some("  Warning: deprecated\n\n")), &spec));
        assert!(!grade(
            &outcome(3, None, Some("warning: x\nerror: 'y' undefined")),
            &spec
        ));
    }

    #[test]
    fn heuristic_checks_compile_output_too() {
        let spec = exercise(None, false);
        let mut run = outcome(3, None, None);
        run.result.compile_output = Some("parse error near line 2".to_string());
        assert!(!grade(&run, &spec));
    }

    #[test]
    fn heuristic_rejects_non_accepted_and_validation_results() {
        let spec = exercise(None, false);
        assert!(!grade(&outcome(5, None, None), &spec));
        let rejected = ExecutionOutcome::from(ExecutionResult::rejected("Code cannot be empty"));
        assert!(!grade(&rejected, &spec));
    }

    #[tokio::test]
    async fn grader_records_every_attempt() {
        let store = Arc::new(InMemoryAttemptStore::new(None));
        let grader = Grader::new(store.clone());
        let spec = exercise(Some("42"), false);

        let wrong = grader
            .grade_and_record("user-1", &spec, "disp(41)", &outcome(3, Some("41"), None))
            .await
            .unwrap();
        let right = grader
            .grade_and_record("user-1", &spec, "disp(42)", &outcome(3, Some("42\n"), None))
            .await
            .unwrap();

        assert!(!wrong.correct);
        assert!(right.correct);
        assert_eq!(right.output, "42\n");
        assert_eq!(right.exercise_id, 7);

        let recent = store.recent("user-1", 7, 10).await.unwrap();
        assert_eq!(recent.len(), 2);
    }

    #[tokio::test]
    async fn recorded_output_falls_back_to_stderr() {
        let store = Arc::new(InMemoryAttemptStore::new(None));
        let grader = Grader::new(store);
        let attempt = grader
            .grade_and_record(
                "user-2",
                &exercise(None, false),
                "x(",
                &outcome(3, None, Some("parse error:\n")),
            )
            .await
            .unwrap();
        assert_eq!(attempt.output, "parse error:\n");
        assert!(!attempt.correct);
    }
}
