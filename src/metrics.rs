use std::sync::atomic::{AtomicU64, Ordering};

use crate::judge::{ExecutionResult, JudgeError, models::StatusClass};

#[derive(Debug, Default)]
pub struct MetricsRegistry {
    executions_total: AtomicU64,
    rejected_total: AtomicU64,
    accepted_total: AtomicU64,
    judge_failed_total: AtomicU64,
    client_errors_total: AtomicU64,
    timed_out_total: AtomicU64,
    attempts_graded_total: AtomicU64,
    attempts_correct_total: AtomicU64,
    in_flight: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn started(&self) {
        self.executions_total.fetch_add(1, Ordering::Relaxed);
        self.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    pub fn finished(&self, outcome: Result<&ExecutionResult, &JudgeError>) {
        self.decrement_in_flight();
        let counter = match outcome {
            Ok(result) => match result.status.classify() {
                StatusClass::Rejected => &self.rejected_total,
                StatusClass::Accepted => &self.accepted_total,
                _ => &self.judge_failed_total,
            },
            Err(JudgeError::Client { .. }) => &self.client_errors_total,
            Err(JudgeError::Timeout { .. } | JudgeError::Cancelled) => &self.timed_out_total,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn graded(&self, correct: bool) {
        self.attempts_graded_total.fetch_add(1, Ordering::Relaxed);
        if correct {
            self.attempts_correct_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn render_prometheus(&self) -> String {
        format!(
            concat!(
                "# TYPE execution_total counter\n",
                "execution_total {}\n",
                "# TYPE execution_rejected_total counter\n",
                "execution_rejected_total {}\n",
                "# TYPE execution_accepted_total counter\n",
                "execution_accepted_total {}\n",
                "# TYPE execution_judge_failed_total counter\n",
                "execution_judge_failed_total {}\n",
                "# TYPE execution_client_errors_total counter\n",
                "execution_client_errors_total {}\n",
                "# TYPE execution_timed_out_total counter\n",
                "execution_timed_out_total {}\n",
                "# TYPE attempts_graded_total counter\n",
                "attempts_graded_total {}\n",
                "# TYPE attempts_correct_total counter\n",
                "attempts_correct_total {}\n",
                "# TYPE execution_in_flight gauge\n",
                "execution_in_flight {}\n"
            ),
            self.executions_total.load(Ordering::Relaxed),
            self.rejected_total.load(Ordering::Relaxed),
            self.accepted_total.load(Ordering::Relaxed),
            self.judge_failed_total.load(Ordering::Relaxed),
            self.client_errors_total.load(Ordering::Relaxed),
            self.timed_out_total.load(Ordering::Relaxed),
            self.attempts_graded_total.load(Ordering::Relaxed),
            self.attempts_correct_total.load(Ordering::Relaxed),
            self.in_flight.load(Ordering::Relaxed),
        )
    }

    fn decrement_in_flight(&self) {
        let mut current = self.in_flight.load(Ordering::Relaxed);
        while current > 0 {
            match self.in_flight.compare_exchange_weak(
                current,
                current - 1,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }
}
