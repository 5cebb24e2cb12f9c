use std::fmt;

use serde::{Deserialize, Serialize};

/// GNU Octave on Judge0 CE.
pub const OCTAVE_LANGUAGE_ID: u32 = 32;

/// Status id reserved for locally rejected code. Never issued by the judge.
pub const VALIDATION_ERROR_STATUS_ID: i32 = -1;

pub const ACCEPTED_STATUS_ID: i32 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionLimits {
    pub cpu_time_limit_secs: u32,
    pub wall_time_limit_secs: u32,
    pub memory_limit_kb: u32,
}

impl Default for SubmissionLimits {
    fn default() -> Self {
        Self {
            cpu_time_limit_secs: 10,
            wall_time_limit_secs: 20,
            memory_limit_kb: 128_000,
        }
    }
}

/// Body of `POST /submissions`. Built once per call and never mutated.
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionRequest {
    source_code: String,
    language_id: u32,
    cpu_time_limit: u32,
    wall_time_limit: u32,
    memory_limit: u32,
}

impl SubmissionRequest {
    pub fn new(source_code: String, language_id: u32, limits: &SubmissionLimits) -> Self {
        Self {
            source_code,
            language_id,
            cpu_time_limit: limits.cpu_time_limit_secs,
            wall_time_limit: limits.wall_time_limit_secs,
            memory_limit: limits.memory_limit_kb,
        }
    }

    pub fn source_code(&self) -> &str {
        &self.source_code
    }

    pub fn language_id(&self) -> u32 {
        self.language_id
    }
}

/// Opaque handle for a pending judge execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmissionToken(String);

impl SubmissionToken {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubmissionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubmissionResponse {
    pub token: SubmissionToken,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudgeStatus {
    pub id: i32,
    pub description: String,
}

/// Where a status sits in the submission lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    InQueue,
    Processing,
    Accepted,
    /// Definitive judge failure: wrong answer, limits exceeded, compile or runtime error.
    Failed,
    /// Local pseudo-status for code that never reached the judge.
    Rejected,
}

impl StatusClass {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::InQueue | Self::Processing)
    }
}

impl JudgeStatus {
    pub fn validation_error() -> Self {
        Self {
            id: VALIDATION_ERROR_STATUS_ID,
            description: "Validation Error".to_string(),
        }
    }

    pub fn classify(&self) -> StatusClass {
        match self.id {
            VALIDATION_ERROR_STATUS_ID => StatusClass::Rejected,
            ACCEPTED_STATUS_ID => StatusClass::Accepted,
            id if id > 2 => StatusClass::Failed,
            1 => StatusClass::InQueue,
            _ => StatusClass::Processing,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.classify().is_terminal()
    }

    pub fn is_accepted(&self) -> bool {
        self.classify() == StatusClass::Accepted
    }
}

/// Snapshot returned by `GET /submissions/{token}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    #[serde(default)]
    pub stdout: Option<String>,
    #[serde(default)]
    pub stderr: Option<String>,
    #[serde(default)]
    pub compile_output: Option<String>,
    pub status: JudgeStatus,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub memory: Option<u64>,
}

impl ExecutionResult {
    /// Terminal pseudo-result for code rejected before submission.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            stdout: None,
            stderr: Some(message.into()),
            compile_output: None,
            status: JudgeStatus::validation_error(),
            time: None,
            memory: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ExecuteOptions {
    #[serde(default)]
    pub requires_plot: bool,
}
