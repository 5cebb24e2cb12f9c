use thiserror::Error;

#[derive(Debug, Error)]
pub enum JudgeError {
    /// Non-success response or transport failure talking to the judge.
    #[error("{message}")]
    Client {
        message: String,
        status_code: Option<u16>,
    },
    #[error("Execution timed out waiting for result after {attempts} polls")]
    Timeout { attempts: u32 },
    #[error("Execution was cancelled before a result was available")]
    Cancelled,
}

impl JudgeError {
    pub fn client(message: impl Into<String>, status_code: Option<u16>) -> Self {
        Self::Client {
            message: message.into(),
            status_code,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Client { status_code, .. } => *status_code,
            _ => None,
        }
    }
}
