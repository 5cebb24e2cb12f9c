pub mod client;
pub mod error;
pub mod extract;
pub mod models;
pub mod plot;
pub mod transport;
pub mod validator;

pub use client::{ClientSettings, ExecutionClient};
pub use error::JudgeError;
pub use extract::ExecutionOutcome;
pub use models::{ExecuteOptions, ExecutionResult, JudgeStatus};
pub use transport::{HttpJudgeTransport, JudgeTransport};
