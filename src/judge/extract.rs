use std::sync::LazyLock;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use regex::Regex;
use serde::Serialize;

use crate::judge::models::ExecutionResult;

pub const PLOT_START_MARKER: &str = "__PLOT_BASE64_START__";
pub const PLOT_END_MARKER: &str = "__PLOT_BASE64_END__";

const PNG_DATA_URI_PREFIX: &str = "data:image/png;base64,";

static PLOT_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?s){}\s*(.*?)\s*{}",
        regex::escape(PLOT_START_MARKER),
        regex::escape(PLOT_END_MARKER)
    ))
    .expect("plot block regex must compile")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlotExtraction {
    /// Visible stdout with the plot block removed. `None` when nothing else was printed.
    pub stdout: Option<String>,
    /// `data:image/png;base64,...` URI.
    pub plot_image: Option<String>,
}

/// Splits judge stdout into the human-visible text and the embedded plot payload.
pub fn extract_plot(stdout: &str) -> PlotExtraction {
    let Some(block) = PLOT_BLOCK.captures(stdout) else {
        return PlotExtraction {
            stdout: Some(stdout.to_string()),
            plot_image: None,
        };
    };

    let whole = block.get(0).map(|m| m.range()).unwrap_or(0..0);
    let payload: String = block
        .get(1)
        .map(|m| m.as_str())
        .unwrap_or_default()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    let plot_image = if payload.is_empty() {
        None
    } else if STANDARD.decode(payload.as_bytes()).is_err() {
        tracing::warn!(payload_len = payload.len(), "discarding malformed plot payload");
        None
    } else {
        Some(format!("{PNG_DATA_URI_PREFIX}{payload}"))
    };

    let mut visible = String::with_capacity(stdout.len() - whole.len());
    visible.push_str(&stdout[..whole.start]);
    visible.push_str(&stdout[whole.end..]);
    let visible = visible.trim();

    PlotExtraction {
        stdout: (!visible.is_empty()).then(|| visible.to_string()),
        plot_image,
    }
}

/// Terminal result with the plot payload lifted out of stdout.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionOutcome {
    #[serde(flatten)]
    pub result: ExecutionResult,
    pub plot_image: Option<String>,
}

impl ExecutionOutcome {
    /// What the learner sees first: stdout, else stderr, else compile output.
    pub fn visible_output(&self) -> &str {
        [
            &self.result.stdout,
            &self.result.stderr,
            &self.result.compile_output,
        ]
        .into_iter()
        .flatten()
        .map(String::as_str)
        .find(|text| !text.is_empty())
        .unwrap_or_default()
    }
}

impl From<ExecutionResult> for ExecutionOutcome {
    fn from(mut result: ExecutionResult) -> Self {
        let mut plot_image = None;
        if let Some(stdout) = result.stdout.take() {
            let extracted = extract_plot(&stdout);
            result.stdout = extracted.stdout;
            plot_image = extracted.plot_image;
        }
        Self { result, plot_image }
    }
}
