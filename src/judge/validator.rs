//! Static pre-submission filter.
//!
//! Runs before any network call so obviously hostile or oversized code never costs judge
//! quota. The judge sandbox remains the real isolation boundary.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

pub const MAX_CODE_LENGTH: usize = 10_000;

/// Functions that read or write files by path. Octave accepts both call and command syntax.
const FILE_ACCESS_FNS: &str = concat!(
    "fopen|load|save|fileread|textread|dlmread|dlmwrite|csvread|csvwrite|",
    "importdata|imread|imwrite|audioread|copyfile|movefile|type"
);

const SENSITIVE_ROOTS: &str = "/etc|/proc|/sys|/dev|/root|/boot";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Code cannot be empty")]
    Empty,
    #[error("Code exceeds maximum length of {max} characters")]
    TooLong { max: usize },
    #[error("{message}")]
    Forbidden {
        rule: &'static str,
        message: &'static str,
    },
}

struct ForbiddenRule {
    name: &'static str,
    pattern: Regex,
    message: &'static str,
}

impl ForbiddenRule {
    fn new(name: &'static str, pattern: &str, message: &'static str) -> Self {
        Self {
            name,
            // Patterns are compile-time constants exercised by the tests below.
            pattern: Regex::new(pattern).expect("forbidden-pattern regex must compile"),
            message,
        }
    }
}

static FORBIDDEN_RULES: LazyLock<Vec<ForbiddenRule>> = LazyLock::new(|| {
    vec![
        ForbiddenRule::new(
            "shell-escape",
            r"(?i)\b(?:system|unix|dos|perl|python|shell_cmd|popen2?|exec|java\w*)\s*\(",
            "Code contains forbidden system commands",
        ),
        ForbiddenRule::new(
            "file-deletion",
            r"\b(?:delete|rmdir|unlink)\s*\(",
            "Code contains forbidden file deletion calls",
        ),
        ForbiddenRule::new(
            "package-manager",
            r#"(?i)\bpkg(?:\s+|\s*\(\s*['"])(?:install|uninstall)\b"#,
            "Code contains forbidden package management commands",
        ),
        ForbiddenRule::new(
            "system-path",
            &format!(
                concat!(
                    r#"\b(?:{fns})(?:\s*\(\s*\[?\s*['"]|\s+)"#,
                    r#"(?:{roots})(?:[/'"\s)\]]|$)"#
                ),
                fns = FILE_ACCESS_FNS,
                roots = SENSITIVE_ROOTS,
            ),
            "Code contains forbidden access to system paths",
        ),
        ForbiddenRule::new(
            "path-traversal",
            // `..` only counts when it opens a path segment, so `'...\n'` escapes and
            // transpose quotes pass.
            &format!(
                concat!(
                    r#"['"](?:[^'"\n]*[/\\])?\.\.[/\\]"#,
                    r#"|\b(?:{fns})\s+(?:[^\s;,'"]*[/\\])?\.\.[/\\]"#
                ),
                fns = FILE_ACCESS_FNS,
            ),
            "Code contains forbidden directory traversal",
        ),
    ]
});

/// Checks learner code against the submission policy.
///
/// Pure and total: the same input always yields the same verdict.
pub fn validate(source: &str) -> Result<(), ValidationError> {
    if source.trim().is_empty() {
        return Err(ValidationError::Empty);
    }

    if source.chars().count() > MAX_CODE_LENGTH {
        return Err(ValidationError::TooLong {
            max: MAX_CODE_LENGTH,
        });
    }

    match FORBIDDEN_RULES
        .iter()
        .find(|rule| rule.pattern.is_match(source))
    {
        Some(rule) => Err(ValidationError::Forbidden {
            rule: rule.name,
            message: rule.message,
        }),
        None => Ok(()),
    }
}
