//! Beginner-facing explanations for common Octave error messages.
//!
//! Patterns are tried in order and the first match wins. Narrow patterns sit ahead of the
//! general ones they overlap with: `product: nonconformant arguments` gets the matrix
//! multiplication hint rather than the generic size-mismatch one.

use std::sync::LazyLock;

use regex::Regex;

struct Hint {
    pattern: Regex,
    explanation: &'static str,
}

static HINTS: LazyLock<Vec<Hint>> = LazyLock::new(|| {
    [
        (
            r"'(\w+)' undefined",
            "You used a variable that doesn't exist yet. Check your spelling, or make sure you defined it on a line above.",
        ),
        (
            r"undefined near line",
            "Something on this line hasn't been defined yet. Double-check that you created the variable or function before using it.",
        ),
        (
            r"parse error.*\n.*\^",
            "There's a typo or syntax mistake in your code. Look near the ^ symbol, something is off there.",
        ),
        (
            r"(?i)parse error",
            "The interpreter couldn't understand your code. Check for missing parentheses, quotes, or semicolons.",
        ),
        (
            r"operator \(\)",
            "You're trying to call something as a function that isn't one. Check your parentheses, maybe you used () on a variable instead of a function.",
        ),
        (
            r"product.*nonconformant",
            "Matrix multiplication requires the inner dimensions to match. For A*B, the number of columns in A must equal the number of rows in B.",
        ),
        (
            r"nonconformant arguments",
            "The sizes of your arrays don't match for this operation. Use size() to check dimensions before combining them.",
        ),
        (
            r"subscript indices",
            "You tried to access an element that doesn't exist. The index is out of bounds, check your array length with length() or size().",
        ),
        (
            r"singular matrix",
            "This matrix can't be inverted. It might have linearly dependent rows or columns. Check your data with det() or rank().",
        ),
        (
            r"index \(\d+\): out of bound",
            "You tried to access a position beyond the array's size. Check with length() to see how many elements exist.",
        ),
        (
            r"(?i)binary operator.*with a.*matrix",
            "You're mixing incompatible types in an operation. Make sure both sides of the operator are the same type.",
        ),
        (
            r"wrong type argument.*'cell'",
            "You're treating a cell array like a regular array. Use curly braces {i} instead of parentheses (i) to access cell contents.",
        ),
        (
            r"invalid call to",
            "You called a function with the wrong number of inputs. Check the function's expected arguments.",
        ),
        (
            r"error: for.*body.*empty",
            "Your loop body is empty. Make sure you have code between 'for' and 'end'.",
        ),
        (
            r"unfinished string",
            "You started a string with a quote but never closed it. Make sure every opening quote has a matching closing quote.",
        ),
    ]
    .into_iter()
    .map(|(pattern, explanation)| Hint {
        pattern: Regex::new(pattern).expect("diagnostic hint regex must compile"),
        explanation,
    })
    .collect()
});

/// Returns a friendly explanation for raw interpreter stderr, or `None` if nothing matches.
pub fn friendly_error(stderr: &str) -> Option<&'static str> {
    HINTS
        .iter()
        .find(|hint| hint.pattern.is_match(stderr))
        .map(|hint| hint.explanation)
}
