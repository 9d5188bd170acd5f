use regex::Regex;
use std::sync::LazyLock;

pub const PLACEHOLDER: &str = "unknown_topic";

static DISALLOWED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9\s-]").expect("valid regex"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Maps arbitrary text to a token that is safe as part of a file name:
/// lower-case letters, digits, hyphens, and underscores in place of
/// whitespace runs.
pub fn sanitize_filename(text: &str) -> String {
    let text = if text.is_empty() { PLACEHOLDER } else { text };

    let lowered = text.to_lowercase();
    let stripped = DISALLOWED.replace_all(&lowered, "");
    let token = WHITESPACE.replace_all(stripped.trim(), "_").into_owned();

    // nothing survived the filter
    if token.is_empty() {
        return PLACEHOLDER.to_string();
    }
    token
}
