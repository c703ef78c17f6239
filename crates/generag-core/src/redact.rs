use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

const SECRET_PREFIXES: &[&str] = &["sk-", "sk_live_", "sk_test_", "Bearer "];

// Any known prefix followed by the rest of the token.
static SECRET_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = SECRET_PREFIXES
        .iter()
        .map(|p| regex::escape(p))
        .collect::<Vec<_>>()
        .join("|");
    let full = format!("(?:{pattern})[^\\s\"'`,;{{}}\\[\\]]*");
    Regex::new(&full).expect("secret redaction regex is valid")
});

/// Replace tokens that look like API keys with `[REDACTED]`.
///
/// Applied to upstream error text before it is logged or shown.
#[must_use]
pub fn redact_secrets(text: &str) -> Cow<'_, str> {
    if !SECRET_PREFIXES.iter().any(|p| text.contains(p)) {
        return Cow::Borrowed(text);
    }
    SECRET_REGEX.replace_all(text, "[REDACTED]")
}
