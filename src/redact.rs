use std::sync::OnceLock;

use regex::Regex;

/// Controls how much backend detail reaches the caller in error messages.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum BuildMode {
    /// Pass backend messages through after redacting secret-like substrings.
    Development,
    /// Replace every backend message with a generic string.
    #[default]
    Production,
}

pub(crate) const GENERIC_ERROR_MESSAGE: &str =
    "The request could not be completed. Please try again.";

const REDACTED: &str = "[redacted]";

fn secret_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // Anything that looks like `password=...`, `token: ...`, `Bearer xyz`
        // or similar key/value secrets. The keyword itself is kept so the
        // message stays diagnosable.
        Regex::new(r"(?i)\b(password|passwd|token|secret|api[_-]?key|bearer|authorization)\b\s*[=:]?\s*\S+")
            .expect("secret redaction pattern must compile")
    })
}

/// Sanitizes a backend-provided error message for display.
pub(crate) fn sanitize(mode: BuildMode, message: &str) -> String {
    match mode {
        BuildMode::Production => GENERIC_ERROR_MESSAGE.to_owned(),
        BuildMode::Development => secret_pattern()
            .replace_all(message, |captures: &regex::Captures<'_>| {
                format!("{} {REDACTED}", &captures[1])
            })
            .into_owned(),
    }
}
