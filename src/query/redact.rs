//! Redaction of backend error messages.
//!
//! Every message that originates in the database driver passes through a
//! [`Redactor`] before it is shown or logged.

use crate::config::ConnectionConfig;
use regex::Regex;
use std::sync::LazyLock;

/// Replacement text for redacted substrings.
pub const REDACTED: &str = "***";

/// Maximum length of a surfaced message, in characters.
pub const MAX_MESSAGE_CHARS: usize = 200;

static CONNECTION_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)postgres(?:ql)?://\S+").expect("valid regex"));

static PASSWORD_ASSIGNMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)password\s*[=:]\s*[^\s,;]+").expect("valid regex"));

/// Strips known secrets and credential-shaped text from messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Redactor {
    secrets: Vec<String>,
}

impl Redactor {
    /// Creates a redactor for the given secret substrings.
    ///
    /// Empty strings are ignored. Longer secrets are replaced first so a
    /// secret containing another is removed whole.
    pub fn new<I, S>(secrets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut secrets: Vec<String> = secrets
            .into_iter()
            .map(Into::into)
            .filter(|s| !s.is_empty())
            .collect();
        secrets.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        secrets.dedup();
        Self { secrets }
    }

    /// Creates a redactor covering every credential in a connection config.
    pub fn from_connection(config: &ConnectionConfig) -> Self {
        Self::new(config.secrets())
    }

    /// Number of secrets this redactor knows about.
    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    /// Returns true if no secrets are configured.
    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }

    /// Returns the message with secrets and credential patterns removed,
    /// shortened to [`MAX_MESSAGE_CHARS`].
    pub fn redact(&self, message: &str) -> String {
        let mut out = message.to_string();
        for secret in &self.secrets {
            out = replace_ignore_ascii_case(&out, secret, REDACTED);
        }

        let out = CONNECTION_URL_RE.replace_all(&out, "postgresql://***");
        let out = PASSWORD_ASSIGNMENT_RE.replace_all(&out, "password=***");

        truncate_chars(&out, MAX_MESSAGE_CHARS)
    }
}

/// Replaces every ASCII-case-insensitive occurrence of `needle`.
fn replace_ignore_ascii_case(haystack: &str, needle: &str, replacement: &str) -> String {
    if needle.is_empty() {
        return haystack.to_string();
    }

    let lower_haystack = haystack.to_ascii_lowercase();
    let lower_needle = needle.to_ascii_lowercase();
    let mut out = String::with_capacity(haystack.len());
    let mut last = 0;

    // ASCII lowercasing keeps byte offsets identical, so indices found in
    // the lowered copy are valid in the original.
    for (start, _) in lower_haystack.match_indices(&lower_needle) {
        if start < last {
            continue;
        }
        out.push_str(&haystack[last..start]);
        out.push_str(replacement);
        last = start + needle.len();
    }
    out.push_str(&haystack[last..]);
    out
}

fn truncate_chars(message: &str, max: usize) -> String {
    match message.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &message[..cut]),
        None => message.to_string(),
    }
}
