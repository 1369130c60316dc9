//! Placeholder token syntax
//!
//! Tokens are `<LABEL>` for the first occurrence of a label in a masking
//! pass and `<LABEL_n>` (n >= 2) for the following ones. The syntax is the
//! wire format shared with the host page and the persisted token map, so
//! it must stay bit-exact.

use crate::error::{Error, Result};
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;

/// Persisted token → original value map
pub type TokenMapping = BTreeMap<String, String>;

/// A single placeholder token
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Token {
    label: String,
    suffix: Option<u32>,
}

impl Token {
    /// Token for the `n`-th (1-based) occurrence of `label` in a pass
    pub fn nth(label: impl Into<String>, n: u32) -> Self {
        Self {
            label: label.into(),
            suffix: if n <= 1 { None } else { Some(n) },
        }
    }

    /// Parse `<LABEL>` / `<LABEL_n>`
    pub fn parse(s: &str) -> Option<Self> {
        let inner = s.strip_prefix('<')?.strip_suffix('>')?;
        if inner.is_empty() {
            return None;
        }

        if let Some((label, digits)) = inner.rsplit_once('_') {
            if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
                if !is_valid_label(label) {
                    return None;
                }
                let n = digits.parse().ok()?;
                return Some(Self {
                    label: label.to_string(),
                    suffix: Some(n),
                });
            }
        }

        if !is_valid_label(inner) {
            return None;
        }
        Some(Self {
            label: inner.to_string(),
            suffix: None,
        })
    }

    /// Token label (e.g. `THAI_ID`)
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Occurrence index within its masking pass (1 when unsuffixed)
    pub fn index(&self) -> u32 {
        self.suffix.unwrap_or(1)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.suffix {
            Some(n) => write!(f, "<{}_{}>", self.label, n),
            None => write!(f, "<{}>", self.label),
        }
    }
}

/// Whether `label` can be used as a token kind.
///
/// Labels are ASCII identifiers and must not end in `_<digits>`, which
/// would be ambiguous with the disambiguation suffix.
pub fn is_valid_label(label: &str) -> bool {
    let mut chars = label.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return false;
    }
    match label.rsplit_once('_') {
        Some((_, tail)) => tail.is_empty() || !tail.bytes().all(|b| b.is_ascii_digit()),
        None => true,
    }
}

/// A token occurrence found in text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSpan {
    /// Start byte offset
    pub start: usize,
    /// End byte offset
    pub end: usize,
    /// The token text, e.g. `<MOBILE_2>`
    pub token: String,
}

/// Matcher for tokens of a fixed set of labels
#[derive(Debug, Clone)]
pub struct TokenSyntax {
    regex: Option<Regex>,
    labels: Vec<String>,
}

impl TokenSyntax {
    /// Build a matcher recognizing tokens for the given labels
    pub fn new<I, S>(labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut unique: Vec<String> = Vec::new();
        for label in labels {
            let label = label.as_ref();
            if !is_valid_label(label) {
                return Err(Error::Pattern(format!("Invalid token label '{}'", label)));
            }
            if !unique.iter().any(|l| l == label) {
                unique.push(label.to_string());
            }
        }

        // Longest first so `THAI_ID` is tried before a hypothetical `THAI`
        let mut alternatives = unique.clone();
        alternatives.sort_by(|a, b| b.len().cmp(&a.len()));
        let regex = if alternatives.is_empty() {
            None
        } else {
            let body = alternatives
                .iter()
                .map(|l| regex::escape(l))
                .collect::<Vec<_>>()
                .join("|");
            let regex = Regex::new(&format!(r"<(?:{})(?:_[0-9]+)?>", body))
                .map_err(|e| Error::Pattern(format!("Invalid token syntax: {}", e)))?;
            Some(regex)
        };

        Ok(Self {
            regex,
            labels: unique,
        })
    }

    /// Labels this matcher recognizes
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// All token occurrences, left to right
    pub fn find(&self, text: &str) -> Vec<TokenSpan> {
        let Some(regex) = &self.regex else {
            return Vec::new();
        };
        regex
            .find_iter(text)
            .map(|m| TokenSpan {
                start: m.start(),
                end: m.end(),
                token: m.as_str().to_string(),
            })
            .collect()
    }

    /// Whether any token occurs in the text
    pub fn is_match(&self, text: &str) -> bool {
        self.regex.as_ref().is_some_and(|r| r.is_match(text))
    }
}
