//! Unmasking engine
//!
//! Substitutes known tokens back with their original values. Tokens the
//! mapping does not know are left verbatim.

use crate::error::Result;
use crate::privacy::patterns::PatternRegistry;
use crate::privacy::token::{TokenMapping, TokenSpan, TokenSyntax};

/// Result of a decode pass with resolution details
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodeOutcome {
    /// Decoded text
    pub text: String,
    /// Tokens that were replaced
    pub resolved: Vec<String>,
    /// Tokens left in place because the mapping lacked them
    pub unresolved: Vec<String>,
}

/// Token → value substitution
#[derive(Debug, Clone)]
pub struct UnmaskingEngine {
    syntax: TokenSyntax,
}

impl UnmaskingEngine {
    /// Engine recognizing every label the registry can emit
    pub fn new(registry: &PatternRegistry) -> Result<Self> {
        Ok(Self {
            syntax: registry.token_syntax()?,
        })
    }

    /// Engine over an explicit token syntax
    pub fn with_syntax(syntax: TokenSyntax) -> Self {
        Self { syntax }
    }

    /// Token occurrences in `text`, left to right
    pub fn find_tokens(&self, text: &str) -> Vec<TokenSpan> {
        self.syntax.find(text)
    }

    /// Whether `text` holds a token the mapping can resolve
    pub fn has_known_tokens(&self, text: &str, mapping: &TokenMapping) -> bool {
        self.syntax
            .find(text)
            .iter()
            .any(|span| mapping.contains_key(&span.token))
    }

    /// Replace every known token with its value
    pub fn decode(&self, text: &str, mapping: &TokenMapping) -> String {
        self.decode_report(text, mapping).text
    }

    /// Decode and report which tokens resolved.
    ///
    /// Substitution is a single left-to-right pass over the input, so a
    /// value that itself looks like a token is never expanded again.
    pub fn decode_report(&self, text: &str, mapping: &TokenMapping) -> DecodeOutcome {
        let mut outcome = DecodeOutcome::default();
        let mut out = String::with_capacity(text.len());
        let mut last = 0;

        for span in self.syntax.find(text) {
            out.push_str(&text[last..span.start]);
            match mapping.get(&span.token) {
                Some(value) => {
                    out.push_str(value);
                    outcome.resolved.push(span.token);
                }
                None => {
                    out.push_str(&span.token);
                    outcome.unresolved.push(span.token);
                }
            }
            last = span.end;
        }

        out.push_str(&text[last..]);
        outcome.text = out;
        outcome
    }
}
