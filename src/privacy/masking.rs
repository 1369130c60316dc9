//! Masking engine
//!
//! Replaces every PII match with a placeholder token and returns the new
//! token → value pairs. The engine never touches persistence; the caller
//! merges the returned mappings into the token store.

use crate::error::Result;
use crate::privacy::patterns::PatternRegistry;
use crate::privacy::token::{Token, TokenMapping, TokenSyntax};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// A PII match in the original (unmasked) text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PiiMatch {
    /// Rule name that matched
    pub rule: String,
    /// Token label the match would be masked with
    pub token_kind: String,
    /// Start byte offset
    pub start: usize,
    /// End byte offset
    pub end: usize,
    /// Matched substring
    pub value: String,
}

/// Result of a masking pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaskOutcome {
    /// Text with every match replaced by its token
    pub masked_text: String,
    /// New token → original value pairs
    pub mappings: TokenMapping,
    /// Tokens in the order they were minted
    pub tokens: Vec<String>,
}

impl MaskOutcome {
    fn unchanged(text: &str) -> Self {
        Self {
            masked_text: text.to_string(),
            mappings: TokenMapping::new(),
            tokens: Vec::new(),
        }
    }

    /// Whether nothing was masked
    pub fn is_unchanged(&self) -> bool {
        self.mappings.is_empty()
    }
}

/// Pattern-driven masking engine
pub struct MaskingEngine {
    registry: Arc<PatternRegistry>,
    syntax: TokenSyntax,
}

impl MaskingEngine {
    /// Create an engine over the given registry
    pub fn new(registry: Arc<PatternRegistry>) -> Result<Self> {
        let syntax = registry.token_syntax()?;
        Ok(Self { registry, syntax })
    }

    /// The registry this engine scans with
    pub fn registry(&self) -> &Arc<PatternRegistry> {
        &self.registry
    }

    /// Whether any pattern accepts a match outside existing tokens
    pub fn contains_pii(&self, text: &str) -> bool {
        !self.find_matches(text).is_empty()
    }

    /// All PII matches in `text`, sorted by position.
    ///
    /// Every pattern scans the same immutable text. Where matches overlap,
    /// the one from the earlier pattern wins, mirroring masking precedence.
    /// Regions already holding a token are never reported.
    pub fn find_matches(&self, text: &str) -> Vec<PiiMatch> {
        let mut taken: Vec<(usize, usize)> = self
            .syntax
            .find(text)
            .into_iter()
            .map(|s| (s.start, s.end))
            .collect();
        let mut matches = Vec::new();

        for spec in self.registry.patterns() {
            for (start, end) in spec.find_spans(text) {
                if overlaps_any(&taken, start, end) {
                    continue;
                }
                taken.push((start, end));
                matches.push(PiiMatch {
                    rule: spec.label().to_string(),
                    token_kind: spec.token_kind().to_string(),
                    start,
                    end,
                    value: text[start..end].to_string(),
                });
            }
        }

        matches.sort_by_key(|m| m.start);
        matches
    }

    /// Mask `text` with counters starting at 1 for every label
    pub fn mask(&self, text: &str) -> MaskOutcome {
        self.mask_against(text, &TokenMapping::new())
    }

    /// Mask `text` without colliding with tokens already in `existing`.
    ///
    /// A counter value is skipped when its token is already bound to a
    /// different value in `existing` or appears literally in the input.
    pub fn mask_against(&self, text: &str, existing: &TokenMapping) -> MaskOutcome {
        if !self.contains_pii(text) {
            return MaskOutcome::unchanged(text);
        }

        let literal: HashSet<String> = self.syntax.find(text).into_iter().map(|s| s.token).collect();
        let mut counters: HashMap<String, u32> = HashMap::new();
        let mut mappings = TokenMapping::new();
        let mut tokens = Vec::new();
        let mut current = text.to_string();

        for spec in self.registry.patterns() {
            let protected: Vec<(usize, usize)> = self
                .syntax
                .find(&current)
                .into_iter()
                .map(|s| (s.start, s.end))
                .collect();

            let mut next = String::with_capacity(current.len());
            let mut last = 0;

            for (start, end) in spec.find_spans(&current) {
                if overlaps_any(&protected, start, end) {
                    continue;
                }
                let value = &current[start..end];
                let token = next_token(
                    spec.token_kind(),
                    value,
                    &mut counters,
                    existing,
                    &mappings,
                    &literal,
                );

                debug!(rule = spec.label(), token = %token, "Masked PII match");

                next.push_str(&current[last..start]);
                next.push_str(&token);
                last = end;

                mappings.insert(token.clone(), value.to_string());
                tokens.push(token);
            }

            next.push_str(&current[last..]);
            current = next;
        }

        MaskOutcome {
            masked_text: current,
            mappings,
            tokens,
        }
    }
}

fn overlaps_any(spans: &[(usize, usize)], start: usize, end: usize) -> bool {
    spans.iter().any(|&(s, e)| start < e && s < end)
}

fn next_token(
    kind: &str,
    value: &str,
    counters: &mut HashMap<String, u32>,
    existing: &TokenMapping,
    minted: &TokenMapping,
    literal: &HashSet<String>,
) -> String {
    let counter = counters.entry(kind.to_string()).or_insert(0);
    loop {
        *counter += 1;
        let token = Token::nth(kind, *counter).to_string();
        if minted.contains_key(&token) || literal.contains(&token) {
            continue;
        }
        match existing.get(&token) {
            Some(bound) if bound != value => continue,
            _ => return token,
        }
    }
}
