//! PII pattern registry
//!
//! An ordered list of named matchers, each mapped to a token label. Order
//! is the substitution precedence of a masking pass: earlier patterns are
//! replaced first and later patterns never match inside their tokens.
//!
//! Matchers are `regex::Regex` values, which carry no match cursor between
//! calls; every scan starts from the beginning of the text it is given.
//!
//! Built-in rules use ASCII word boundaries and `[0-9]`. Thai script is
//! written without spaces, and a Unicode `\b` finds no boundary between a
//! Thai letter and an adjacent digit.

use crate::config::{CustomPattern, PatternsConfig};
use crate::error::{Error, Result};
use crate::privacy::token::{is_valid_label, TokenSyntax};
use regex::Regex;

/// Token label for 13-digit national identifiers
pub const LABEL_THAI_ID: &str = "THAI_ID";
/// Token label for local mobile numbers
pub const LABEL_MOBILE: &str = "MOBILE";
/// Token label for personal names
pub const LABEL_NAME: &str = "NAME";
/// Token label for email addresses
pub const LABEL_EMAIL: &str = "EMAIL";
/// Token label for payment card numbers
pub const LABEL_CARD: &str = "CARD";
/// Token label for Bitcoin and Ethereum wallet addresses
pub const LABEL_CRYPTO_WALLET: &str = "CRYPTO_WALLET";

/// Extra acceptance check applied to a regex match
pub type Validator = fn(&str) -> bool;

/// A named matcher and the token label it produces
#[derive(Debug, Clone)]
pub struct PatternSpec {
    label: String,
    regex: Regex,
    token_kind: String,
    validator: Option<Validator>,
}

impl PatternSpec {
    /// Compile a pattern spec
    pub fn new(label: &str, pattern: &str, token_kind: &str) -> Result<Self> {
        if !is_valid_label(token_kind) {
            return Err(Error::Pattern(format!(
                "Invalid token kind '{}' for rule '{}'",
                token_kind, label
            )));
        }
        let regex = Regex::new(pattern).map_err(|e| {
            Error::Pattern(format!("Invalid regex pattern for rule '{}': {}", label, e))
        })?;

        Ok(Self {
            label: label.to_string(),
            regex,
            token_kind: token_kind.to_string(),
            validator: None,
        })
    }

    /// Require matches to also pass `validator`
    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Rule name
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Token label emitted for matches
    pub fn token_kind(&self) -> &str {
        &self.token_kind
    }

    /// Regex source
    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    /// Whether a matched substring is accepted
    pub fn accepts(&self, matched: &str) -> bool {
        self.validator.map_or(true, |v| v(matched))
    }

    /// All accepted, non-overlapping matches as `(start, end)` byte ranges
    pub fn find_spans(&self, text: &str) -> Vec<(usize, usize)> {
        self.regex
            .find_iter(text)
            .filter(|m| self.accepts(m.as_str()))
            .map(|m| (m.start(), m.end()))
            .collect()
    }
}

/// Ordered set of PII patterns
#[derive(Debug, Clone)]
pub struct PatternRegistry {
    patterns: Vec<PatternSpec>,
}

impl PatternRegistry {
    /// Build from an explicit ordered list
    pub fn new(patterns: Vec<PatternSpec>) -> Self {
        Self { patterns }
    }

    /// Build the registry selected by configuration.
    ///
    /// Order: national ID, mobile, email, payment card, crypto wallets,
    /// titled names, name pairs, then custom patterns.
    pub fn from_config(config: &PatternsConfig) -> Result<Self> {
        let mut patterns = Vec::new();

        if config.thai_id {
            patterns.push(PatternSpec::new(
                "thai_id",
                r"(?-u:\b)[0-9]{13}(?-u:\b)",
                LABEL_THAI_ID,
            )?);
        }
        if config.mobile {
            patterns.push(PatternSpec::new(
                "mobile",
                r"(?-u:\b)0[689][0-9][-\s]?[0-9]{3}[-\s]?[0-9]{4}(?-u:\b)",
                LABEL_MOBILE,
            )?);
        }
        if config.email {
            patterns.push(PatternSpec::new(
                "email",
                r"(?-u:\b)[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}(?-u:\b)",
                LABEL_EMAIL,
            )?);
        }
        if config.payment_card {
            patterns.push(
                PatternSpec::new(
                    "payment_card",
                    r"(?-u:\b)(?:[0-9][ -]*?){13,16}(?-u:\b)",
                    LABEL_CARD,
                )?
                .with_validator(luhn_check),
            );
        }
        if config.crypto_wallet {
            patterns.push(PatternSpec::new(
                "eth_wallet",
                r"(?-u:\b)0x[a-fA-F0-9]{40}(?-u:\b)",
                LABEL_CRYPTO_WALLET,
            )?);
            patterns.push(PatternSpec::new(
                "btc_wallet",
                r"(?-u:\b)[13][a-km-zA-HJ-NP-Z1-9]{25,34}(?-u:\b)",
                LABEL_CRYPTO_WALLET,
            )?);
        }
        if config.names {
            patterns.push(PatternSpec::new(
                "name_with_title",
                r"(?-u:\b)(?:Mr|Ms|Mrs)\.\s+[A-Z][a-z]+(?:\s+[A-Z][a-z]+)?(?-u:\b)",
                LABEL_NAME,
            )?);
            patterns.push(PatternSpec::new(
                "name_pair",
                r"(?-u:\b)[A-Z][a-z]+\s+[A-Z][a-z]+(?-u:\b)",
                LABEL_NAME,
            )?);
        }

        for custom in &config.custom {
            patterns.push(compile_custom(custom)?);
        }

        Ok(Self { patterns })
    }

    /// Patterns in precedence order
    pub fn patterns(&self) -> &[PatternSpec] {
        &self.patterns
    }

    /// Distinct token labels, in first-seen order
    pub fn token_kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = Vec::new();
        for spec in &self.patterns {
            if !kinds.iter().any(|k| k == spec.token_kind()) {
                kinds.push(spec.token_kind().to_string());
            }
        }
        kinds
    }

    /// Token matcher for every label this registry can emit
    pub fn token_syntax(&self) -> Result<TokenSyntax> {
        TokenSyntax::new(self.token_kinds())
    }

    /// Number of patterns
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Whether the registry has no patterns
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

fn compile_custom(custom: &CustomPattern) -> Result<PatternSpec> {
    PatternSpec::new(&custom.label, &custom.regex, &custom.token_kind)
}

/// Luhn algorithm for payment card validation
pub fn luhn_check(number: &str) -> bool {
    let digits: Vec<u32> = number.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() < 13 || digits.len() > 19 {
        return false;
    }
    let mut sum = 0u32;
    let mut double = false;
    for &digit in digits.iter().rev() {
        let mut d = digit;
        if double {
            d *= 2;
            if d > 9 {
                d -= 9;
            }
        }
        sum += d;
        double = !double;
    }
    sum % 10 == 0
}
