//! PII detection and reversible tokenization
//!
//! Provides the data side of PromptGuard:
//! - Ordered regex pattern registry (national ID, mobile, names, ...)
//! - Token syntax shared with the host page and the persisted map
//! - Masking (value → token) and unmasking (token → value)
//! - Cosmetic scramble/reveal frame generation

pub mod masking;
pub mod patterns;
pub mod reveal;
pub mod token;
pub mod unmasking;

pub use masking::{MaskOutcome, MaskingEngine, PiiMatch};
pub use patterns::{luhn_check, PatternRegistry, PatternSpec};
pub use reveal::{filler, reveal_plan, scramble_plan, FramePlan, FILLER_CHARS};
pub use token::{is_valid_label, Token, TokenMapping, TokenSpan, TokenSyntax};
pub use unmasking::{DecodeOutcome, UnmaskingEngine};
