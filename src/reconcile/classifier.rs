//! Token classification
//!
//! Labels each raw OCR token as a name candidate, a chip-value candidate
//! or noise. Pure function of the token, the thresholds and the injected
//! rule tables.

use super::rules::RuleTables;
use crate::config::{NameStrictness, ReconcileConfig};
use crate::models::OcrToken;
use regex::Regex;
use std::sync::Arc;

/// Digits with optional thousands separators
const PLAIN_CHIP_PATTERN: &str = r"^\d[\d,]*$";

/// Decimal number followed by a single K/M/B magnitude letter
const SUFFIX_CHIP_PATTERN: &str = r"(?i)^\d+(?:\.\d+)?\s*[KMB]$";

/// Shape required by the strict name profile
const STRICT_NAME_PATTERN: &str = r"^[A-Za-z][A-Za-z\s\-'.]+$";

/// Classification label of one token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenClass {
    Name,
    Chip,
    Reject(RejectReason),
}

/// Why a token was treated as noise
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    LowConfidence,
    Empty,
    Blacklisted,
    Garbage,
    Unrecognized,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::LowConfidence => "low confidence",
            RejectReason::Empty => "empty",
            RejectReason::Blacklisted => "blacklisted",
            RejectReason::Garbage => "garbage",
            RejectReason::Unrecognized => "unrecognized",
        }
    }
}

/// Token classifier with compiled patterns and shared rule tables
#[derive(Debug, Clone)]
pub struct TokenClassifier {
    rules: Arc<RuleTables>,
    min_confidence: f64,
    letter_ratio: f64,
    min_name_len: usize,
    strictness: NameStrictness,
    plain_chip: Regex,
    suffix_chip: Regex,
    strict_name: Regex,
}

impl TokenClassifier {
    pub fn new(rules: Arc<RuleTables>, config: &ReconcileConfig) -> Self {
        Self {
            rules,
            min_confidence: config.min_confidence,
            letter_ratio: config.letter_ratio(),
            min_name_len: config.min_name_len.max(1),
            strictness: config.name_strictness,
            plain_chip: Regex::new(PLAIN_CHIP_PATTERN).expect("valid chip pattern"),
            suffix_chip: Regex::new(SUFFIX_CHIP_PATTERN).expect("valid suffix pattern"),
            strict_name: Regex::new(STRICT_NAME_PATTERN).expect("valid name pattern"),
        }
    }

    pub fn classify(&self, token: &OcrToken) -> TokenClass {
        if token.confidence < self.min_confidence {
            return TokenClass::Reject(RejectReason::LowConfidence);
        }

        let text = token.text.trim();
        if text.is_empty() {
            return TokenClass::Reject(RejectReason::Empty);
        }

        if self.rules.is_blacklisted(text) {
            return TokenClass::Reject(RejectReason::Blacklisted);
        }

        if self.is_chip_text(text) {
            return TokenClass::Chip;
        }

        self.classify_name(text)
    }

    /// Either chip notation
    pub fn is_chip_text(&self, text: &str) -> bool {
        self.plain_chip.is_match(text) || self.suffix_chip.is_match(text)
    }

    fn classify_name(&self, text: &str) -> TokenClass {
        let stripped = crate::names::trim_punctuation(text);
        // "POT:" or "(ANTE)" are still broadcast UI once the punctuation is gone
        if self.rules.is_blacklisted(stripped) {
            return TokenClass::Reject(RejectReason::Blacklisted);
        }
        let char_count = stripped.chars().count();

        if char_count < self.min_name_len {
            return TokenClass::Reject(RejectReason::Unrecognized);
        }
        if stripped.chars().all(|c| c.is_ascii_digit() || c.is_whitespace()) {
            return TokenClass::Reject(RejectReason::Unrecognized);
        }

        let letters = stripped.chars().filter(|c| c.is_alphabetic()).count();
        if (letters as f64) / (char_count as f64) < self.letter_ratio {
            return TokenClass::Reject(RejectReason::Unrecognized);
        }

        if self.strictness == NameStrictness::Strict && !self.strict_name.is_match(stripped) {
            return TokenClass::Reject(RejectReason::Unrecognized);
        }

        if has_triple_run(stripped) || self.rules.contains_garbage(stripped) {
            return TokenClass::Reject(RejectReason::Garbage);
        }

        TokenClass::Name
    }
}

/// Three identical consecutive characters, ignoring case
fn has_triple_run(text: &str) -> bool {
    let lower: Vec<char> = text.chars().flat_map(|c| c.to_lowercase()).collect();
    lower
        .windows(3)
        .any(|w| w[0] == w[1] && w[1] == w[2] && !w[0].is_whitespace())
}
