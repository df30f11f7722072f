//! Record types shared by every pipeline stage.
//!
//! Input records (`FrameInput`, `OcrToken`) mirror the JSONL written by the
//! OCR collaborator; output records (`FrameResult`, `MatchedPair`) mirror the
//! reconciled JSONL this crate writes.

use serde::{Deserialize, Serialize};

/// One piece of recognized text with its screen position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrToken {
    pub text: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
}

impl OcrToken {
    pub fn new(text: impl Into<String>, x: f64, y: f64, confidence: f64) -> Self {
        Self {
            text: text.into(),
            confidence,
            x,
            y,
        }
    }
}

/// One input line: the OCR output for a single screenshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameInput {
    #[serde(default)]
    pub filepath: String,
    #[serde(default)]
    pub raw_text: Option<Vec<OcrToken>>,
    #[serde(default = "default_success")]
    pub success: bool,
    /// Failure cause reported by the OCR collaborator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn default_success() -> bool {
    true
}

impl FrameInput {
    /// Tokens usable for reconciliation, or `None` when the frame must be empty
    pub fn usable_tokens(&self) -> Option<&[OcrToken]> {
        if !self.success {
            return None;
        }
        match self.raw_text.as_deref() {
            Some(tokens) if !tokens.is_empty() => Some(tokens),
            _ => None,
        }
    }
}

/// Token accepted as a player name
#[derive(Debug, Clone, PartialEq)]
pub struct NameCandidate {
    pub text: String,
    pub x: f64,
    pub y: f64,
    pub confidence: f64,
}

/// Token accepted as a chip count, with its parsed value (always > 0)
#[derive(Debug, Clone, PartialEq)]
pub struct ChipCandidate {
    pub value: u64,
    pub x: f64,
    pub y: f64,
    pub confidence: f64,
}

/// A reconciled player entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedPair {
    pub name: String,
    pub chips: u64,
    pub confidence: f64,
}

/// Per-frame output record.
///
/// `expected_total` and `is_valid` stay `None` until the consistency check
/// has run over the whole batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameResult {
    pub filepath: String,
    pub players: Vec<MatchedPair>,
    pub total_chips: u64,
    pub expected_total: Option<u64>,
    pub is_valid: Option<bool>,
}

impl FrameResult {
    /// Build a result whose total is the sum of the given players
    pub fn new(filepath: impl Into<String>, players: Vec<MatchedPair>) -> Self {
        let total_chips = players.iter().map(|p| p.chips).sum();
        Self {
            filepath: filepath.into(),
            players,
            total_chips,
            expected_total: None,
            is_valid: None,
        }
    }

    /// A frame with no accepted players
    pub fn empty(filepath: impl Into<String>) -> Self {
        Self::new(filepath, Vec::new())
    }

    pub fn has_players(&self) -> bool {
        !self.players.is_empty()
    }
}
