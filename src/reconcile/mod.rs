/// Reconciliation engine
///
/// Turns one frame's raw OCR tokens into validated name/chip pairs.
///
/// ## Architecture
///
/// ```text
/// Reconciler
///   ├── TokenClassifier (name / chip / noise)
///   ├── normalize_in_range (chip text -> integer)
///   └── SpatialMatcher (greedy nearest neighbour)
/// validate_frame (strict / lenient acceptance)
/// ```
///
/// ## Usage
///
/// ```rust,ignore
/// use reconcile::{Reconciler, RuleTables, validate_frame};
///
/// let reconciler = Reconciler::new(Arc::new(RuleTables::embedded()?), &config.reconcile);
/// let extraction = reconciler.extract(&tokens);
/// let frame = validate_frame("frame.png", extraction, config.reconcile.validation_policy);
/// ```

pub mod classifier;
pub mod matcher;
pub mod normalizer;
pub mod rules;
pub mod validator;

pub use classifier::{RejectReason, TokenClass, TokenClassifier};
pub use matcher::{Extraction, SpatialMatcher};
pub use normalizer::{normalize_chip_value, normalize_in_range};
pub use rules::RuleTables;
pub use validator::validate_frame;

use crate::config::ReconcileConfig;
use crate::error::ParseError;
use crate::models::{ChipCandidate, NameCandidate, OcrToken};
use crate::names::clean_name;
use std::sync::Arc;

/// What happened to one token on its way through the classifier and normalizer
#[derive(Debug, Clone, PartialEq)]
pub enum TokenOutcome {
    Name(String),
    Chip(u64),
    Rejected(RejectReason),
    /// Chip-shaped text the normalizer refused
    Unparsable(ParseError),
}

/// Classifier, normalizer and matcher wired to one configuration
#[derive(Debug, Clone)]
pub struct Reconciler {
    classifier: TokenClassifier,
    matcher: SpatialMatcher,
    fold_diacritics: bool,
    min_chips: Option<u64>,
    max_chips: Option<u64>,
}

impl Reconciler {
    pub fn new(rules: Arc<RuleTables>, config: &ReconcileConfig) -> Self {
        Self {
            classifier: TokenClassifier::new(rules, config),
            matcher: SpatialMatcher::new(config),
            fold_diacritics: config.fold_diacritics,
            min_chips: config.min_chips,
            max_chips: config.max_chips,
        }
    }

    /// Classify and normalize a single token
    pub fn inspect_token(&self, token: &OcrToken) -> TokenOutcome {
        match self.classifier.classify(token) {
            TokenClass::Name => TokenOutcome::Name(clean_name(&token.text, self.fold_diacritics)),
            TokenClass::Chip => match normalize_in_range(&token.text, self.min_chips, self.max_chips)
            {
                Ok(value) => TokenOutcome::Chip(value),
                Err(e) => TokenOutcome::Unparsable(e),
            },
            TokenClass::Reject(reason) => TokenOutcome::Rejected(reason),
        }
    }

    /// Split a frame's tokens into name and chip candidates, dropping noise
    pub fn candidates(&self, tokens: &[OcrToken]) -> (Vec<NameCandidate>, Vec<ChipCandidate>) {
        let mut names = Vec::new();
        let mut chips = Vec::new();

        for token in tokens {
            match self.inspect_token(token) {
                TokenOutcome::Name(text) if !text.is_empty() => names.push(NameCandidate {
                    text,
                    x: token.x,
                    y: token.y,
                    confidence: token.confidence,
                }),
                TokenOutcome::Chip(value) => chips.push(ChipCandidate {
                    value,
                    x: token.x,
                    y: token.y,
                    confidence: token.confidence,
                }),
                TokenOutcome::Unparsable(e) => {
                    tracing::debug!("Dropping chip text '{}': {}", token.text, e);
                }
                _ => {}
            }
        }

        (names, chips)
    }

    /// Candidates followed by spatial matching
    pub fn extract(&self, tokens: &[OcrToken]) -> Extraction {
        let (names, chips) = self.candidates(tokens);
        tracing::debug!(
            "{} token(s): {} name candidate(s), {} chip candidate(s)",
            tokens.len(),
            names.len(),
            chips.len()
        );
        self.matcher.match_frame(&names, chips)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reconciler(config: &ReconcileConfig) -> Reconciler {
        Reconciler::new(Arc::new(RuleTables::embedded().unwrap()), config)
    }

    #[test]
    fn test_candidates_skip_noise() {
        let r = reconciler(&ReconcileConfig::default());
        let tokens = vec![
            OcrToken::new("NEGREANU", 50.0, 10.0, 0.9),
            OcrToken::new("BLINDS", 300.0, 5.0, 0.99),
            OcrToken::new("0", 55.0, 60.0, 0.9),
            OcrToken::new("1,200,000", 55.0, 90.0, 0.85),
            OcrToken::new("VU", 200.0, 10.0, 0.3),
        ];
        let (names, chips) = r.candidates(&tokens);
        assert_eq!(names.len(), 1);
        assert_eq!(names[0].text, "NEGREANU");
        assert_eq!(chips.len(), 1, "Zero is dropped by the normalizer");
        assert_eq!(chips[0].value, 1_200_000);
    }

    #[test]
    fn test_inspect_token_outcomes() {
        let mut config = ReconcileConfig::default();
        config.max_chips = Some(100_000_000);
        let r = reconciler(&config);

        assert_eq!(
            r.inspect_token(&OcrToken::new("Smith.", 0.0, 0.0, 0.9)),
            TokenOutcome::Name("Smith".to_string())
        );
        assert_eq!(r.inspect_token(&OcrToken::new("2M", 0.0, 0.0, 0.9)), TokenOutcome::Chip(2_000_000));
        assert_eq!(
            r.inspect_token(&OcrToken::new("5B", 0.0, 0.0, 0.9)),
            TokenOutcome::Unparsable(ParseError::OutOfRange { value: 5_000_000_000 })
        );
        assert_eq!(
            r.inspect_token(&OcrToken::new("pot", 0.0, 0.0, 0.9)),
            TokenOutcome::Rejected(RejectReason::Blacklisted)
        );
    }

    #[test]
    fn test_extract_end_to_end() {
        let r = reconciler(&ReconcileConfig::default());
        let tokens = vec![
            OcrToken::new("NEGREANU", 50.0, 10.0, 0.9),
            OcrToken::new("1,200,000", 55.0, 90.0, 0.85),
        ];
        let extraction = r.extract(&tokens);
        assert_eq!(extraction.pairs.len(), 1);
        assert_eq!(extraction.pairs[0].chips, 1_200_000);
        assert!((extraction.pairs[0].confidence - 0.875).abs() < 1e-9);
    }
}
