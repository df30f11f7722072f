use super::FrameExtractor;
use crate::config::ReconcileConfig;
use crate::error::ExtractorError;
use crate::models::OcrToken;
use crate::reconcile::{Extraction, Reconciler, RuleTables};
use std::sync::Arc;

/// Rule-based extractor built on the reconciliation engine
pub struct HeuristicExtractor {
    reconciler: Reconciler,
}

impl HeuristicExtractor {
    pub fn new(rules: Arc<RuleTables>, config: &ReconcileConfig) -> Self {
        Self {
            reconciler: Reconciler::new(rules, config),
        }
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }
}

impl FrameExtractor for HeuristicExtractor {
    fn extract(&self, tokens: &[OcrToken]) -> Result<Extraction, ExtractorError> {
        Ok(self.reconciler.extract(tokens))
    }

    fn name(&self) -> &'static str {
        "heuristic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_player_frame() {
        let extractor = HeuristicExtractor::new(
            Arc::new(RuleTables::embedded().unwrap()),
            &ReconcileConfig::default(),
        );
        let tokens = vec![
            OcrToken::new("BLINDS", 600.0, 5.0, 0.99),
            OcrToken::new("HELLMUTH", 400.0, 10.0, 0.95),
            OcrToken::new("2.3M", 405.0, 60.0, 0.9),
            OcrToken::new("NEGREANU", 50.0, 10.0, 0.9),
            OcrToken::new("1,200,000", 55.0, 90.0, 0.85),
        ];
        let extraction = extractor.extract(&tokens).unwrap();

        assert!(extraction.unmatched.is_empty());
        let names: Vec<&str> = extraction.pairs.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["NEGREANU", "HELLMUTH"], "Pairs follow left-to-right order");
        assert_eq!(extraction.pairs[1].chips, 2_300_000);
    }

    #[test]
    fn test_punctuated_ui_label_does_not_take_chips() {
        let extractor = HeuristicExtractor::new(
            Arc::new(RuleTables::embedded().unwrap()),
            &ReconcileConfig::default(),
        );
        let tokens = vec![
            OcrToken::new("POT:", 40.0, 10.0, 0.95),
            OcrToken::new("NEGREANU", 60.0, 10.0, 0.9),
            OcrToken::new("1,200,000", 55.0, 60.0, 0.9),
        ];
        let extraction = extractor.extract(&tokens).unwrap();

        assert_eq!(extraction.pairs.len(), 1);
        assert_eq!(extraction.pairs[0].name, "NEGREANU");
        assert_eq!(extraction.pairs[0].chips, 1_200_000);
        assert!(extraction.unmatched.is_empty());
    }
}
