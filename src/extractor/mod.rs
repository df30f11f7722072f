/// Frame extractors
///
/// An extractor turns one frame's OCR tokens into matched pairs plus the
/// chip counts it could not place. Validation and the consistency check
/// run on that output without knowing which extractor produced it.
///
/// ```text
/// FrameExtractor
///   ├── HeuristicExtractor (classifier + normalizer + spatial matcher)
///   └── LlmExtractor (hosted chat-completions model)
/// ```

pub mod heuristic;
pub mod llm;

pub use heuristic::HeuristicExtractor;
pub use llm::{LlmExtractor, ReplyRules};

use crate::config::{Config, ExtractorKind};
use crate::error::ExtractorError;
use crate::models::OcrToken;
use crate::reconcile::{Extraction, RuleTables};
use std::sync::Arc;

/// Extractor trait
///
/// Implementations must be shareable across the worker pool.
pub trait FrameExtractor: Send + Sync {
    /// Extract pairs from one frame's tokens
    fn extract(&self, tokens: &[OcrToken]) -> Result<Extraction, ExtractorError>;

    /// Extractor name (for logging)
    fn name(&self) -> &'static str;
}

/// Build the extractor selected by `kind`
pub fn build_extractor(
    kind: ExtractorKind,
    config: &Config,
    rules: Arc<RuleTables>,
) -> Result<Box<dyn FrameExtractor>, ExtractorError> {
    let extractor: Box<dyn FrameExtractor> = match kind {
        ExtractorKind::Heuristic => Box::new(HeuristicExtractor::new(rules, &config.reconcile)),
        ExtractorKind::Llm => Box::new(LlmExtractor::new(&config.llm, &config.reconcile)?),
    };
    tracing::info!("Using {} extractor", extractor.name());
    Ok(extractor)
}
