//! Frame acceptance.

use super::matcher::Extraction;
use crate::config::ValidationPolicy;
use crate::models::FrameResult;

/// Apply `policy` to one frame's extraction and build its result.
///
/// Strict drops every pair when any chip candidate is left unmatched.
/// Lenient keeps the pairs as found.
pub fn validate_frame(
    filepath: impl Into<String>,
    extraction: Extraction,
    policy: ValidationPolicy,
) -> FrameResult {
    let filepath = filepath.into();

    if policy == ValidationPolicy::Strict && !extraction.unmatched.is_empty() {
        tracing::debug!(
            "{}: {} unmatched chip count(s), dropping {} pair(s)",
            filepath,
            extraction.unmatched.len(),
            extraction.pairs.len()
        );
        return FrameResult::empty(filepath);
    }

    FrameResult::new(filepath, extraction.pairs)
}
