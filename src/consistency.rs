//! Cross-frame consistency check.
//!
//! Total chips in play are constant across a tournament broadcast, so the
//! most frequent per-frame total is taken as the expected total and every
//! frame is judged against it. Runs only once every frame of a batch exists.

use crate::models::FrameResult;
use std::collections::HashMap;

/// Outcome of one consistency pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConsistencyReport {
    pub expected_total: Option<u64>,
    pub valid: usize,
    pub invalid: usize,
}

/// Most frequent `total_chips` among frames with players; ties go to the
/// value seen first.
pub fn expected_total(frames: &[FrameResult]) -> Option<u64> {
    let mut counts: HashMap<u64, (usize, usize)> = HashMap::new();
    for (idx, frame) in frames.iter().filter(|f| f.has_players()).enumerate() {
        counts.entry(frame.total_chips).or_insert((0, idx)).0 += 1;
    }

    counts
        .into_iter()
        .max_by(|(_, (count_a, first_a)), (_, (count_b, first_b))| {
            count_a.cmp(count_b).then(first_b.cmp(first_a))
        })
        .map(|(total, _)| total)
}

/// Fill `expected_total` and `is_valid` on every frame.
///
/// A frame is valid when its total is strictly closer than `tolerance` to the
/// expected total. Frames without players are judged too (their total is 0).
/// With no non-empty frame both fields stay `None` everywhere.
pub fn apply_consistency(frames: &mut [FrameResult], tolerance: u64) -> ConsistencyReport {
    let Some(expected) = expected_total(frames) else {
        for frame in frames.iter_mut() {
            frame.expected_total = None;
            frame.is_valid = None;
        }
        tracing::warn!("No frame produced players, skipping consistency check");
        return ConsistencyReport::default();
    };

    let mut report = ConsistencyReport {
        expected_total: Some(expected),
        ..Default::default()
    };

    for frame in frames.iter_mut() {
        let is_valid = frame.total_chips.abs_diff(expected) < tolerance;
        frame.expected_total = Some(expected);
        frame.is_valid = Some(is_valid);
        if is_valid {
            report.valid += 1;
        } else {
            report.invalid += 1;
        }
    }

    tracing::info!(
        "Expected total {}: {} valid, {} invalid frame(s)",
        expected,
        report.valid,
        report.invalid
    );
    report
}
