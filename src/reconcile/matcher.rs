//! Spatial matching of name candidates to chip candidates.
//!
//! Greedy, single pass, left to right. Each name claims the closest unused
//! chip inside the distance window; a chip claimed by an earlier name is
//! gone for every later one. This is not an optimal assignment.

use crate::config::{ConfidenceFusion, ReconcileConfig};
use crate::models::{ChipCandidate, MatchedPair, NameCandidate};

/// Matched pairs plus the chip candidates nobody claimed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub pairs: Vec<MatchedPair>,
    pub unmatched: Vec<ChipCandidate>,
}

impl Extraction {
    pub fn new(pairs: Vec<MatchedPair>, unmatched: Vec<ChipCandidate>) -> Self {
        Self { pairs, unmatched }
    }
}

#[derive(Debug, Clone)]
pub struct SpatialMatcher {
    x_threshold: f64,
    y_threshold: f64,
    x_weight: f64,
    y_weight: f64,
    fusion: ConfidenceFusion,
}

impl SpatialMatcher {
    pub fn new(config: &ReconcileConfig) -> Self {
        Self {
            x_threshold: config.x_threshold_px,
            y_threshold: config.y_threshold_px,
            x_weight: config.x_weight,
            y_weight: config.y_weight,
            fusion: config.confidence_fusion,
        }
    }

    /// Weighted distance, or `None` when either axis is outside the window.
    /// Both thresholds are inclusive.
    pub fn score(&self, name: &NameCandidate, chip: &ChipCandidate) -> Option<f64> {
        let dx = (name.x - chip.x).abs();
        let dy = (name.y - chip.y).abs();
        if dx > self.x_threshold || dy > self.y_threshold {
            return None;
        }
        Some(self.x_weight * dx + self.y_weight * dy)
    }

    pub fn match_frame(&self, names: &[NameCandidate], chips: Vec<ChipCandidate>) -> Extraction {
        // Stable sort keeps input order among names sharing an x
        let mut ordered: Vec<&NameCandidate> = names.iter().collect();
        ordered.sort_by(|a, b| a.x.total_cmp(&b.x));

        let mut used = vec![false; chips.len()];
        let mut pairs = Vec::new();

        for name in ordered {
            let mut best: Option<(usize, f64)> = None;
            for (idx, chip) in chips.iter().enumerate() {
                if used[idx] {
                    continue;
                }
                let Some(score) = self.score(name, chip) else {
                    continue;
                };
                // Strictly smaller wins, so ties go to the earlier chip
                if best.map_or(true, |(_, s)| score < s) {
                    best = Some((idx, score));
                }
            }

            match best {
                Some((idx, score)) => {
                    used[idx] = true;
                    let chip = &chips[idx];
                    tracing::debug!(
                        "Paired '{}' with {} (score {:.1})",
                        name.text,
                        chip.value,
                        score
                    );
                    pairs.push(MatchedPair {
                        name: name.text.clone(),
                        chips: chip.value,
                        confidence: self.fusion.fuse(name.confidence, chip.confidence),
                    });
                }
                None => tracing::debug!("No chip count within reach of '{}'", name.text),
            }
        }

        let unmatched = chips
            .into_iter()
            .zip(used)
            .filter_map(|(chip, used)| (!used).then_some(chip))
            .collect();

        Extraction::new(pairs, unmatched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(text: &str, x: f64, y: f64, confidence: f64) -> NameCandidate {
        NameCandidate {
            text: text.to_string(),
            x,
            y,
            confidence,
        }
    }

    fn chip(value: u64, x: f64, y: f64, confidence: f64) -> ChipCandidate {
        ChipCandidate {
            value,
            x,
            y,
            confidence,
        }
    }

    fn matcher() -> SpatialMatcher {
        SpatialMatcher::new(&ReconcileConfig::default())
    }

    #[test]
    fn test_vertical_threshold_is_inclusive() {
        let result = matcher().match_frame(
            &[name("NEGREANU", 50.0, 10.0, 0.9)],
            vec![chip(1_200_000, 55.0, 90.0, 0.85)],
        );
        assert_eq!(result.pairs.len(), 1);
        assert_eq!(result.pairs[0].name, "NEGREANU");
        assert_eq!(result.pairs[0].chips, 1_200_000);
        assert!((result.pairs[0].confidence - 0.875).abs() < 1e-9);
        assert!(result.unmatched.is_empty());
    }

    #[test]
    fn test_out_of_window_chip_stays_unmatched() {
        let result = matcher().match_frame(
            &[name("VU", 0.0, 0.0, 0.9)],
            vec![chip(500_000, 0.0, 81.0, 0.9), chip(700_000, 101.0, 0.0, 0.9)],
        );
        assert!(result.pairs.is_empty(), "Name without chip in reach yields no pair");
        assert_eq!(result.unmatched.len(), 2);
    }

    #[test]
    fn test_vertical_alignment_preferred() {
        // dx=60 scores 60, dy=35 scores 70 with the default weights
        let result = matcher().match_frame(
            &[name("HELLMUTH", 100.0, 100.0, 0.9)],
            vec![chip(1_000, 100.0, 135.0, 0.9), chip(2_000, 160.0, 100.0, 0.9)],
        );
        assert_eq!(result.pairs[0].chips, 2_000);

        // dy=20 scores 40 and beats dx=50
        let result = matcher().match_frame(
            &[name("HELLMUTH", 100.0, 100.0, 0.9)],
            vec![chip(1_000, 100.0, 120.0, 0.9), chip(2_000, 150.0, 100.0, 0.9)],
        );
        assert_eq!(result.pairs[0].chips, 1_000);
    }

    #[test]
    fn test_leftmost_name_claims_first() {
        // Both names are closest to the same chip; the leftmost wins it
        let names = [name("RIGHT", 140.0, 0.0, 0.9), name("LEFT", 100.0, 0.0, 0.9)];
        let chips = vec![chip(3_000, 120.0, 40.0, 0.9), chip(4_000, 190.0, 60.0, 0.9)];
        let result = matcher().match_frame(&names, chips);

        assert_eq!(result.pairs.len(), 2);
        assert_eq!(result.pairs[0].name, "LEFT");
        assert_eq!(result.pairs[0].chips, 3_000);
        assert_eq!(result.pairs[1].name, "RIGHT");
        assert_eq!(result.pairs[1].chips, 4_000);
    }

    #[test]
    fn test_each_chip_consumed_once() {
        let names = [
            name("A1", 0.0, 0.0, 0.9),
            name("B2", 10.0, 0.0, 0.9),
            name("C3", 20.0, 0.0, 0.9),
        ];
        let result = matcher().match_frame(&names, vec![chip(9_000, 10.0, 30.0, 0.9)]);
        assert_eq!(result.pairs.len(), 1, "Only one name can claim the single chip");
        assert_eq!(result.pairs[0].name, "A1");
        assert!(result.unmatched.is_empty());
    }

    #[test]
    fn test_equal_scores_take_first_chip() {
        let result = matcher().match_frame(
            &[name("TIE", 100.0, 100.0, 0.9)],
            vec![chip(1, 90.0, 100.0, 0.9), chip(2, 110.0, 100.0, 0.9)],
        );
        assert_eq!(result.pairs[0].chips, 1);
        assert_eq!(result.unmatched, vec![chip(2, 110.0, 100.0, 0.9)]);
    }

    #[test]
    fn test_fusion_follows_config() {
        let mut config = ReconcileConfig::default();
        config.confidence_fusion = ConfidenceFusion::Min;
        let result = SpatialMatcher::new(&config).match_frame(
            &[name("VU", 0.0, 0.0, 0.9)],
            vec![chip(10, 0.0, 10.0, 0.6)],
        );
        assert_eq!(result.pairs[0].confidence, 0.6);
    }

    #[test]
    fn test_pair_decisions_logged_at_debug() {
        use std::io::Write;
        use std::sync::Arc;

        #[derive(Clone, Default)]
        struct Captured(Arc<parking_lot::Mutex<Vec<u8>>>);

        impl Write for Captured {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.lock().extend_from_slice(buf);
                Ok(buf.len())
            }

            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            matcher().match_frame(
                &[name("VU", 0.0, 0.0, 0.9), name("LONELY", 900.0, 0.0, 0.9)],
                vec![chip(10, 0.0, 10.0, 0.6)],
            );
        });

        let output = String::from_utf8(captured.0.lock().clone()).unwrap();
        assert!(output.contains("Paired 'VU' with 10"), "missing pair log: {}", output);
        assert!(output.contains("No chip count within reach of 'LONELY'"));
    }
}
