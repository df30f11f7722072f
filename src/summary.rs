//! Summary of a reconciled batch.

use crate::error::AppResult;
use crate::models::{FrameResult, MatchedPair};
use crate::pipeline::read_results;
use anyhow::Context;
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Largest single stack seen in the batch
#[derive(Debug, Clone, PartialEq)]
pub struct TopStack {
    pub name: String,
    pub chips: u64,
    pub filepath: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchSummary {
    pub frames: usize,
    pub frames_with_players: usize,
    pub valid: usize,
    pub invalid: usize,
    /// Frames the consistency check never judged
    pub unchecked: usize,
    pub expected_total: Option<u64>,
    /// Filepath and combined chips of the last valid frame
    pub latest_valid: Option<(String, u64)>,
    pub top_stack: Option<TopStack>,
}

impl BatchSummary {
    pub fn from_frames(frames: &[FrameResult]) -> Self {
        let mut summary = BatchSummary {
            frames: frames.len(),
            ..Default::default()
        };

        for frame in frames {
            if frame.has_players() {
                summary.frames_with_players += 1;
            }
            match frame.is_valid {
                Some(true) => {
                    summary.valid += 1;
                    summary.latest_valid = Some((frame.filepath.clone(), frame.total_chips));
                }
                Some(false) => summary.invalid += 1,
                None => summary.unchecked += 1,
            }
            if frame.expected_total.is_some() {
                summary.expected_total = frame.expected_total;
            }
            if let Some(best) = largest_pair(&frame.players) {
                // Earlier frames win ties
                if summary.top_stack.as_ref().map_or(true, |top| best.chips > top.chips) {
                    summary.top_stack = Some(TopStack {
                        name: best.name.clone(),
                        chips: best.chips,
                        filepath: frame.filepath.clone(),
                    });
                }
            }
        }

        summary
    }

    pub fn from_file(path: &Path) -> AppResult<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open results file: {}", path.display()))?;
        let frames = read_results(BufReader::new(file))?;
        Ok(Self::from_frames(&frames))
    }
}

fn largest_pair(players: &[MatchedPair]) -> Option<&MatchedPair> {
    players
        .iter()
        .fold(None, |best: Option<&MatchedPair>, p| match best {
            Some(b) if b.chips >= p.chips => Some(b),
            _ => Some(p),
        })
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Frames:              {}", self.frames)?;
        writeln!(f, "Frames with players: {}", self.frames_with_players)?;
        writeln!(
            f,
            "Valid / invalid:     {} / {} ({} unchecked)",
            self.valid, self.invalid, self.unchecked
        )?;
        match self.expected_total {
            Some(total) => writeln!(f, "Expected total:      {}", total)?,
            None => writeln!(f, "Expected total:      -")?,
        }
        match &self.latest_valid {
            Some((path, total)) => writeln!(f, "Latest valid frame:  {} ({} chips)", path, total)?,
            None => writeln!(f, "Latest valid frame:  -")?,
        }
        match &self.top_stack {
            Some(top) => write!(
                f,
                "Largest stack:       {} with {} ({})",
                top.name, top.chips, top.filepath
            ),
            None => write!(f, "Largest stack:       -"),
        }
    }
}
