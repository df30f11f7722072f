//! Batch pipeline: JSONL in, reconciled JSONL out.
//!
//! Frames are reconciled chunk by chunk and appended to the output as they
//! finish, so an interrupted run can resume from what is already written.
//! Once every frame exists the consistency check runs and the output is
//! rewritten in one atomic step.

use crate::config::{PipelineConfig, ValidationPolicy};
use crate::consistency::apply_consistency;
use crate::error::AppResult;
use crate::extractor::FrameExtractor;
use crate::models::{FrameInput, FrameResult};
use crate::reconcile::validate_frame;
use anyhow::Context;
use indicatif::ProgressBar;
use rayon::prelude::*;
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Parsed input file
#[derive(Debug, Default)]
pub struct InputBatch {
    pub records: Vec<FrameInput>,
    /// Lines that were not a valid frame record
    pub skipped_lines: usize,
}

/// Outcome of one batch run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub frames: usize,
    pub skipped_lines: usize,
    /// Frames taken over from an earlier run's output
    pub resumed: usize,
    pub empty_frames: usize,
    pub extractor_failures: usize,
    pub valid: usize,
    pub invalid: usize,
    pub expected_total: Option<u64>,
}

impl std::fmt::Display for BatchReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Frames:             {}", self.frames)?;
        writeln!(f, "Skipped lines:      {}", self.skipped_lines)?;
        writeln!(f, "Resumed frames:     {}", self.resumed)?;
        writeln!(f, "Empty frames:       {}", self.empty_frames)?;
        writeln!(f, "Extractor failures: {}", self.extractor_failures)?;
        writeln!(f, "Valid / invalid:    {} / {}", self.valid, self.invalid)?;
        match self.expected_total {
            Some(total) => write!(f, "Expected total:     {}", total),
            None => write!(f, "Expected total:     -"),
        }
    }
}

/// One reconciled frame and whether its extractor failed
#[derive(Debug, Clone)]
pub struct FrameOutcome {
    pub result: FrameResult,
    pub extractor_failed: bool,
}

/// Parse JSONL frame records. Malformed lines are counted and skipped,
/// blank lines are ignored.
pub fn read_input<R: BufRead>(reader: R) -> AppResult<InputBatch> {
    let mut batch = InputBatch::default();

    for (idx, line) in reader.lines().enumerate() {
        let line = line.context("Failed to read input line")?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<FrameInput>(&line) {
            Ok(record) => batch.records.push(record),
            Err(e) => {
                tracing::warn!("Skipping malformed line {}: {}", idx + 1, e);
                batch.skipped_lines += 1;
            }
        }
    }

    Ok(batch)
}

/// Parse previously written output records, skipping lines that do not parse
pub fn read_results<R: BufRead>(reader: R) -> AppResult<Vec<FrameResult>> {
    let mut results = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.context("Failed to read output line")?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<FrameResult>(&line) {
            Ok(result) => results.push(result),
            Err(e) => tracing::warn!("Ignoring unreadable output line {}: {}", idx + 1, e),
        }
    }
    Ok(results)
}

/// Reconcile one input record. Never fails: any problem yields an empty frame.
pub fn process_record(
    extractor: &dyn FrameExtractor,
    record: &FrameInput,
    policy: ValidationPolicy,
) -> FrameOutcome {
    let Some(tokens) = record.usable_tokens() else {
        match &record.error {
            Some(cause) => tracing::debug!("{}: OCR failed ({})", record.filepath, cause),
            None => tracing::debug!("{}: no OCR tokens", record.filepath),
        }
        return FrameOutcome {
            result: FrameResult::empty(&record.filepath),
            extractor_failed: false,
        };
    };

    match extractor.extract(tokens) {
        Ok(extraction) => FrameOutcome {
            result: validate_frame(&record.filepath, extraction, policy),
            extractor_failed: false,
        },
        Err(e) => {
            tracing::warn!(
                "{}: {} extractor failed: {:#}",
                record.filepath,
                extractor.name(),
                anyhow::Error::from(e)
            );
            FrameOutcome {
                result: FrameResult::empty(&record.filepath),
                extractor_failed: true,
            }
        }
    }
}

/// Runs one extractor over input files
pub struct Pipeline {
    extractor: Box<dyn FrameExtractor>,
    policy: ValidationPolicy,
    tolerance: u64,
    settings: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        extractor: Box<dyn FrameExtractor>,
        policy: ValidationPolicy,
        tolerance: u64,
        settings: PipelineConfig,
    ) -> Self {
        Self {
            extractor,
            policy,
            tolerance,
            settings,
        }
    }

    /// Reconcile a chunk of records, keeping input order
    pub fn process_chunk(&self, records: &[FrameInput]) -> Vec<FrameOutcome> {
        let extractor = self.extractor.as_ref();
        if self.settings.parallel {
            records
                .par_iter()
                .map(|record| process_record(extractor, record, self.policy))
                .collect()
        } else {
            records
                .iter()
                .map(|record| process_record(extractor, record, self.policy))
                .collect()
        }
    }

    /// Reconcile `input` into `output`.
    ///
    /// With `resume`, frames whose filepath already appears in `output` are
    /// kept as written and not reconciled again.
    pub fn run(
        &self,
        input: &Path,
        output: &Path,
        resume: bool,
        progress: Option<&ProgressBar>,
    ) -> AppResult<BatchReport> {
        let file = File::open(input)
            .with_context(|| format!("Failed to open input file: {}", input.display()))?;
        let batch = read_input(BufReader::new(file))?;
        tracing::info!(
            "Read {} frame record(s) from {} ({} malformed line(s) skipped)",
            batch.records.len(),
            input.display(),
            batch.skipped_lines
        );

        let mut frames = if resume && output.exists() {
            let file = File::open(output)
                .with_context(|| format!("Failed to open output file: {}", output.display()))?;
            read_results(BufReader::new(file))?
        } else {
            Vec::new()
        };
        let resumed = frames.len();

        let done: HashSet<&str> = frames.iter().map(|f| f.filepath.as_str()).collect();
        let pending: Vec<FrameInput> = batch
            .records
            .into_iter()
            .filter(|r| !done.contains(r.filepath.as_str()))
            .collect();
        if resumed > 0 {
            tracing::info!(
                "Resuming: {} frame(s) already written, {} pending",
                resumed,
                pending.len()
            );
        }

        if let Some(pb) = progress {
            pb.set_length(pending.len() as u64);
        }

        let mut writer = open_output(output, resume)?;
        let mut report = BatchReport {
            skipped_lines: batch.skipped_lines,
            resumed,
            ..Default::default()
        };

        for chunk in pending.chunks(self.settings.chunk_size.max(1)) {
            let outcomes = self.process_chunk(chunk);
            for outcome in outcomes {
                if outcome.extractor_failed {
                    report.extractor_failures += 1;
                }
                write_line(&mut writer, &outcome.result)?;
                frames.push(outcome.result);
            }
            writer
                .flush()
                .with_context(|| format!("Failed to write output file: {}", output.display()))?;
            if let Some(pb) = progress {
                pb.inc(chunk.len() as u64);
            }
        }
        drop(writer);

        let consistency = apply_consistency(&mut frames, self.tolerance);
        write_atomic(output, &frames)?;

        report.frames = frames.len();
        report.empty_frames = frames.iter().filter(|f| !f.has_players()).count();
        report.valid = consistency.valid;
        report.invalid = consistency.invalid;
        report.expected_total = consistency.expected_total;

        tracing::info!(
            "Wrote {} frame(s) to {} ({} empty, {} extractor failure(s))",
            report.frames,
            output.display(),
            report.empty_frames,
            report.extractor_failures
        );
        Ok(report)
    }
}

fn open_output(path: &Path, append: bool) -> AppResult<BufWriter<File>> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create output directory: {}", parent.display()))?;
        }
    }

    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .append(append)
        .truncate(!append)
        .open(path)
        .with_context(|| format!("Failed to open output file: {}", path.display()))?;

    // An interrupted run may have left a partial last line
    if append
        && ends_without_newline(&mut file)
            .with_context(|| format!("Failed to read output file: {}", path.display()))?
    {
        file.write_all(b"\n")
            .with_context(|| format!("Failed to write output file: {}", path.display()))?;
    }
    Ok(BufWriter::new(file))
}

fn ends_without_newline(file: &mut File) -> std::io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

fn write_line<W: Write>(writer: &mut W, result: &FrameResult) -> AppResult<()> {
    serde_json::to_writer(&mut *writer, result).context("Failed to serialize frame result")?;
    writer.write_all(b"\n").context("Failed to write frame result")?;
    Ok(())
}

/// Write all frames to a sibling temp file, then rename it over `path`
pub fn write_atomic(path: &Path, frames: &[FrameResult]) -> AppResult<()> {
    let tmp = temp_path(path);
    {
        let file = File::create(&tmp)
            .with_context(|| format!("Failed to create temp file: {}", tmp.display()))?;
        let mut writer = BufWriter::new(file);
        for frame in frames {
            write_line(&mut writer, frame)?;
        }
        writer
            .flush()
            .with_context(|| format!("Failed to write temp file: {}", tmp.display()))?;
    }
    fs::rename(&tmp, path)
        .with_context(|| format!("Failed to replace {} with {}", path.display(), tmp.display()))?;
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "output.jsonl".into());
    name.push(".tmp");
    path.with_file_name(name)
}
