use anyhow::{bail, Context};
use chipcount_reconcile::config::{Config, ExtractorKind, ValidationPolicy};
use chipcount_reconcile::error::AppResult;
use chipcount_reconcile::extractor::{build_extractor, HeuristicExtractor};
use chipcount_reconcile::pipeline::{process_record, read_input, Pipeline};
use chipcount_reconcile::reconcile::{RuleTables, TokenOutcome};
use chipcount_reconcile::summary::BatchSummary;
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "chipcount", version, about = "Reconcile broadcast OCR output into player chip counts")]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug-level logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Reconcile an OCR JSONL file into a results JSONL file
    Reconcile {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Override the configured extractor
        #[arg(long, value_enum)]
        extractor: Option<ExtractorArg>,
        /// Override the configured validation policy
        #[arg(long, value_enum)]
        policy: Option<PolicyArg>,
        /// Skip frames already present in the output file
        #[arg(long)]
        resume: bool,
        /// No progress bar
        #[arg(short, long)]
        quiet: bool,
    },
    /// Trace how one frame of an OCR JSONL file is reconciled
    Inspect {
        #[arg(short, long)]
        input: PathBuf,
        /// Zero-based record index
        #[arg(long, default_value_t = 0)]
        index: usize,
    },
    /// Summarize a results JSONL file
    Summary {
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write the default configuration
    Init {
        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration
    Show,
}

#[derive(Clone, Copy, ValueEnum)]
enum ExtractorArg {
    Heuristic,
    Llm,
}

impl From<ExtractorArg> for ExtractorKind {
    fn from(arg: ExtractorArg) -> Self {
        match arg {
            ExtractorArg::Heuristic => ExtractorKind::Heuristic,
            ExtractorArg::Llm => ExtractorKind::Llm,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum PolicyArg {
    Strict,
    Lenient,
}

impl From<PolicyArg> for ValidationPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Strict => ValidationPolicy::Strict,
            PolicyArg::Lenient => ValidationPolicy::Lenient,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    initialize_tracing(cli.verbose);

    if let Err(e) = run(cli) {
        tracing::error!("{:#}", e);
        std::process::exit(1);
    }
}

/// Console on stderr plus a daily-rotated file under the config directory
fn initialize_tracing(verbose: bool) {
    use tracing_appender::rolling;
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let log_dir = Config::app_dir()
        .map(|dir| dir.join("logs"))
        .unwrap_or_else(|_| PathBuf::from("logs"));

    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!("Warning: Failed to create log directory: {}", e);
    }

    let file_appender = rolling::daily(&log_dir, "chipcount.log");

    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_line_number(true);

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    tracing::debug!("Log directory: {}", log_dir.display());
}

fn run(cli: Cli) -> AppResult<()> {
    let config_path = cli.config.as_deref();

    match cli.command {
        Command::Reconcile {
            input,
            output,
            extractor,
            policy,
            resume,
            quiet,
        } => {
            let config = Config::load(config_path)?;
            reconcile(&config, &input, &output, extractor, policy, resume, quiet)
        }
        Command::Inspect { input, index } => {
            let config = Config::load(config_path)?;
            inspect(&config, &input, index)
        }
        Command::Summary { input } => {
            let summary = BatchSummary::from_file(&input)?;
            println!("{}", summary);
            Ok(())
        }
        Command::Config { action } => match action {
            ConfigAction::Init { force } => {
                let path = match config_path {
                    Some(p) => p.to_path_buf(),
                    None => Config::default_path()?,
                };
                if path.exists() && !force {
                    bail!("{} already exists (use --force to replace it)", path.display());
                }
                Config::default().save(&path)?;
                println!("Wrote default configuration to {}", path.display());
                Ok(())
            }
            ConfigAction::Show => {
                let config = Config::load(config_path)?;
                let json = serde_json::to_string_pretty(&config)
                    .context("Failed to serialize configuration")?;
                println!("{}", json);
                Ok(())
            }
        },
    }
}

fn reconcile(
    config: &Config,
    input: &Path,
    output: &Path,
    extractor: Option<ExtractorArg>,
    policy: Option<PolicyArg>,
    resume: bool,
    quiet: bool,
) -> AppResult<()> {
    let rules = Arc::new(RuleTables::resolve(config.rules_path.as_deref())?);
    let kind = extractor.map(ExtractorKind::from).unwrap_or(config.extractor);
    let policy = policy
        .map(ValidationPolicy::from)
        .unwrap_or(config.reconcile.validation_policy);
    tracing::info!("Validation policy: {:?}", policy);

    let extractor = build_extractor(kind, config, rules)?;
    let pipeline = Pipeline::new(
        extractor,
        policy,
        config.reconcile.consistency_tolerance,
        config.pipeline.clone(),
    );

    let pb = if quiet {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(0);
        pb.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} frames",
            )
            .context("Invalid progress template")?
            .progress_chars("#>-"),
        );
        pb
    };

    let report = pipeline.run(input, output, resume, Some(&pb))?;
    pb.finish_and_clear();

    println!("{}", report);
    Ok(())
}

fn inspect(config: &Config, input: &Path, index: usize) -> AppResult<()> {
    let file = File::open(input)
        .with_context(|| format!("Failed to open input file: {}", input.display()))?;
    let batch = read_input(BufReader::new(file))?;
    let Some(record) = batch.records.get(index) else {
        bail!(
            "Record index {} out of range ({} record(s) in {})",
            index,
            batch.records.len(),
            input.display()
        );
    };

    let rules = Arc::new(RuleTables::resolve(config.rules_path.as_deref())?);
    let extractor = HeuristicExtractor::new(rules, &config.reconcile);

    println!("Frame: {}", record.filepath);
    match record.usable_tokens() {
        Some(tokens) => {
            for token in tokens {
                let outcome = match extractor.reconciler().inspect_token(token) {
                    TokenOutcome::Name(name) => format!("name '{}'", name),
                    TokenOutcome::Chip(value) => format!("chips {}", value),
                    TokenOutcome::Rejected(reason) => format!("noise ({})", reason.as_str()),
                    TokenOutcome::Unparsable(e) => format!("noise ({})", e),
                };
                println!(
                    "  {:<24} x={:<8.1} y={:<8.1} conf={:.2}  -> {}",
                    format!("{:?}", token.text),
                    token.x,
                    token.y,
                    token.confidence,
                    outcome
                );
            }
        }
        None => println!("  (no usable tokens)"),
    }

    let outcome = process_record(&extractor, record, config.reconcile.validation_policy);
    let json = serde_json::to_string_pretty(&outcome.result)
        .context("Failed to serialize frame result")?;
    println!("{}", json);
    Ok(())
}
