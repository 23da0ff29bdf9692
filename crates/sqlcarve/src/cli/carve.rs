//! `sqlcarve carve`: recover records from input files into an output store.
//!
//! The carver runs on a producer thread and streams record batches through a
//! bounded channel; this thread is the single writer.

use crate::cli::config::{default_config_path, load_run_config, parse_scenarios, RunConfig};
use crate::cli::error::HelpfulError;
use crate::cli::inputs::collect_inputs;
use crate::cli::tables::{load_schema, resolve_tables};
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use sqlcarve_engine::dispatcher::CHANNEL_DEPTH;
use sqlcarve_engine::{
    CancellationToken, CarveOptions, CarveStats, Carver, FileReport, RecordBatch, Scenario,
};
use sqlcarve_sinks::{OutputTarget, RecordWriter, WriteSummary};
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::mpsc::{self, SyncSender};
use std::time::Instant;
use tracing::{info, warn};

/// Output used when neither flags, run config nor schema config name one.
pub const DEFAULT_OUTPUT: &str = "recovered.sqlite";

/// Arguments for the carve command
#[derive(Debug, clap::Args)]
pub struct CarveArgs {
    /// Schema configuration (JSON)
    #[arg(short, long)]
    pub schema: PathBuf,

    /// Input files or directories
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Output target: sqlite://<file>, csv://<dir>, or a path
    #[arg(short, long)]
    pub output: Option<String>,

    /// Worker threads per pass (0 = available parallelism)
    #[arg(short = 'j', long)]
    pub threads: Option<usize>,

    /// Scenarios to carve (0-5, comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub scenarios: Vec<u8>,

    /// Only keep records with a value containing this text
    #[arg(short, long)]
    pub keyword: Option<String>,

    /// Also carve legacy variants of tables with trailing DEFAULT columns
    #[arg(long)]
    pub legacy_variants: bool,

    /// Discard the output if the run is interrupted
    #[arg(long)]
    pub discard_partial: bool,

    /// Run configuration (TOML); defaults to ~/.sqlcarve/config.toml
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Print the run summary as JSON
    #[arg(long)]
    pub json: bool,
}

/// Effective settings after merging flags over the run config.
#[derive(Debug, Clone, PartialEq)]
pub struct CarveSettings {
    pub threads: usize,
    pub scenarios: Vec<Scenario>,
    pub keyword: Option<String>,
    pub output: String,
    pub legacy_variants: bool,
    pub keep_partial: bool,
}

impl CarveSettings {
    /// Flags win over the run config, which wins over the schema config's
    /// `"output db"` entry.
    pub fn resolve(
        args: &CarveArgs,
        config: RunConfig,
        schema_output: Option<&str>,
    ) -> std::result::Result<Self, HelpfulError> {
        let scenario_numbers = if args.scenarios.is_empty() {
            &config.scenarios
        } else {
            &args.scenarios
        };
        let scenarios = parse_scenarios(scenario_numbers)?;
        let output = args
            .output
            .clone()
            .or(config.output)
            .or_else(|| schema_output.map(str::to_string))
            .unwrap_or_else(|| DEFAULT_OUTPUT.to_string());

        Ok(Self {
            threads: args.threads.unwrap_or(config.threads),
            scenarios,
            keyword: args.keyword.clone().or(config.keyword).filter(|k| !k.is_empty()),
            output,
            legacy_variants: args.legacy_variants || config.legacy_variants,
            keep_partial: !args.discard_partial && config.keep_partial,
        })
    }
}

#[derive(Debug, Serialize)]
struct FailedInput {
    path: PathBuf,
    error: String,
}

#[derive(Debug, Serialize)]
struct CarveSummary {
    output: String,
    files: Vec<FileReport>,
    failed: Vec<FailedInput>,
    stats: CarveStats,
    written: WriteSummary,
    cancelled: bool,
    duration_ms: u64,
}

/// Install SIGINT/SIGTERM handlers that cancel the run.
fn install_signal_handlers(cancel: &CancellationToken) -> Result<()> {
    #[cfg(unix)]
    {
        use signal_hook::consts::{SIGINT, SIGTERM};
        use signal_hook::iterator::Signals;

        let flag = cancel.flag();
        let mut signals = Signals::new([SIGINT, SIGTERM])?;
        std::thread::spawn(move || {
            if let Some(sig) = signals.forever().next() {
                warn!("Received signal {}, stopping after the current chunk...", sig);
                flag.store(true, Ordering::SeqCst);
            }
        });
    }

    #[cfg(windows)]
    {
        let flag = cancel.flag();
        ctrlc::set_handler(move || {
            warn!("Received Ctrl+C, stopping after the current chunk...");
            flag.store(true, Ordering::SeqCst);
        })?;
    }

    Ok(())
}

/// Progress bar over input files; hidden when `enabled` is false.
fn progress_bar(len: usize, enabled: bool) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }
    let style = ProgressStyle::with_template(
        "{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} {wide_msg}",
    )
    .map(|s| s.progress_chars("=> "))
    .unwrap_or_else(|_| ProgressStyle::default_bar());
    let bar = ProgressBar::new(len as u64);
    bar.set_style(style);
    bar
}

/// Carve every input in turn, sending batches to `tx`.
fn carve_inputs(
    carver: &Carver,
    inputs: &[PathBuf],
    tx: SyncSender<RecordBatch>,
    cancel: &CancellationToken,
    progress: &ProgressBar,
) -> (Vec<FileReport>, Vec<FailedInput>) {
    let mut reports = Vec::with_capacity(inputs.len());
    let mut failed = Vec::new();

    for path in inputs {
        if cancel.is_cancelled() {
            break;
        }
        progress.set_message(display_name(path));
        match carver.carve_file(path, &tx) {
            Ok(report) => reports.push(report),
            Err(err) => {
                warn!("Skipping {}: {}", path.display(), err);
                failed.push(FailedInput {
                    path: path.clone(),
                    error: err.to_string(),
                });
            }
        }
        progress.inc(1);
    }
    (reports, failed)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Run the carve command
pub fn run(args: CarveArgs, show_progress: bool) -> Result<()> {
    let start = Instant::now();

    let config_path = match &args.config {
        Some(path) if !path.exists() => return Err(HelpfulError::path_not_found(path).into()),
        Some(path) => path.clone(),
        None => default_config_path()?,
    };
    let run_config = load_run_config(&config_path)
        .with_context(|| format!("Failed to load run config {}", config_path.display()))?;

    let schema = load_schema(&args.schema)?;
    let settings = CarveSettings::resolve(&args, run_config, schema.output_db())?;
    let tables = resolve_tables(&schema, &args.schema, settings.legacy_variants)?;

    let inputs = collect_inputs(&args.inputs)?;
    if inputs.is_empty() {
        return Err(HelpfulError::no_inputs(&args.inputs).into());
    }

    let target = OutputTarget::parse(&settings.output)
        .map_err(|err| HelpfulError::output_unavailable(&settings.output, &err.to_string()))?;
    let mut writer = RecordWriter::open(target, &tables)
        .map_err(|err| HelpfulError::output_unavailable(&settings.output, &err.to_string()))?
        .with_keyword(settings.keyword.clone());

    let cancel = CancellationToken::new();
    install_signal_handlers(&cancel)?;

    let options = CarveOptions {
        threads: settings.threads,
        scenarios: settings.scenarios.clone(),
        keyword: settings.keyword.clone(),
    };
    let carver = Carver::new(tables, &options).with_cancellation(cancel.clone());
    info!(
        inputs = inputs.len(),
        matchers = carver.matchers().len(),
        threads = carver.threads(),
        output = %writer.target(),
        "Starting carve"
    );

    let progress = progress_bar(inputs.len(), show_progress && !args.json);
    let (tx, rx) = mpsc::sync_channel::<RecordBatch>(CHANNEL_DEPTH);

    let (reports, failed, write_error) = std::thread::scope(|scope| {
        let producer = scope.spawn(|| carve_inputs(&carver, &inputs, tx, &cancel, &progress));

        let mut write_error = None;
        for batch in rx.iter() {
            if write_error.is_some() {
                continue;
            }
            if let Err(err) = writer.write_batch(&batch) {
                cancel.cancel();
                write_error = Some(err);
            }
        }

        match producer.join() {
            Ok((reports, failed)) => Ok((reports, failed, write_error)),
            Err(_) => Err(anyhow::anyhow!("Carving thread panicked")),
        }
    })?;
    progress.finish_and_clear();

    if let Some(err) = write_error {
        let _ = writer.abort();
        return Err(err).context("Failed to store recovered records");
    }
    if reports.is_empty() && !failed.is_empty() {
        let _ = writer.abort();
        anyhow::bail!("None of the {} inputs could be carved", failed.len());
    }

    let mut stats = CarveStats::default();
    for report in &reports {
        stats.merge(&report.stats);
        writer.record_source(report)?;
    }

    let cancelled = cancel.is_cancelled();
    if cancelled {
        warn!("Carve interrupted; {} of {} inputs completed", reports.len(), inputs.len());
    }
    let keep_partial = settings.keep_partial;
    let guard: &dyn Fn() -> bool = &move || keep_partial || !cancelled;
    let written = writer
        .finish_with_guard(Some(guard))
        .context("Failed to commit recovered records")?;

    let summary = CarveSummary {
        output: settings.output,
        files: reports,
        failed,
        stats,
        written,
        cancelled,
        duration_ms: start.elapsed().as_millis() as u64,
    };
    print_summary(&summary, args.json)
}

fn print_summary(summary: &CarveSummary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    println!("CARVE SUMMARY");
    println!("=============");
    println!();
    for file in &summary.files {
        println!(
            "{}  {} bytes  {} records  blake3 {}",
            file.path.display(),
            file.size,
            file.stats.accepted,
            file.blake3
        );
    }
    for failed in &summary.failed {
        println!("{}  FAILED: {}", failed.path.display(), failed.error);
    }
    println!();
    println!("Candidates: {}", summary.stats.candidates);
    println!("Accepted:   {}", summary.stats.accepted);
    println!("Rejected:   {}", summary.stats.rejected());
    for scenario in Scenario::ALL {
        let count = summary.stats.per_scenario[usize::from(scenario.index())];
        if count > 0 {
            println!("  {}: {}", scenario, count);
        }
    }
    println!();
    println!("Output:     {}", summary.output);
    println!("Written:    {}", summary.written.written);
    if summary.written.filtered > 0 {
        println!("Filtered:   {} (keyword)", summary.written.filtered);
    }
    if summary.written.rejected > 0 {
        println!("Rejected by output: {}", summary.written.rejected);
        for (table, count) in &summary.written.rejected_per_table {
            println!("  {}: {} rejected", table, count);
        }
    }
    for (table, count) in &summary.written.per_table {
        println!("  {}: {}", table, count);
    }
    if summary.cancelled {
        println!();
        println!("Interrupted before all inputs were carved.");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: CarveArgs,
    }

    fn args(extra: &[&str]) -> CarveArgs {
        let mut argv = vec!["sqlcarve", "--schema", "schema.json", "evidence.db"];
        argv.extend_from_slice(extra);
        Harness::parse_from(argv).args
    }

    #[test]
    fn test_defaults_come_from_run_config() {
        let config = RunConfig {
            threads: 3,
            scenarios: vec![2, 0],
            keyword: Some("alice".into()),
            ..RunConfig::default()
        };
        let settings = CarveSettings::resolve(&args(&[]), config, None).unwrap();
        assert_eq!(settings.threads, 3);
        assert_eq!(
            settings.scenarios,
            vec![Scenario::Intact, Scenario::PrefixOverwritten]
        );
        assert_eq!(settings.keyword.as_deref(), Some("alice"));
        assert_eq!(settings.output, DEFAULT_OUTPUT);
        assert!(settings.keep_partial);
    }

    #[test]
    fn test_flags_override_run_config() {
        let config = RunConfig {
            threads: 3,
            output: Some("csv://config_out".into()),
            ..RunConfig::default()
        };
        let settings = CarveSettings::resolve(
            &args(&["-j", "8", "--scenarios", "5,1", "-o", "flag.sqlite", "--discard-partial"]),
            config,
            Some("schema.sqlite"),
        )
        .unwrap();
        assert_eq!(settings.threads, 8);
        assert_eq!(
            settings.scenarios,
            vec![Scenario::FirstTypeOverwritten, Scenario::RowidSplit]
        );
        assert_eq!(settings.output, "flag.sqlite");
        assert!(!settings.keep_partial);
    }

    #[test]
    fn test_schema_output_is_last_resort() {
        let settings =
            CarveSettings::resolve(&args(&[]), RunConfig::default(), Some("from_schema.sqlite"))
                .unwrap();
        assert_eq!(settings.output, "from_schema.sqlite");
    }

    #[test]
    fn test_unknown_scenario_is_rejected() {
        let err = CarveSettings::resolve(&args(&["--scenarios", "7"]), RunConfig::default(), None)
            .unwrap_err();
        assert_eq!(err.message, "Unknown scenario: 7");
    }
}
