//! CLI binary for cardscan.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ProcessorConfig` and the default adapters.

use anyhow::{Context, Result};
use cardscan::pipeline::export::CatalogExporter;
use cardscan::pipeline::matching::VocabularyMatcher;
use cardscan::pipeline::ocr::TesseractCli;
use cardscan::pipeline::region::FractionalCropper;
use cardscan::pipeline::store::JsonLinesStore;
use cardscan::{
    compare_hash_with, process_batch, Adapters, BatchItem, BatchSummary, JobOutcome,
    JobProgressCallback, ProcessorConfig, ProgressCallback, Region, WindowConvention,
};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// One bar for the whole batch, advanced as jobs finish. Region failures are
/// printed above the bar; jobs may finish out of order.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new(total: usize) -> Arc<Self> {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} cards  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        let bar = ProgressBar::new(total as u64);
        bar.set_style(style);
        bar.set_prefix("Scanning");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self { bar })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

fn file_label(source: &Path) -> String {
    source
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| source.display().to_string())
}

impl JobProgressCallback for CliProgressCallback {
    fn on_region_start(&self, source: &Path, region: Region) {
        self.bar.set_message(format!("{} · {region}", file_label(source)));
    }

    fn on_region_error(&self, source: &Path, region: Region, error: &str) {
        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} {:<24} {:<6} {}",
            yellow("!"),
            file_label(source),
            region,
            dim(&msg)
        ));
    }

    fn on_job_complete(&self, source: &Path, success: bool) {
        if !success {
            self.bar
                .println(format!("  {} {}", red("✗"), file_label(source)));
        }
        self.bar.inc(1);
    }
}

// ── CLI definition ───────────────────────────────────────────────────────────

const AFTER_HELP: &str = r#"EXAMPLES:
  # Identify a folder of card photos (dry run: nothing is stored)
  cardscan scan scans/*.jpg --names names.txt --types types.txt --catalog catalog.json

  # Store needs-attention records and write confirmed output
  cardscan scan scans/*.jpg --names names.txt --types types.txt \
      --catalog catalog.json --query --output-dir out/

  # Compare two perceptual hashes
  cardscan compare abcd1234abcd1234 abcd1234abcd12ff

  # Reproduce the historical windowing
  cardscan compare 0000000000000000 ffffffffffffffff --legacy-windows --json

FILES:
  --names     one card name per line, '#' starts a comment
  --types     one type line per line, '#' starts a comment
  --catalog   JSON array of {"name": "...", "sets": ["..."]}

ENVIRONMENT VARIABLES:
  CARDSCAN_NAMES, CARDSCAN_TYPES, CARDSCAN_CATALOG   vocabulary and catalog files
  CARDSCAN_OUTPUT_DIR                                confirmed output directory
  CARDSCAN_TESSERACT                                 tesseract binary
  RUST_LOG                                           overrides -v / -q
"#;

/// Identify trading cards from photographs.
#[derive(Parser, Debug)]
#[command(
    name = "cardscan",
    version,
    about = "Identify trading cards from photographs and compare image hashes",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "CARDSCAN_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "CARDSCAN_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crop, read and match card photographs.
    Scan(ScanArgs),
    /// Compare two perceptual image hashes.
    Compare(CompareArgs),
}

#[derive(Args, Debug)]
struct ScanArgs {
    /// Card photographs (PNG or JPEG).
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// Card-name vocabulary file.
    #[arg(long, env = "CARDSCAN_NAMES")]
    names: PathBuf,

    /// Type-line vocabulary file.
    #[arg(long, env = "CARDSCAN_TYPES")]
    types: PathBuf,

    /// JSON catalog used to confirm names.
    #[arg(long, env = "CARDSCAN_CATALOG")]
    catalog: PathBuf,

    /// Persist needs-attention records.
    #[arg(long, env = "CARDSCAN_QUERY")]
    query: bool,

    /// Needs-attention JSON Lines file. Default: <output-dir>/needs-attention.jsonl
    #[arg(long, env = "CARDSCAN_STORE")]
    store: Option<PathBuf>,

    /// Directory for confirmed-output records.
    #[arg(long, env = "CARDSCAN_OUTPUT_DIR", default_value = "cardscan-output")]
    output_dir: PathBuf,

    /// Parent directory for job working directories.
    #[arg(long, env = "CARDSCAN_WORK_ROOT")]
    work_root: Option<PathBuf>,

    /// Crop and read the four regions of a card concurrently.
    #[arg(long, env = "CARDSCAN_CONCURRENT_REGIONS")]
    concurrent_regions: bool,

    /// Number of cards processed at once.
    #[arg(short, long, env = "CARDSCAN_JOBS", default_value_t = 4)]
    jobs: usize,

    /// Minimum match score (0.0–1.0) for name and type candidates.
    #[arg(long, env = "CARDSCAN_MATCH_FLOOR", default_value_t = 0.3)]
    match_floor: f64,

    /// Tesseract binary.
    #[arg(long, env = "CARDSCAN_TESSERACT", default_value = "tesseract")]
    tesseract: PathBuf,

    /// OCR language.
    #[arg(long, env = "CARDSCAN_LANG", default_value = "eng")]
    lang: String,

    /// Per-call OCR timeout in seconds.
    #[arg(long, env = "CARDSCAN_OCR_TIMEOUT", default_value_t = 60)]
    ocr_timeout: u64,

    /// Result-service timeout in seconds.
    #[arg(long, env = "CARDSCAN_EXPORT_TIMEOUT", default_value_t = 60)]
    export_timeout: u64,

    /// Skip writing confirmed-output records.
    #[arg(long)]
    no_output: bool,

    /// Print per-card results as JSON.
    #[arg(long, env = "CARDSCAN_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "CARDSCAN_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Args, Debug)]
struct CompareArgs {
    /// First hash.
    hash_a: String,

    /// Second hash.
    hash_b: String,

    /// Use the historical window convention (degenerate first window, last
    /// window skipped).
    #[arg(long)]
    legacy_windows: bool,

    /// Print the comparison as JSON.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level job logs in scan mode.
    let show_progress = match &cli.command {
        Command::Scan(args) => !cli.quiet && !args.no_progress && !args.json,
        Command::Compare(_) => false,
    };
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Scan(args) => scan(args, show_progress, cli.quiet).await,
        Command::Compare(args) => compare(args),
    }
}

// ── compare ──────────────────────────────────────────────────────────────────

fn compare(args: CompareArgs) -> Result<()> {
    let convention = if args.legacy_windows {
        WindowConvention::Legacy
    } else {
        WindowConvention::Aligned
    };
    let cmp = compare_hash_with(&args.hash_a, &args.hash_b, convention)
        .context("Cannot compare hashes")?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&cmp).context("Failed to serialise comparison")?
        );
    } else {
        println!("2-bit matches:   {:.2}", cmp.two_bit_matches);
        println!("4-bit matches:   {:.2}", cmp.four_bit_matches);
        println!("String compare:  {:.2}", cmp.string_compare);
    }
    Ok(())
}

// ── scan ─────────────────────────────────────────────────────────────────────

async fn scan(args: ScanArgs, show_progress: bool, quiet: bool) -> Result<()> {
    let progress = show_progress.then(|| CliProgressCallback::new(args.images.len()));

    let config = build_config(&args, progress.clone().map(|cb| cb as ProgressCallback))?;
    let adapters = build_adapters(&args, &config).await?;

    let items = process_batch(
        args.images.iter().cloned(),
        Arc::new(adapters),
        &config,
        !args.no_output,
    )
    .await;

    if let Some(cb) = &progress {
        cb.finish();
    }

    if args.json {
        let rows: Vec<serde_json::Value> = items.iter().map(item_json).collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&rows).context("Failed to serialise results")?
        );
    } else if !quiet {
        for item in &items {
            print_item(item);
        }
    }

    let summary = BatchSummary::from_items(&items);
    if !quiet && !args.json {
        eprintln!(
            "{} {} cards: {} confirmed, {} needs attention, {} export failed, {} failed  ({} written)",
            if summary.failed == 0 { green("✔") } else { yellow("⚠") },
            bold(&summary.total().to_string()),
            summary.confirmed,
            summary.needs_attention,
            summary.export_failed,
            summary.failed,
            summary.written,
        );
    }

    if summary.total() > 0 && summary.failed == summary.total() {
        anyhow::bail!("No card could be processed");
    }
    Ok(())
}

/// Map CLI args to `ProcessorConfig`.
fn build_config(args: &ScanArgs, progress: Option<ProgressCallback>) -> Result<ProcessorConfig> {
    let mut builder = ProcessorConfig::builder()
        .querying_enabled(args.query)
        .concurrent_regions(args.concurrent_regions)
        .output_dir(&args.output_dir)
        .job_concurrency(args.jobs)
        .ocr_timeout_secs(args.ocr_timeout)
        .export_timeout_secs(args.export_timeout);

    if let Some(ref root) = args.work_root {
        builder = builder.work_root(root);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Load vocabularies and the catalog, and wire the default adapters.
async fn build_adapters(args: &ScanArgs, config: &ProcessorConfig) -> Result<Adapters> {
    let names = VocabularyMatcher::from_file(&args.names)
        .await
        .with_context(|| format!("Failed to load card names from {:?}", args.names))?
        .floor(args.match_floor);
    let types = VocabularyMatcher::from_file(&args.types)
        .await
        .with_context(|| format!("Failed to load type lines from {:?}", args.types))?
        .floor(args.match_floor);
    let catalog = CatalogExporter::from_file(&args.catalog)
        .await
        .with_context(|| format!("Failed to load catalog from {:?}", args.catalog))?;

    let ocr = TesseractCli::default()
        .binary(&args.tesseract)
        .lang(&args.lang);

    let mut builder = Adapters::builder()
        .extractor(Arc::new(FractionalCropper::default()))
        .ocr(Arc::new(ocr))
        .names(Arc::new(names))
        .types(Arc::new(types))
        .exporter(Arc::new(catalog));

    if let Some(ref store) = args.store {
        builder = builder.store(Arc::new(JsonLinesStore::new(store)));
    }

    builder.build(config).context("Invalid adapter set")
}

fn print_item(item: &BatchItem) {
    let label = file_label(&item.source);
    match &item.result {
        Ok(JobOutcome::Confirmed { candidate }) => {
            let written = match &item.output {
                Some(Ok(path)) => dim(&format!("→ {}", path.display())),
                Some(Err(e)) => red(&format!("output failed: {e}")),
                None => String::new(),
            };
            println!(
                "{} {:<24} {} {}  {}",
                green("✓"),
                label,
                bold(&candidate.name),
                dim(&format!("({:.2})", candidate.confidence)),
                written
            );
        }
        Ok(JobOutcome::NeedsAttention(route)) => {
            let record = route.record();
            println!(
                "{} {:<24} needs attention  {} {}",
                yellow("?"),
                label,
                record.card_name,
                dim(&format!("[{}]", record.possible_sets))
            );
        }
        Ok(JobOutcome::ExportFailed { reason }) => {
            println!("{} {:<24} export failed: {}", red("✗"), label, reason);
        }
        Err(e) => {
            println!("{} {:<24} {}", red("✗"), label, e);
        }
    }
}

fn item_json(item: &BatchItem) -> serde_json::Value {
    let source = item.source.display().to_string();
    let output = match &item.output {
        Some(Ok(path)) => json!(path.display().to_string()),
        _ => serde_json::Value::Null,
    };
    match &item.result {
        Ok(JobOutcome::Confirmed { candidate }) => json!({
            "source": source,
            "outcome": "confirmed",
            "name": candidate.name,
            "confidence": candidate.confidence,
            "output": output,
        }),
        Ok(JobOutcome::NeedsAttention(route)) => json!({
            "source": source,
            "outcome": "needs-attention",
            "stored": route.is_stored(),
            "record": route.record(),
        }),
        Ok(JobOutcome::ExportFailed { reason }) => json!({
            "source": source,
            "outcome": "export-failed",
            "error": reason,
        }),
        Err(e) => json!({
            "source": source,
            "outcome": "failed",
            "error": e.to_string(),
        }),
    }
}
