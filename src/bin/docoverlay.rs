//! CLI binary for docoverlay.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `AnalysisConfig`, wires the S3/Textract backends and prints the listing
//! or the JSON overlays.

use anyhow::{Context, Result};
use clap::Parser;
use docoverlay::{
    analyze_input, AggregateResult, AnalysisConfig, FeatureType, FetchError, OverlayRenderer,
    PageDimensions, PageOverlays, PollObserver, PollOutcome, S3Store, SharedObserver,
    TextractService,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
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
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI poll observer using indicatif ────────────────────────────────────────

/// Terminal observer: a spinner that shows the current tick and element
/// count, with a log line for every failed fetch.
struct CliPollObserver {
    bar: ProgressBar,
}

impl CliPollObserver {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  {msg}  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(style);
        bar.set_prefix("Submitting");
        bar.set_message("uploading document…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self { bar })
    }
}

impl PollObserver for CliPollObserver {
    fn on_poll_start(&self, job_id: &str) {
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Analysis job {job_id} started"))
        ));
        self.bar.set_prefix("Analysing");
        self.bar.set_message("waiting for first poll…");
    }

    fn on_tick(&self, _job_id: &str, tick: u32) {
        self.bar.set_message(format!("poll #{tick}"));
    }

    fn on_update(&self, _job_id: &str, result: &AggregateResult) {
        self.bar.set_message(format!(
            "in progress  {}",
            dim(&format!("{} elements so far", result.element_count()))
        ));
    }

    fn on_fetch_error(&self, _job_id: &str, consecutive: u32, error: &FetchError) {
        let msg = error.to_string();
        // Truncate very long error messages to keep output tidy.
        let msg = if msg.chars().count() > 80 {
            format!("{}\u{2026}", msg.chars().take(79).collect::<String>())
        } else {
            msg
        };
        self.bar.println(format!(
            "  {} fetch failed ({consecutive} in a row)  {}",
            yellow("⚠"),
            dim(&msg)
        ));
    }

    fn on_terminal(&self, _job_id: &str, outcome: &PollOutcome) {
        self.bar.finish_and_clear();
        match outcome {
            PollOutcome::Succeeded(result) => eprintln!(
                "{} {} elements on {} pages",
                green("✔"),
                bold(&result.element_count().to_string()),
                result.pages.len()
            ),
            PollOutcome::Failed(e) => eprintln!("{} {}", red("✘"), red(&e.to_string())),
            PollOutcome::Cancelled => {}
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Analyse a scan and list its lines
  docoverlay --bucket my-uploads receipt.png

  # Overlays for page 1, whose rendered size is known
  docoverlay --bucket my-uploads --page-size 1=800x1000 --json invoice.pdf

  # Take page sizes from rendered page images and highlight one element
  docoverlay --bucket my-uploads --page-image 1=page-1.png --page-image 2=page-2.png \
             --select 5c1b0f3e-0000-4a7d-9c1e-2f3a4b5c6d7e --json contract.pdf

  # Analyse a document from a URL, polling every 5 seconds
  docoverlay --bucket my-uploads --interval-secs 5 https://example.com/form.pdf

ENVIRONMENT VARIABLES:
  S3_BUCKET               Bucket the document is uploaded to
  AWS_REGION              AWS region for S3 and Textract
  AWS_ACCESS_KEY_ID       AWS credentials (or any other source the AWS SDK supports)
  AWS_SECRET_ACCESS_KEY
  RUST_LOG                Override log filter (e.g. docoverlay=debug)

A .env file in the working directory is loaded before flags are parsed.
"#;

/// Analyse documents and print their text positioned over the pages.
#[derive(Parser, Debug)]
#[command(
    name = "docoverlay",
    version,
    about = "Analyse a document with Amazon Textract and map its text onto rendered pages",
    long_about = "Upload a document (local file or URL) to S3, run an asynchronous Textract \
document analysis on it, and print the extracted lines, or the pixel rectangles of every \
line and word for each page whose rendered size is known.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local document path or HTTP/HTTPS URL.
    input: String,

    /// S3 bucket to upload the document to.
    #[arg(long, env = "S3_BUCKET")]
    bucket: String,

    /// AWS region (defaults to the AWS SDK's region resolution).
    #[arg(long, env = "AWS_REGION")]
    region: Option<String>,

    /// Object key prefix for uploads.
    #[arg(long, env = "DOCOVERLAY_KEY_PREFIX", default_value = "uploads/")]
    key_prefix: String,

    /// Analysis features: tables, forms, queries, signatures, layout.
    #[arg(long, env = "DOCOVERLAY_FEATURES", value_delimiter = ',', default_value = "tables,forms")]
    features: Vec<String>,

    /// Rendered size of a page, as N=WIDTHxHEIGHT (repeatable).
    #[arg(long = "page-size", value_name = "N=WxH")]
    page_sizes: Vec<String>,

    /// Rendered image of a page, as N=PATH; its pixel size is used (repeatable).
    #[arg(long = "page-image", value_name = "N=PATH")]
    page_images: Vec<String>,

    /// Element id to highlight.
    #[arg(long)]
    select: Option<String>,

    /// Seconds between polls.
    #[arg(long, env = "DOCOVERLAY_INTERVAL", default_value_t = 3)]
    interval_secs: u64,

    /// Give up if the job is still running after this many seconds.
    #[arg(long, env = "DOCOVERLAY_MAX_WAIT", default_value_t = 600)]
    max_wait_secs: u64,

    /// Consecutive failed polls tolerated before giving up.
    #[arg(long, env = "DOCOVERLAY_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "DOCOVERLAY_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Output JSON (job, result, overlays, listing) instead of the listing.
    #[arg(long, env = "DOCOVERLAY_JSON")]
    json: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "DOCOVERLAY_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOCOVERLAY_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOCOVERLAY_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is not an error.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the spinner is active; it
    // provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
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

    // ── Build config ─────────────────────────────────────────────────────
    let config = build_config(&cli)?;
    let page_sizes = collect_page_sizes(&cli)?;

    // ── AWS backends ─────────────────────────────────────────────────────
    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
    if let Some(ref region) = cli.region {
        loader = loader.region(aws_config::Region::new(region.clone()));
    }
    let sdk = loader.load().await;
    let region = sdk
        .region()
        .map(|r| r.to_string())
        .context("No AWS region configured (use --region or AWS_REGION)")?;

    let store = Arc::new(S3Store::from_sdk_config(&sdk, &cli.bucket));
    let service = Arc::new(TextractService::from_sdk_config(&sdk));

    // ── Run analysis ─────────────────────────────────────────────────────
    let observer: Option<SharedObserver> = if show_progress {
        Some(CliPollObserver::new() as SharedObserver)
    } else {
        None
    };

    let output = analyze_input(&cli.input, store, service, &config, observer)
        .await
        .context("Analysis failed")?;

    // ── Overlays ─────────────────────────────────────────────────────────
    let mut renderer = OverlayRenderer::new(output.result.clone());
    for (&page, &dims) in &page_sizes {
        renderer.on_page_rendered(page, dims);
    }
    if let Some(ref id) = cli.select {
        if output.result.find(id).is_none() {
            anyhow::bail!("No LINE or WORD element with id '{id}'");
        }
        renderer.select(id.clone());
    }

    if cli.json {
        let overlays: BTreeMap<u32, PageOverlays> = output
            .result
            .page_numbers()
            .map(|p| (p, renderer.overlays_for_page(p)))
            .collect();
        let json = serde_json::json!({
            "job": output.job,
            "url": output.job.location.public_url(&region),
            "stats": output.stats,
            "selection": renderer.selection(),
            "listing": renderer.listing(),
            "overlays": overlays,
            "result": output.result,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&json).context("Failed to serialise output")?
        );
        return Ok(());
    }

    for entry in renderer.listing() {
        let marker = if entry.emphasized { yellow("▶") } else { " ".into() };
        println!(
            "{marker} {}  {}  {}",
            dim(&format!("p{:<3}", entry.page)),
            entry.text,
            dim(&entry.element_id)
        );
    }

    if !cli.quiet {
        for page in output.result.page_numbers() {
            match renderer.overlays_for_page(page) {
                PageOverlays::Ready(overlays) => eprintln!(
                    "   page {page}: {} overlays",
                    overlays.len()
                ),
                PageOverlays::Pending(_) => {
                    eprintln!("   page {page}: {}", dim("pending (no page size given)"))
                }
            }
        }
        eprintln!(
            "   {} polls  /  {} fetches  —  {}ms total  ({})",
            dim(&output.stats.ticks.to_string()),
            dim(&output.stats.fetch_calls.to_string()),
            output.stats.total_duration_ms,
            output.job.location.public_url(&region),
        );
    }

    Ok(())
}

/// Map CLI args to `AnalysisConfig`.
fn build_config(cli: &Cli) -> Result<AnalysisConfig> {
    let features = cli
        .features
        .iter()
        .map(|f| {
            FeatureType::parse(f).with_context(|| format!("Unknown analysis feature: '{f}'"))
        })
        .collect::<Result<Vec<_>>>()?;

    AnalysisConfig::builder()
        .poll_interval(Duration::from_secs(cli.interval_secs))
        .max_poll_duration(Duration::from_secs(cli.max_wait_secs))
        .max_fetch_retries(cli.max_retries)
        .feature_types(features)
        .key_prefix(cli.key_prefix.clone())
        .download_timeout_secs(cli.download_timeout)
        .build()
        .context("Invalid configuration")
}

/// Merge `--page-size` and `--page-image` into one page → size map.
fn collect_page_sizes(cli: &Cli) -> Result<BTreeMap<u32, PageDimensions>> {
    let mut sizes = BTreeMap::new();

    for arg in &cli.page_sizes {
        let (page, size) = split_page_arg(arg)?;
        let (w, h) = size
            .split_once(['x', 'X'])
            .with_context(|| format!("Invalid page size '{arg}', expected N=WIDTHxHEIGHT"))?;
        let w: f64 = w.trim().parse().context("Invalid page width")?;
        let h: f64 = h.trim().parse().context("Invalid page height")?;
        if w <= 0.0 || h <= 0.0 {
            anyhow::bail!("Page size must be positive (got {w}x{h})");
        }
        sizes.insert(page, PageDimensions::new(w, h));
    }

    for arg in &cli.page_images {
        let (page, path) = split_page_arg(arg)?;
        let path = PathBuf::from(path);
        let (w, h) = image::image_dimensions(&path)
            .with_context(|| format!("Failed to read image size of {}", path.display()))?;
        sizes.insert(page, PageDimensions::new(f64::from(w), f64::from(h)));
    }

    Ok(sizes)
}

/// Split `N=VALUE`, validating the 1-based page number.
fn split_page_arg(arg: &str) -> Result<(u32, &str)> {
    let (page, value) = arg
        .split_once('=')
        .with_context(|| format!("Invalid page argument '{arg}', expected N=VALUE"))?;
    let page: u32 = page
        .trim()
        .parse()
        .with_context(|| format!("Invalid page number: '{}'", page.trim()))?;
    if page < 1 {
        anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", page);
    }
    Ok((page, value))
}
