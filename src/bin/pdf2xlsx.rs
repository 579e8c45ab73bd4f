//! CLI binary for edgequake-pdf2xlsx.
//!
//! A thin presentation layer over the library: it turns command-line flags
//! into a `ClientConfig`, raises the same intents a graphical front end would
//! (select, convert, download), and renders the session with a progress bar.

use anyhow::{bail, Context, Result};
use clap::Parser;
use edgequake_pdf2xlsx::{
    Artifact, ClientConfig, ConversionError, ConversionProgressCallback, ConversionState,
    HttpConversionService, ProgressCallback, RawFile, Session, UserIntent,
};
use indicatif::{ProgressBar, ProgressStyle};
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
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a percentage bar fed by the synthetic
/// progress samples of the running episode.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(100);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}%  ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);
        bar.set_style(style);
        bar.set_prefix("Converting");
        Arc::new(Self { bar })
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_conversion_start(&self, file_name: &str, size_bytes: u64) {
        self.bar.reset();
        self.bar.enable_steady_tick(Duration::from_millis(80));
        self.bar.println(format!(
            "{} {} {}",
            cyan("◆"),
            bold(&format!("Uploading {file_name}")),
            dim(&format!("({size_bytes} bytes)"))
        ));
        self.bar.set_message("waiting for the service…");
    }

    fn on_progress(&self, percent: f64) {
        self.bar.set_position(percent.floor() as u64);
    }

    fn on_conversion_succeeded(&self, artifact: &Artifact) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} converted → {} {}",
            green("✔"),
            bold(&artifact.suggested_file_name),
            dim(&format!("({} bytes)", artifact.size_bytes))
        );
    }

    fn on_conversion_failed(&self, error: &ConversionError) {
        self.bar.finish_and_clear();
        eprintln!("{} {}", red("✘"), red(&error.message));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert next to the current directory
  pdf2xlsx invoice.pdf

  # Write the workbook into ./exports
  pdf2xlsx invoice.pdf -o exports

  # Point at a remote service
  pdf2xlsx --api-url https://pdf2xlsx.example.com statement.pdf

  # Machine-readable result
  pdf2xlsx --json invoice.pdf

  # Is the service up?
  pdf2xlsx --health

ENVIRONMENT VARIABLES:
  PDF2XLSX_API_URL   Conversion service base URL (default http://localhost:5000)
  RUST_LOG           Override log filtering (e.g. edgequake_pdf2xlsx=debug)
"#;

/// Convert the tables of a PDF into an Excel workbook.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2xlsx",
    version,
    about = "Convert PDF tables to Excel through a pdf2xlsx conversion service",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// PDF file to convert.
    #[arg(required_unless_present = "health")]
    input: Option<PathBuf>,

    /// Directory the workbook is written to.
    #[arg(short, long, env = "PDF2XLSX_OUTPUT_DIR", default_value = ".")]
    output_dir: PathBuf,

    /// Conversion service base URL.
    #[arg(long, env = "PDF2XLSX_API_URL", default_value = "http://localhost:5000")]
    api_url: String,

    /// Whole-request timeout in seconds.
    #[arg(long, env = "PDF2XLSX_TIMEOUT", default_value_t = 300)]
    timeout: u64,

    /// Print the final session state as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Disable the progress bar.
    #[arg(long, env = "PDF2XLSX_NO_PROGRESS")]
    no_progress: bool,

    /// Only check that the service answers /health.
    #[arg(long)]
    health: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2XLSX_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2XLSX_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.health;
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

    let config = ClientConfig::builder()
        .base_url(&cli.api_url)
        .request_timeout_secs(cli.timeout)
        .build()
        .context("Invalid configuration")?;
    let service = HttpConversionService::new(&config).context("Failed to set up HTTP client")?;

    // ── Health-only mode ─────────────────────────────────────────────────
    if cli.health {
        service.health().await?;
        if !cli.quiet {
            eprintln!("{} service at {} is healthy", green("✔"), bold(&cli.api_url));
        }
        return Ok(());
    }

    let Some(input) = cli.input.as_ref() else {
        bail!("No input file given");
    };

    let mut session = if show_progress {
        let cb: ProgressCallback = CliProgressCallback::new();
        Session::with_progress_callback(service, config, &cli.output_dir, cb)
    } else {
        Session::new(service, config, &cli.output_dir)
    };

    // ── Select ───────────────────────────────────────────────────────────
    let raw = RawFile::from_path(input)
        .await
        .with_context(|| format!("Failed to open {}", input.display()))?;
    let view = session.dispatch(UserIntent::FileSelected(raw)).await;
    if let Some(err) = view.selection_error {
        if cli.json {
            print_json(&session.view())?;
        }
        bail!("{}: {}", input.display(), err);
    }

    // ── Convert ──────────────────────────────────────────────────────────
    let view = session.dispatch(UserIntent::ConvertRequested).await;
    if let Some(reason) = &view.rejected {
        bail!("Conversion did not start: {reason}");
    }

    match &view.state {
        ConversionState::Succeeded { .. } => {
            let view = session.dispatch(UserIntent::DownloadRequested).await;
            let Some(path) = view.saved_to.clone() else {
                if cli.json {
                    print_json(&view)?;
                }
                bail!("Converted, but the workbook could not be written to {}", cli.output_dir.display());
            };
            if cli.json {
                print_json(&view)?;
            } else if !cli.quiet {
                eprintln!("{}  {}", green("→"), bold(&path.display().to_string()));
            }
            Ok(())
        }
        ConversionState::Failed { error } => {
            if cli.json {
                print_json(&view)?;
            }
            bail!("Conversion failed ({:?}): {}", error.kind, error.message)
        }
        other => bail!("Conversion ended in an unexpected state: {other:?}"),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialise output")?;
    println!("{json}");
    Ok(())
}
