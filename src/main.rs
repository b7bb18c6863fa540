//! itascholar - resumable Google Scholar harvester
//!
//! Collects papers on language assessment of International Teaching
//! Assistants one chunk at a time. Re-running the same command continues
//! where the previous run stopped.
//!
//! ## Usage
//!
//! ```bash
//! itascholar --chunk-size 50 --max-results 1000
//! itascholar --backend browser        # solve CAPTCHAs in a Chrome window
//! itascholar --reset --test           # start over, 10 results only
//! ```

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use itascholar::config::{KeywordConfig, RunLimits, DEFAULT_MAX_RESULTS, TEST_MODE_LIMIT};
use itascholar::fetch::{Pacing, StopReason};
use itascholar::output::OutputPaths;
use itascholar::session::{PendingRun, Plan, RunSummary, Session, SessionConfig};
use itascholar::source::http::{HttpOptions, HttpSource};
use itascholar::ScholarError;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, EnvFilter};

// ============================================================================
// CLI Definition
// ============================================================================

/// Resumable Google Scholar harvester for ITA language-assessment literature
#[derive(Parser)]
#[command(name = "itascholar")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Results to collect in this run (default: 50 http, 100 browser)
    #[arg(short, long, allow_negative_numbers = true)]
    chunk_size: Option<i64>,

    /// Total results to collect across all runs
    #[arg(short, long, default_value_t = DEFAULT_MAX_RESULTS as i64, allow_negative_numbers = true)]
    max_results: i64,

    /// Minimum delay between results, in seconds
    #[arg(long, allow_negative_numbers = true)]
    min_delay: Option<f64>,

    /// Maximum delay between results, in seconds
    #[arg(long, allow_negative_numbers = true)]
    max_delay: Option<f64>,

    /// Delete the checkpoint and all outputs, then start over
    #[arg(long)]
    reset: bool,

    /// Collect at most 10 results
    #[arg(long)]
    test: bool,

    /// Run Chrome without a window (CAPTCHAs cannot be solved)
    #[arg(long)]
    headless: bool,

    /// Result backend
    #[arg(long, value_enum, default_value_t = Backend::Http)]
    backend: Backend,

    /// JSON file with ita_keywords, assessment_keywords and exclusions
    #[arg(long)]
    keywords: Option<PathBuf>,

    /// Keep every result, even if it does not mention both keyword groups
    #[arg(long)]
    no_keyword_filter: bool,

    /// Directory for the checkpoint and output files
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Proxy URL (e.g., http://127.0.0.1:7890)
    #[arg(long)]
    proxy: Option<String>,

    /// Mirror site URL
    #[arg(long)]
    mirror: Option<String>,

    /// Cookie file (default: ~/.gscholar_cookies.json)
    #[arg(long)]
    cookies: Option<PathBuf>,

    /// Seconds to wait for a CAPTCHA to be solved
    #[arg(long, default_value_t = 300)]
    captcha_timeout: u64,

    /// Chrome or Chromium binary
    #[arg(long)]
    chrome: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// Plain HTTP requests; rate limits abort the run
    Http,
    /// Chrome window with manual CAPTCHA solving
    Browser,
}

impl Backend {
    fn default_chunk_size(self) -> usize {
        match self {
            Backend::Http => 50,
            Backend::Browser => 100,
        }
    }

    fn default_delays(self) -> (f64, f64) {
        match self {
            Backend::Http => (0.5, 1.3),
            Backend::Browser => (3.0, 7.0),
        }
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .init();

    run(cli).await
}

async fn run(cli: Cli) -> Result<()> {
    let limits = run_limits(&cli)?;

    if cli.test {
        println!("*** TEST MODE: collecting at most {} results ***", TEST_MODE_LIMIT);
    }

    if cli.headless {
        if cli.backend == Backend::Browser {
            println!("WARNING: headless mode is on. CAPTCHAs cannot be solved and the run");
            println!("will stop at the first challenge. Continuing in 3 seconds...");
            tokio::time::sleep(Duration::from_secs(3)).await;
        } else {
            println!("Note: --headless only applies to the browser backend.");
        }
    }

    let keywords = match &cli.keywords {
        Some(path) => KeywordConfig::from_file(path)
            .with_context(|| format!("Failed to load keywords from {}", path.display()))?,
        None => KeywordConfig::default(),
    };

    std::fs::create_dir_all(&cli.output_dir).context("Failed to create output directory")?;

    let session = Session::new(SessionConfig {
        keywords,
        chunk_size: limits.chunk_size,
        max_results: limits.max_results,
        pacing: Pacing::new(limits.min_delay(), limits.max_delay()),
        keyword_filter: !cli.no_keyword_filter,
        reset: cli.reset,
        paths: OutputPaths::in_dir(&cli.output_dir),
    });

    print_configuration(&cli, &limits, session.query());

    let pending = match session.plan()? {
        Plan::Fetch(pending) => pending,
        Plan::NothingRemaining { next_index } => {
            println!(
                "No remaining results to collect (next index {} exceeds max results {}).",
                next_index, limits.max_results
            );
            return Ok(());
        }
    };

    if pending.resumed {
        println!("Resuming from paper #{}", pending.request.start);
    }

    let outcome = match cli.backend {
        Backend::Http => run_http(&cli, &session, pending).await,
        Backend::Browser => run_browser(&cli, &session, pending).await?,
    };

    let summary = match outcome {
        Ok(summary) => summary,
        Err(e) if e.is_rate_limit() => {
            error!("{}", e);
            println!("\nGoogle Scholar is rate limiting this connection.");
            println!("Switch VPN/proxy and retry the same chunk later; nothing was written.");
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };

    print_summary(&summary, &session);
    Ok(())
}

fn run_limits(cli: &Cli) -> Result<RunLimits> {
    let (default_min, default_max) = cli.backend.default_delays();

    let limits = RunLimits {
        chunk_size: to_count(
            cli.chunk_size.unwrap_or(cli.backend.default_chunk_size() as i64),
            "Chunk size",
        )?,
        max_results: to_count(cli.max_results, "Max results")?,
        min_delay: cli.min_delay.unwrap_or(default_min),
        max_delay: cli.max_delay.unwrap_or(default_max),
    };
    limits.validate()?;

    Ok(if cli.test {
        limits.into_test_mode()
    } else {
        limits
    })
}

fn to_count(value: i64, name: &str) -> Result<usize> {
    usize::try_from(value)
        .map_err(|_| ScholarError::Validation(format!("{} must be a positive integer.", name)).into())
}

// ============================================================================
// Backends
// ============================================================================

async fn run_http(
    cli: &Cli,
    session: &Session,
    pending: PendingRun,
) -> itascholar::Result<RunSummary> {
    let options = HttpOptions {
        proxy: cli.proxy.clone(),
        base_url: cli.mirror.clone(),
        cookie_path: cli.cookies.clone(),
        no_page_delay: false,
    };
    let mut source = HttpSource::new(session.query(), &options)?;
    session.execute(pending, &mut source).await
}

#[cfg(feature = "browser")]
async fn run_browser(
    cli: &Cli,
    session: &Session,
    pending: PendingRun,
) -> Result<itascholar::Result<RunSummary>> {
    use itascholar::captcha::CaptchaGate;
    use itascholar::source::browser::{BrowserOptions, BrowserSource};

    let options = BrowserOptions {
        headless: cli.headless,
        chrome_path: cli.chrome.clone(),
        captcha: CaptchaGate::new(Duration::from_secs(cli.captcha_timeout)),
        cookie_path: cli.cookies.clone(),
    };

    let mut source = BrowserSource::launch(session.query(), options).await?;
    let outcome = session.execute(pending, &mut source).await;

    if let Err(e) = source.close().await {
        error!("{}", e);
    }
    Ok(outcome)
}

#[cfg(not(feature = "browser"))]
async fn run_browser(
    _cli: &Cli,
    _session: &Session,
    _pending: PendingRun,
) -> Result<itascholar::Result<RunSummary>> {
    anyhow::bail!("This build has no browser backend; rebuild with `--features browser`")
}

// ============================================================================
// Console output
// ============================================================================

fn print_configuration(cli: &Cli, limits: &RunLimits, query: &str) {
    let rule = "=".repeat(80);
    println!("\n{}", rule);
    println!("GOOGLE SCHOLAR SEARCH - ITA LANGUAGE ASSESSMENT");
    println!("{}", rule);
    println!("Backend: {:?}", cli.backend);
    println!("Chunk size: {}", limits.chunk_size);
    println!("Max results: {}", limits.max_results);
    println!("Delay: {:.1}-{:.1} seconds", limits.min_delay, limits.max_delay);
    println!("Keyword filter: {}", if cli.no_keyword_filter { "off" } else { "on" });
    println!("Output directory: {}", cli.output_dir.display());
    println!("Query: {}", query);
    println!("{}\n", rule);
}

fn print_summary(summary: &RunSummary, session: &Session) {
    let rule = "=".repeat(80);
    let paths = &session.config().paths;

    println!("\n{}", rule);
    println!("SESSION SUMMARY");
    println!("{}", rule);
    println!("New papers this run: {}", summary.new_papers);
    println!("Total papers stored: {}", summary.total_papers);

    match summary.stop {
        StopReason::CaptchaTimedOut => {
            println!("Stopped early: CAPTCHA was not solved in time.");
        }
        StopReason::Exhausted => println!("Google Scholar has no further results."),
        StopReason::Filled | StopReason::EmptyRange => {}
    }

    if summary.completed {
        println!("Collection complete. Use --reset to start a new search.");
    } else {
        println!("Next run resumes at paper #{}", summary.next_index);
    }

    println!("\nFiles:");
    println!("  {}", paths.json.display());
    println!("  {}", paths.csv.display());
    println!("  {}", paths.report.display());
    println!("  {}", paths.checkpoint.display());
    println!("{}", rule);

    info!(
        new = summary.new_papers,
        total = summary.total_papers,
        next_index = summary.next_index,
        "Run finished"
    );
}
