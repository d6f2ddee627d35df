//! repost-run - one scheduled repost run
//!
//! Meant to be invoked by a scheduler (cron, CI). Polls the configured
//! source accounts, reposts what has not been reposted yet, and exits.

use chrono::Utc;
use clap::Parser;
use librepost::logging::{LogFormat, LoggingConfig};
use librepost::platforms::x::XClient;
use librepost::poster::RunPlan;
use librepost::scheduling::{accounts_for_run, startup_jitter};
use librepost::{Config, CursorStore, HistoryStore, RepostError, RepostRunner, Result};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "repost-run")]
#[command(version)]
#[command(about = "Repost new posts from the configured source accounts")]
#[command(long_about = "\
repost-run - Repost new posts from the configured source accounts

DESCRIPTION:
    Fetches the most recent posts of each source account, skips everything
    already listed in the history file, reposts up to the quota, and
    records each confirmed repost in the history file.

    A run is short-lived and meant to be started by a scheduler. Failed
    reposts are not recorded, so the next run tries them again.

USAGE:
    # Normal scheduled run
    repost-run

    # See what would be reposted without reposting
    repost-run --dry-run --no-jitter

    # Repost up to three posts this time
    repost-run --quota 3

CONFIGURATION:
    Settings are read from the environment (a .env file in the working
    directory is loaded first). Non-secret settings may also live in a TOML
    file named by REPOST_CONFIG.

    X_CONSUMER_KEY       API key of the X app (required)
    X_CONSUMER_SECRET    API key secret of the X app (required)
    X_ACCESS_TOKEN       Access token of the bot account (required)
    X_ACCESS_SECRET      Access token secret of the bot account (required)
    X_BEARER_TOKEN       App-only token used for reads (optional)
    SOURCE_USERNAMES     Comma-separated source handles (required)
    REPOST_QUOTA         Reposts per run (default: 1)
    MAX_TWEETS_TO_FETCH  Posts fetched per account (default: 10)
    HISTORY_FILE         History path (default: posted_history.json)
    SINCE_FILE           Per-account since_id cursor file (optional)
    ROTATION_SLOTS       Poll one account per slot of the day (default: 0, all)
    REQUIRE_MEDIA        Only repost posts with photos (default: false)
    INCLUDE_REPOSTS      Allow reposting reposts (default: false)
    STARTUP_JITTER       Random delay before starting (default: 8s)
    MAX_RETRIES          Retries for transient API errors (default: 4)
    RATE_LIMIT_MAX_WAIT  Longest wait for a rate limit reset (default: 15m)
    REQUEST_TIMEOUT      HTTP timeout (default: 30s)
    REPOST_LOG_FORMAT    text, json or pretty (default: text)
    REPOST_LOG_LEVEL     error, warn, info, debug, trace (default: info)

EXIT CODES:
    0 - Success, nothing to repost, or some reposts succeeded
    1 - Posts were selected but none could be reposted, or a runtime error
    2 - Configuration or authentication error
    3 - Invalid command-line input
")]
struct Cli {
    /// Maximum reposts this run (overrides REPOST_QUOTA)
    #[arg(long, value_name = "N")]
    quota: Option<usize>,

    /// Select and log, but do not repost or write any state
    #[arg(long)]
    dry_run: bool,

    /// Start immediately instead of waiting a random delay
    #[arg(long)]
    no_jitter: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Log format: text, json or pretty (overrides REPOST_LOG_FORMAT)
    #[arg(long, value_name = "FORMAT")]
    log_format: Option<LogFormat>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    dotenv::dotenv().ok();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if e.use_stderr() => {
            let _ = e.print();
            std::process::exit(RepostError::InvalidInput(e.to_string()).exit_code());
        }
        // --help and --version
        Err(e) => e.exit(),
    };

    LoggingConfig::from_env(cli.log_format, cli.verbose).init();

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    let mut config = Config::load()?;
    if let Some(quota) = cli.quota {
        config.quota = quota;
    }

    if !cli.no_jitter {
        let delay = startup_jitter(config.startup_jitter);
        if !delay.is_zero() {
            info!("Waiting {:?} before starting", delay);
            tokio::time::sleep(delay).await;
        }
    }

    let accounts = accounts_for_run(&config.sources, config.rotation, Utc::now());
    info!(
        "Polling {} of {} source account(s) ({}), quota {}{}",
        accounts.len(),
        config.sources.len(),
        config.rotation,
        config.quota,
        if cli.dry_run { ", dry run" } else { "" }
    );

    let mut history = HistoryStore::load_or_empty(&config.history_file);
    let mut cursors = match &config.cursor_file {
        Some(path) => CursorStore::load_or_empty(path),
        None => CursorStore::new(),
    };

    let platform = XClient::from_config(&config)?;
    let mut runner = RepostRunner::new(Box::new(platform))
        .with_retry(config.retry.clone())
        .with_filter(config.filter)
        .dry_run(cli.dry_run);
    if !cli.dry_run {
        runner = runner.persist_history_to(config.history_file.clone());
    }

    let plan = RunPlan {
        accounts,
        fetch_limit: config.fetch_limit,
        quota: config.quota,
        use_cursors: config.cursor_file.is_some(),
    };
    let report = runner.run(&plan, &mut history, &mut cursors).await?;

    if !cli.dry_run {
        history.save(&config.history_file)?;
        if let Some(path) = &config.cursor_file {
            cursors.save(path)?;
        }
    }

    for (handle, error) in &report.fetch_failures {
        warn!("Skipped @{}: {}", handle, error);
    }
    for (id, error) in &report.failed {
        warn!("Not reposted {}: {}", id, error);
    }
    info!(
        "Run {}: {} candidate(s), {} eligible, {} selected, {} reposted, {} failed",
        report.status(),
        report.candidates,
        report.eligible,
        report.selected,
        report.reposted.len(),
        report.failed.len()
    );

    Ok(report.exit_code())
}
