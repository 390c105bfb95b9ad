// Main entry point
use clap::Parser;
use colored::Colorize;
use phishguard::application::session::apply_side_effects;
use phishguard::domain::model::ClassificationResult;
use phishguard::domain::normalize::normalize_url;
use phishguard::domain::traits::Notifier;
use phishguard::infrastructure::config::{self, load_config};
use phishguard::infrastructure::storage::{cache, history};
use phishguard::interfaces::cli::{Cli, Command};
use phishguard::presentation::render::{format_history, format_result};
use phishguard::presentation::theme::Theme;
use phishguard::state::AppState;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;

/// Prints high-risk alerts to stderr as they happen
struct ConsoleNotifier {
    enable_emoji: bool,
}

impl Notifier for ConsoleNotifier {
    fn notify_high_risk(&self, url: &str, confidence: f64) {
        tracing::warn!("High-risk site: {} ({:.2})", url, confidence);
        let prefix = if self.enable_emoji { "🚨 " } else { "" };
        eprintln!(
            "{}",
            format!(
                "{}Phishing alert: high-risk site {} (confidence {:.2}%)",
                prefix,
                url,
                confidence * 100.0
            )
            .red()
            .bold()
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Setup graceful shutdown handler
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            eprintln!("Failed to listen for shutdown signal: {}", e);
        } else {
            eprintln!("\nInterrupted, shutting down...");
            let _ = shutdown_tx.send(());
        }
    });

    let cli = Cli::parse();
    let config = load_config()?;

    if config.logging.enable {
        init_logging(&config.logging)?;
    }

    let command = match cli.command {
        Command::GenerateConfig => {
            config::generate_config_sample()?;
            return Ok(());
        }
        command => command,
    };

    let history_db = if config.history.enable {
        let path = config::get_history_path(&config);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Some(history::init_history(&path).await?)
    } else {
        None
    };

    let enable_emoji = config.enable_emoji;
    let notifier = Arc::new(ConsoleNotifier { enable_emoji });
    let state = AppState::new(config.clone(), notifier, history_db)?;

    let _sweeper = config
        .cache
        .sweep_interval()
        .map(|every| cache::spawn_sweeper(&state.cache, every));

    let theme = Theme::from_name(cli.theme.as_deref().unwrap_or(""));

    match command {
        Command::Check { urls } => {
            check(&state, &urls, &theme, cli.json, enable_emoji).await?;
        }
        Command::Scan { urls } => {
            tokio::select! {
                result = scan(&state, urls, &theme, cli.json, enable_emoji) => {
                    result?;
                }
                _ = shutdown_rx => {
                    eprintln!("Scan interrupted");
                }
            }
        }
        Command::Report { url } => {
            let url = normalize_url(&url)?;
            state.client.report_url(&url).await?;
            println!("{}", format!("Reported {} to the community database", url).green());
        }
        Command::Feedback(args) => {
            state.feedback(&args.url, args.phishing).await?;
            let label = if args.phishing { "phishing" } else { "safe" };
            println!("{}", format!("Feedback saved: {} is {}", args.url, label).green());
        }
        Command::History { limit } => match &state.history {
            Some(db) => {
                let records = history::recent(db, limit).await?;
                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&records)?);
                } else if records.is_empty() {
                    println!("No detections recorded yet");
                } else {
                    print!("{}", format_history(&records, &theme));
                }
            }
            None => eprintln!("{}", "History is disabled in the config".yellow()),
        },
        Command::Status => print_status(&state).await?,
        Command::GenerateConfig => {}
    }

    Ok(())
}

/// Initialize logging with path and level configuration
fn init_logging(logging: &config::Logging) -> anyhow::Result<()> {
    use tracing_subscriber::EnvFilter;

    let level = match logging.level.as_str() {
        "DEBUG" => "debug",
        "INFO" => "info",
        "WARN" => "warn",
        "ERROR" => "error",
        _ => "warn",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if let Some(path) = &logging.path {
        if !path.is_empty() {
            // Log to file
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(file)
                .init();
            return Ok(());
        }
    }

    // Log to stderr (default)
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

fn print_one(url: &str, result: &ClassificationResult, theme: &Theme, json: bool, emoji: bool) {
    if json {
        let line = serde_json::json!({ "url": url, "result": result });
        println!("{}", line);
    } else {
        print!("{}", format_result(url, result, theme, emoji));
    }
}

/// Resolve right away. There is no scheduler here, so rate-limited URLs are
/// only reported; `scan` is the path that requeues them.
async fn check(
    state: &AppState,
    urls: &[String],
    theme: &Theme,
    json: bool,
    emoji: bool,
) -> anyhow::Result<()> {
    let resolution = state.orchestrator.resolve_batch(urls).await;
    let retry = apply_side_effects(&state.deps(), &resolution).await;

    let mut seen = HashSet::new();
    for url in urls {
        if !seen.insert(url.as_str()) {
            continue;
        }
        if let Some(outcome) = resolution.outcomes.get(url) {
            print_one(url, outcome.result(), theme, json, emoji);
        }
    }

    if !retry.is_empty() && !json {
        let after = retry.iter().map(|(_, d)| *d).max().unwrap_or_default();
        eprintln!(
            "{}",
            format!(
                "{} URL(s) rate limited; try again in {}s",
                retry.len(),
                after.as_secs()
            )
            .yellow()
        );
    }
    Ok(())
}

async fn read_stdin_urls() -> anyhow::Result<Vec<String>> {
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    let mut urls = Vec::new();
    while let Some(line) = lines.next_line().await? {
        urls.push(line);
    }
    Ok(urls)
}

async fn scan(
    state: &AppState,
    urls: Vec<String>,
    theme: &Theme,
    json: bool,
    emoji: bool,
) -> anyhow::Result<()> {
    let urls = if urls.is_empty() {
        read_stdin_urls().await?
    } else {
        urls
    };

    // Only absolute web links are worth a check; reports use the normalized form
    let mut seen = HashSet::new();
    let mut expected = HashSet::new();
    let mut to_submit = Vec::new();
    for raw in urls.iter().filter(|u| !u.trim().is_empty()) {
        let url = match normalize_url(raw) {
            Ok(url) => url,
            Err(e) => {
                tracing::debug!("Not scanning {}", e);
                continue;
            }
        };
        if !seen.insert(url.clone()) {
            continue;
        }
        // Cached URLs never reach the scheduler, answer them up front
        match state.cache.lookup(&url) {
            Some(result) => print_one(&url, &result, theme, json, emoji),
            None => {
                expected.insert(url.clone());
                to_submit.push(url);
            }
        }
    }

    if expected.is_empty() {
        return Ok(());
    }

    let mut session = state.new_session().await;
    tracing::info!("Scanning {} URL(s) in session {}", expected.len(), session.id());
    session.submit(to_submit)?;

    while !expected.is_empty() {
        let Some(report) = session.next_report().await else {
            break;
        };
        for (url, result) in &report.results {
            print_one(url, result, theme, json, emoji);
            // Rate-limited URLs come back in a later batch
            if !report.retrying.contains(url) {
                expected.remove(url);
            }
        }
    }

    session.close().await;
    Ok(())
}

async fn print_status(state: &AppState) -> anyhow::Result<()> {
    println!("{}", "phishguard Status".green().bold());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config = state.config.read().await;
    println!("Scoring service: {}", config.service.endpoint);
    println!(
        "Heavy model (BERT): {}",
        if config.service.use_bert { "enabled" } else { "disabled" }
    );
    println!(
        "Rate limit: {} checks / {}s per URL",
        config.rate_limit.max_requests, config.rate_limit.window_secs
    );
    println!(
        "Batching: {} URL(s) per batch, {}ms quiet period",
        config.scheduler.max_batch_size, config.scheduler.batch_delay_ms
    );

    println!("Memory Cache: {} entries", state.cache.len());
    println!("Rate windows: {} URL(s) tracked", state.limiter.tracked());

    match &state.history {
        Some(db) => {
            let count = history::count(db).await?;
            println!(
                "History: {} ({} records)",
                config::get_history_path(&config).display(),
                count
            );
        }
        None => println!("History: disabled"),
    }

    println!(
        "Config: {}",
        config::get_config_path()
            .filter(|p| p.exists())
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "Not found (using defaults)".to_string())
    );

    Ok(())
}
