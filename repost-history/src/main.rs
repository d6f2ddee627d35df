use anyhow::{Context, Result};
use clap::Parser;
use librepost::config::{DEFAULT_HISTORY_FILE, ENV_HISTORY_FILE};
use librepost::HistoryStore;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "repost-history")]
#[command(version, about = "Inspect the repost history file")]
#[command(long_about = r#"Inspect the history of posts the bot has already reposted.

EXAMPLES:
    # List every reposted id, oldest first
    repost-history

    # Only the ten most recent reposts
    repost-history --limit 10

    # Read a specific history file
    repost-history --file ./state/posted_history.json

    # JSON output for scripting
    repost-history --format json | jq 'length'

    # Has this post been reposted already?
    repost-history --check 1790000000000000001 && echo "already reposted"

OUTPUT FORMATS:
    text - One line per repost: position, post id, link (default)
    json - JSON array of {position, id, url} objects

EXIT CODES:
    0 - Success (including an empty history); with --check, the id is present
    1 - Error (unreadable or corrupt file); with --check, the id is absent
    2 - Invalid command-line arguments
"#)]
struct Args {
    /// History file (defaults to HISTORY_FILE or posted_history.json)
    #[arg(short, long, value_name = "PATH")]
    file: Option<String>,

    /// Output format
    #[arg(long, value_name = "FORMAT", default_value = "text")]
    #[arg(value_parser = ["text", "json"])]
    format: String,

    /// Only show the most recent N entries
    #[arg(short = 'n', long, value_name = "N")]
    limit: Option<usize>,

    /// Exit 0 if this post id is in the history, 1 otherwise
    #[arg(long, value_name = "ID", conflicts_with_all = ["format", "limit"])]
    check: Option<String>,
}

#[derive(Debug, Serialize)]
struct HistoryEntry {
    position: usize,
    id: String,
    url: String,
}

fn main() {
    dotenv::dotenv().ok();
    let args = Args::parse();

    match run(args) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn run(args: Args) -> Result<i32> {
    let path = resolve_path(args.file.as_deref());
    let history = HistoryStore::load(&path)
        .with_context(|| format!("Could not load history from {}", path.display()))?;

    if let Some(id) = args.check {
        let id = id.trim();
        return Ok(if history.contains(id) { 0 } else { 1 });
    }

    let entries = entries(&history, args.limit);
    match args.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&entries)?),
        _ => print!("{}", format_text(&entries)),
    }
    Ok(0)
}

fn resolve_path(file: Option<&str>) -> PathBuf {
    let raw = file
        .map(str::to_string)
        .or_else(|| std::env::var(ENV_HISTORY_FILE).ok().filter(|v| !v.trim().is_empty()))
        .unwrap_or_else(|| DEFAULT_HISTORY_FILE.to_string());
    PathBuf::from(shellexpand::tilde(raw.trim()).to_string())
}

fn entries(history: &HistoryStore, limit: Option<usize>) -> Vec<HistoryEntry> {
    let ids = history.ids();
    let skip = limit.map_or(0, |n| ids.len().saturating_sub(n));
    ids.iter()
        .enumerate()
        .skip(skip)
        .map(|(i, id)| HistoryEntry {
            position: i + 1,
            id: id.clone(),
            url: format!("https://x.com/i/status/{}", id),
        })
        .collect()
}

fn format_text(entries: &[HistoryEntry]) -> String {
    if entries.is_empty() {
        return "No reposts recorded\n".to_string();
    }
    let width = entries.last().map_or(1, |e| e.position.to_string().len());
    entries
        .iter()
        .map(|e| format!("{:>width$}  {}  {}\n", e.position, e.id, e.url, width = width))
        .collect()
}
