//! CLI entry point for `mailharvest`.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use clap::{Args, CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use mailharvest::config::{self, Config};
use mailharvest::model::record::{MessageId, MessageRecord};
use mailharvest::search::{DateRange, SearchEngine, SearchOutcome, SearchRequest};
use mailharvest::session::local::{LocalConnector, LocalMailbox};
use mailharvest::session::{Connector, MailboxSession};
use mailharvest::store::attachments::delete_record_files;

#[derive(Parser)]
#[command(
    name = "mailharvest",
    version,
    about = "Find report emails by keyword, sender and date and harvest their attachments"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Mailbox directory (overrides `[account] mailbox_root`)
    #[arg(long, value_name = "DIR", global = true)]
    mailbox: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Search a folder and download matching attachments
    Search(SearchArgs),
    /// Build records for known message identifiers
    Fetch {
        #[arg(required = true)]
        ids: Vec<String>,
        #[arg(long)]
        folder: Option<String>,
        /// Keep messages without a qualifying attachment
        #[arg(long)]
        include_attachmentless: bool,
        #[arg(long, value_name = "DIR")]
        download_dir: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Move messages to another folder
    Move {
        #[arg(required = true)]
        ids: Vec<String>,
        /// Destination folder
        #[arg(long, value_name = "FOLDER")]
        to: String,
        /// Source folder
        #[arg(long)]
        folder: Option<String>,
    },
    /// Delete downloaded attachments of messages
    Clean {
        #[arg(required = true)]
        ids: Vec<String>,
        #[arg(long)]
        folder: Option<String>,
        #[arg(long, value_name = "DIR")]
        download_dir: Option<PathBuf>,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Flags for `search`. Anything left unset falls back to `[search]`.
#[derive(Args)]
struct SearchArgs {
    /// Keyword to look for (repeatable; any keyword matches, "*" matches all)
    #[arg(short, long = "keyword", value_name = "TEXT")]
    keywords: Vec<String>,
    #[arg(long)]
    folder: Option<String>,
    /// First day of the window (inclusive), YYYY-MM-DD
    #[arg(long, value_parser = parse_day)]
    since: Option<NaiveDate>,
    /// Day the window ends (exclusive), YYYY-MM-DD
    #[arg(long, value_parser = parse_day)]
    before: Option<NaiveDate>,
    /// Match keywords against the body text
    #[arg(long)]
    body: bool,
    /// Do not match keywords against the subject
    #[arg(long)]
    no_subject: bool,
    /// Match keywords against attachment file names (forces local search)
    #[arg(long)]
    attachment_name: bool,
    /// Attachment extension to keep, with the dot (repeatable; "*" keeps all)
    #[arg(short = 't', long = "filetype", value_name = "EXT")]
    filetypes: Vec<String>,
    /// Maximum number of records (0 = unlimited). Ignored with --fast,
    /// which prints every matching identifier; `fetch` applies it
    #[arg(long)]
    max: Option<usize>,
    /// Keep messages without a qualifying attachment
    #[arg(long)]
    include_attachmentless: bool,
    /// Only messages from this sender (repeatable)
    #[arg(long = "sender", value_name = "ADDRESS")]
    senders: Vec<String>,
    /// Let the server filter and print identifiers only
    #[arg(long)]
    fast: bool,
    /// recent_first or recent_last
    #[arg(long)]
    sort: Option<String>,
    /// Connection timeout in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,
    #[arg(long, value_name = "DIR")]
    download_dir: Option<PathBuf>,
    #[arg(long)]
    json: bool,
}

fn parse_day(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| format!("expected YYYY-MM-DD: {e}"))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = config::load_config();

    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    let mailbox = cli.mailbox.as_deref();

    match cli.command {
        Commands::Search(args) => cmd_search(&config, mailbox, args),
        Commands::Fetch {
            ids,
            folder,
            include_attachmentless,
            download_dir,
            json,
        } => cmd_fetch(
            &config,
            mailbox,
            &ids,
            folder,
            include_attachmentless,
            download_dir,
            json,
        ),
        Commands::Move { ids, to, folder } => cmd_move(&config, mailbox, &ids, &to, folder),
        Commands::Clean {
            ids,
            folder,
            download_dir,
        } => cmd_clean(&config, &ids, folder, download_dir),
        Commands::Completions { shell } => cmd_completions(shell),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_path = config::log_file_path(config);
    let log_dir = config::cache_dir(config);
    let file_name = log_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "mailharvest.log".into());

    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, file_name);
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        // Fall back to stderr only
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Log in to the configured mailbox.
fn open_session(
    config: &Config,
    mailbox: Option<&Path>,
    timeout: Duration,
) -> anyhow::Result<LocalMailbox> {
    let root = mailbox
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config::mailbox_root(config));
    let credential = config.account.resolve_credential()?;
    let session = LocalConnector::new(root).connect(&config.account.address, &credential, timeout)?;
    Ok(session)
}

fn engine(config: &Config, download_dir: Option<PathBuf>) -> SearchEngine {
    let root = download_dir.unwrap_or_else(|| config::download_root(config));
    SearchEngine::new(root).discard_after_parse(config.download.discard_after_parse)
}

fn progress_bar(label: &str) -> ProgressBar {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&format!(
                "{{spinner:.green}} {label} [{{bar:40.cyan/blue}}] {{pos}}/{{len}} ({{eta}})"
            ))
            .expect("valid template")
            .progress_chars("#>-"),
    );
    pb
}

fn parse_ids(ids: &[String]) -> Vec<MessageId> {
    ids.iter().map(|s| MessageId::new(s.trim())).collect()
}

/// Search a folder and print identifiers (fast path) or records.
fn cmd_search(config: &Config, mailbox: Option<&Path>, args: SearchArgs) -> anyhow::Result<()> {
    let mut request = config.search.to_request()?;
    apply_search_args(&mut request, &args)?;

    let engine = engine(config, args.download_dir);
    let mut session = open_session(config, mailbox, request.connection_timeout)?;

    let start = Instant::now();
    let pb = progress_bar("Fetching");
    let outcome = engine.search(
        &mut session,
        &request,
        Some(&|current, total| {
            pb.set_length(total as u64);
            pb.set_position(current as u64);
            true
        }),
    );
    pb.finish_and_clear();
    session.logout()?;
    let outcome = outcome?;
    tracing::info!(elapsed = ?start.elapsed(), results = outcome.len(), "Search finished");

    match outcome {
        SearchOutcome::Ids(ids) => {
            if args.json {
                print_ids_json(&request.folder, &ids)?;
            } else {
                print_ids(&ids);
            }
        }
        SearchOutcome::Records(records) => {
            if args.json {
                print_records_json(&records)?;
            } else {
                print_records_table(&records);
            }
        }
    }
    Ok(())
}

/// Command-line flags override the `[search]` defaults.
fn apply_search_args(request: &mut SearchRequest, args: &SearchArgs) -> anyhow::Result<()> {
    if !args.keywords.is_empty() {
        request.keywords = args.keywords.clone();
    }
    if let Some(ref folder) = args.folder {
        request.folder = folder.clone();
    }
    request.date_range = DateRange::new(args.since, args.before);
    if args.body {
        request.search_body = true;
    }
    if args.no_subject {
        request.search_subject = false;
    }
    if args.attachment_name {
        request.search_attachment_name = true;
    }
    if !args.filetypes.is_empty() {
        request.attachment_file_types = args.filetypes.clone();
    }
    if let Some(max) = args.max {
        request.max_results = max;
    }
    if args.include_attachmentless {
        request.include_attachmentless = true;
    }
    if !args.senders.is_empty() {
        request.sender_filter = args.senders.clone();
    }
    if args.fast {
        request.accurate_search = false;
    }
    if let Some(ref sort) = args.sort {
        request.sort_direction = sort.parse()?;
    }
    if let Some(secs) = args.timeout {
        request.connection_timeout = Duration::from_secs(secs);
    }
    Ok(())
}

/// Materialize records for explicit identifiers.
fn cmd_fetch(
    config: &Config,
    mailbox: Option<&Path>,
    ids: &[String],
    folder: Option<String>,
    include_attachmentless: bool,
    download_dir: Option<PathBuf>,
    json: bool,
) -> anyhow::Result<()> {
    let mut request = config.search.to_request()?;
    if let Some(folder) = folder {
        request.folder = folder;
    }
    if include_attachmentless {
        request.include_attachmentless = true;
    }

    let engine = engine(config, download_dir);
    let mut session = open_session(config, mailbox, request.connection_timeout)?;
    let ids = parse_ids(ids);

    let pb = progress_bar("Fetching");
    let records = engine.retrieve(
        &mut session,
        &request,
        &ids,
        Some(&|current, total| {
            pb.set_length(total as u64);
            pb.set_position(current as u64);
            true
        }),
    );
    pb.finish_and_clear();
    session.logout()?;
    let records = records?;

    if json {
        print_records_json(&records)?;
    } else {
        print_records_table(&records);
    }
    Ok(())
}

/// Move messages, highest identifier first: expunging renumbers the
/// messages after the removed one on sequence-number servers.
fn cmd_move(
    config: &Config,
    mailbox: Option<&Path>,
    ids: &[String],
    destination: &str,
    folder: Option<String>,
) -> anyhow::Result<()> {
    let folder = folder.unwrap_or_else(|| config.search.folder.clone());
    let timeout = Duration::from_secs(config.search.connection_timeout_secs);
    let mut session = open_session(config, mailbox, timeout)?;
    session.select_folder(&folder)?;

    let mut ids = parse_ids(ids);
    ids.sort_by_key(|id| std::cmp::Reverse(id.as_str().parse::<u64>().unwrap_or(0)));

    for id in &ids {
        session.move_message(id, destination)?;
        println!("  Moved {id} from {folder} to {destination}");
    }
    session.logout()?;
    Ok(())
}

/// Delete the attachment directories of the given messages.
fn cmd_clean(
    config: &Config,
    ids: &[String],
    folder: Option<String>,
    download_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    let folder = folder.unwrap_or_else(|| config.search.folder.clone());
    let root = download_dir.unwrap_or_else(|| config::download_root(config));
    for id in parse_ids(ids) {
        delete_record_files(&root, &folder, &id)?;
    }
    println!("  Cleaned {} message(s) under {}", ids.len(), root.join(&folder).display());
    Ok(())
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mailharvest", &mut std::io::stdout());
    Ok(())
}

fn print_ids(ids: &[MessageId]) {
    println!();
    println!("  {} match(es)", ids.len());
    if !ids.is_empty() {
        let joined: Vec<&str> = ids.iter().map(MessageId::as_str).collect();
        println!("  {}", joined.join(" "));
    }
    println!();
}

fn print_ids_json(folder: &str, ids: &[MessageId]) -> anyhow::Result<()> {
    let output = serde_json::json!({
        "folder": folder,
        "result_count": ids.len(),
        "ids": ids,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Total size on disk of a record's attachments (discarded files count 0).
fn attachment_bytes(record: &MessageRecord) -> u64 {
    record
        .attachments
        .iter()
        .filter_map(|a| std::fs::metadata(&a.path).ok())
        .map(|m| m.len())
        .sum()
}

/// Print records as a human-readable table.
fn print_records_table(records: &[MessageRecord]) {
    use humansize::{format_size, BINARY};

    println!();
    println!("  {} record(s)", records.len());
    println!();

    if records.is_empty() {
        return;
    }

    println!(
        "  {:<6} {:<17} {:<25} {:<40} {:>5} {:>8}",
        "ID", "Date", "From", "Subject", "Files", "Size"
    );
    println!("  {}", "-".repeat(106));

    for record in records {
        let date = record
            .received_at
            .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        let from: String = record.sender.as_deref().unwrap_or("").chars().take(24).collect();
        let subject: String = record.subject.as_deref().unwrap_or("").chars().take(39).collect();
        let size = format_size(attachment_bytes(record), BINARY);

        println!(
            "  {:<6} {:<17} {:<25} {:<40} {:>5} {:>8}",
            record.id,
            date,
            from,
            subject,
            record.attachments.len(),
            size
        );
        for attachment in &record.attachments {
            let rows = record
                .tables
                .get(&attachment.name)
                .map(|t| format!(" ({} rows)", t.len()))
                .unwrap_or_default();
            println!("         {}{}", attachment.path.display(), rows);
        }
    }
    println!();
}

/// Print records as JSON.
fn print_records_json(records: &[MessageRecord]) -> anyhow::Result<()> {
    let items: Vec<serde_json::Value> = records
        .iter()
        .map(|r| {
            serde_json::json!({
                "id": r.id,
                "folder": r.folder,
                "sender": r.sender,
                "subject": r.subject,
                "received_at": r.received_at.map(|d| d.to_rfc3339()),
                "body_text": r.body_text,
                "attachments": r.attachments.iter().map(|a| serde_json::json!({
                    "name": a.name,
                    "path": a.path.to_string_lossy(),
                })).collect::<Vec<_>>(),
                "tables": r.tables,
            })
        })
        .collect();

    let output = serde_json::json!({
        "result_count": records.len(),
        "results": items,
    });

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
