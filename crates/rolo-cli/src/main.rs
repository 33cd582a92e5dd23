//! Rolo CLI - Command-line interface for the Rolo contact manager
//!
//! Capture contacts from the terminal, inspect duplicate suggestions, merge
//! records, and drive the sync queue against the Rolo server.

use std::env;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use clap::{CommandFactory, Parser, Subcommand};
use rolo_core::config::Config;
use rolo_core::dedupe::{find_duplicate_groups, merge_contacts, DuplicateGroup, SUGGEST_MIN_SCORE};
use rolo_core::models::{EntityKind, HttpMethod, MergeRecord, SyncAction, SyncStatus, TimelineEntry};
use rolo_core::session::{run_periodic_drain, start_session, AUTO_DRAIN_INTERVAL};
use rolo_core::sync::{endpoints, HttpTransport, SyncQueue};
use rolo_core::{Contact, Store};
use thiserror::Error;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "rolo")]
#[command(about = "Manage contacts captured from business cards")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Optional path to local database file
    #[arg(long, value_name = "PATH")]
    db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture a new contact
    #[command(alias = "new")]
    Add {
        /// Contact name
        name: Vec<String>,
        #[arg(long)]
        company: Option<String>,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// List contacts, most recently updated first
    List {
        /// Number of contacts to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a single contact in full
    Show {
        /// Contact ID or unique ID prefix
        id: String,
    },
    /// Suggest likely duplicate contacts
    Dupes {
        /// Minimum confidence score (0-100)
        #[arg(long, default_value_t = SUGGEST_MIN_SCORE)]
        min_score: u8,
        /// Number of groups to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Merge a duplicate contact into a primary one
    Merge {
        /// Surviving contact ID or unique ID prefix
        primary: String,
        /// Duplicate contact ID or unique ID prefix
        duplicate: String,
    },
    /// Inspect or manage the pending mutation queue
    Queue {
        #[command(subcommand)]
        command: QueueCommands,
    },
    /// Drain the pending mutation queue against the server
    Sync,
    /// Run the full session-start sequence (migrate, sync, hydrate)
    Up {
        /// Keep running and drain the queue periodically
        #[arg(long)]
        watch: bool,
    },
}

#[derive(Subcommand)]
enum QueueCommands {
    /// Show queued and failed mutations
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Reset failed mutations for another round of retries
    Retry,
    /// Drop a mutation from the queue
    Dismiss {
        /// Queue item ID
        id: String,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Core(#[from] rolo_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("No contact name provided")]
    EmptyName,
    #[error("Contact not found for id/prefix: {0}")]
    ContactNotFound(String),
    #[error("{0}")]
    AmbiguousContactId(String),
    #[error("Cannot merge a contact into itself")]
    MergeSelf,
    #[error("Queue item not found: {0}")]
    QueueItemNotFound(String),
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rolo=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);

    match cli.command {
        Some(Commands::Add {
            name,
            company,
            title,
            email,
            phone,
            notes,
        }) => run_add(&name, company, title, email, phone, notes, &db_path)?,
        Some(Commands::List { limit, json }) => run_list(limit, json, &db_path)?,
        Some(Commands::Show { id }) => run_show(&id, &db_path)?,
        Some(Commands::Dupes {
            min_score,
            limit,
            json,
        }) => run_dupes(min_score, limit, json, &db_path)?,
        Some(Commands::Merge { primary, duplicate }) => run_merge(&primary, &duplicate, &db_path)?,
        Some(Commands::Queue { command }) => match command {
            QueueCommands::Status { json } => run_queue_status(json, &db_path)?,
            QueueCommands::Retry => run_queue_retry(&db_path)?,
            QueueCommands::Dismiss { id } => run_queue_dismiss(&id, &db_path)?,
        },
        Some(Commands::Sync) => run_sync(&db_path).await?,
        Some(Commands::Up { watch }) => run_up(watch, &db_path).await?,
        None => {
            Cli::command().print_help().map_err(CliError::Io)?;
            println!();
        }
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_add(
    name_parts: &[String],
    company: Option<String>,
    title: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    notes: Option<String>,
    db_path: &Path,
) -> Result<(), CliError> {
    let name = normalize_name_input(&name_parts.join(" ")).ok_or(CliError::EmptyName)?;

    let store = open_store(db_path)?;
    let mut contact = Contact::new(name);
    contact.company = company;
    contact.title = title;
    contact.email = email;
    contact.phone = phone;
    contact.notes = notes;
    contact.timeline.push(TimelineEntry {
        id: Uuid::now_v7().to_string(),
        kind: "captured".to_string(),
        summary: "Captured from command line".to_string(),
        timestamp: Utc::now().timestamp_millis(),
    });

    let mut contacts = store.contacts();
    contacts.push(contact.clone());
    store.save_contacts(&contacts)?;

    let queue = SyncQueue::new(&store);
    queue.enqueue(
        EntityKind::Contact,
        SyncAction::Create,
        endpoints::CONTACTS_UPSERT,
        HttpMethod::Post,
        serde_json::to_value(&contact)?,
    )?;

    println!("{}", contact.id);
    Ok(())
}

fn run_list(limit: usize, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path)?;
    let mut contacts = store.contacts();
    contacts.sort_by_key(|contact| std::cmp::Reverse(contact.updated_at));
    contacts.truncate(limit);

    if as_json {
        println!("{}", serde_json::to_string_pretty(&contacts)?);
    } else {
        for line in format_contact_lines(&contacts) {
            println!("{line}");
        }
    }
    Ok(())
}

fn run_show(id: &str, db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path)?;
    let contact = resolve_contact(&store.contacts(), id)?;
    println!("{}", serde_json::to_string_pretty(&contact)?);
    Ok(())
}

fn run_dupes(min_score: u8, limit: usize, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path)?;
    let contacts = store.contacts();
    let mut groups = find_duplicate_groups(&contacts, min_score);
    groups.truncate(limit);

    if as_json {
        println!("{}", serde_json::to_string_pretty(&groups)?);
    } else if groups.is_empty() {
        println!("No likely duplicates found");
    } else {
        for line in format_group_lines(&groups, &contacts) {
            println!("{line}");
        }
    }
    Ok(())
}

fn run_merge(primary_query: &str, duplicate_query: &str, db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path)?;
    let mut contacts = store.contacts();
    let primary = resolve_contact(&contacts, primary_query)?;
    let duplicate = resolve_contact(&contacts, duplicate_query)?;
    if primary.id == duplicate.id {
        return Err(CliError::MergeSelf);
    }

    let record = MergeRecord::new(&primary, std::slice::from_ref(&duplicate));
    let merged = merge_contacts(&primary, &duplicate);

    contacts.retain(|contact| contact.id != duplicate.id);
    if let Some(slot) = contacts.iter_mut().find(|contact| contact.id == primary.id) {
        *slot = merged.clone();
    }
    store.save_contacts(&contacts)?;

    let mut history = store.merge_history();
    history.push(record.clone());
    store.save_merge_history(&history)?;

    let queue = SyncQueue::new(&store);
    queue.enqueue(
        EntityKind::Contact,
        SyncAction::Update,
        endpoints::CONTACTS_UPSERT,
        HttpMethod::Post,
        serde_json::to_value(&merged)?,
    )?;
    queue.enqueue(
        EntityKind::Contact,
        SyncAction::Delete,
        format!("{}/{}", endpoints::CONTACTS, duplicate.id),
        HttpMethod::Delete,
        serde_json::json!({ "id": duplicate.id }),
    )?;
    queue.enqueue(
        EntityKind::MergeHistory,
        SyncAction::Create,
        endpoints::MERGE_HISTORY,
        HttpMethod::Post,
        serde_json::to_value(&record)?,
    )?;

    println!("{}", merged.id);
    Ok(())
}

fn run_queue_status(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path)?;
    let items = store.sync_queue();

    if as_json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if items.is_empty() {
        println!("Queue is empty");
        return Ok(());
    }

    let now_ms = Utc::now().timestamp_millis();
    for item in &items {
        let state = match item.status {
            SyncStatus::Pending => "pending".to_string(),
            SyncStatus::Failed => format!(
                "failed ({})",
                item.last_error.as_deref().unwrap_or("unknown error")
            ),
        };
        println!(
            "{}  {:<28}  retries {}  {}  {}",
            short_id(&item.id),
            item.endpoint,
            item.retry_count,
            format_relative_time(item.enqueued_at, now_ms),
            state
        );
    }
    Ok(())
}

fn run_queue_retry(db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path)?;
    let queue = SyncQueue::new(&store);
    let reset = queue.retry_failed()?;
    println!("{reset} mutation(s) reset for retry");
    Ok(())
}

fn run_queue_dismiss(id: &str, db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path)?;
    let queue = SyncQueue::new(&store);
    if queue.dismiss(id)? {
        println!("{id}");
        Ok(())
    } else {
        Err(CliError::QueueItemNotFound(id.to_string()))
    }
}

async fn run_sync(db_path: &Path) -> Result<(), CliError> {
    let config = Config::from_env()?;
    let store = open_store(db_path)?;
    let transport = HttpTransport::new(&config.api_base_url, config.auth_token)?;

    let queue = SyncQueue::new(&store);
    let report = queue.drain(&transport).await;
    tracing::info!(
        processed = report.processed,
        failed = report.failed,
        "manual drain complete"
    );
    println!(
        "Processed {}, failed {}, {} pending, {} parked",
        report.processed,
        report.failed,
        queue.pending_count(),
        queue.failed_count()
    );
    for error in &report.errors {
        eprintln!("  {error}");
    }
    Ok(())
}

async fn run_up(watch: bool, db_path: &Path) -> Result<(), CliError> {
    let config = Config::from_env()?;
    let store = match &config.db_path {
        Some(path) => open_store(path)?,
        None => open_store(db_path)?,
    };
    let transport = HttpTransport::new(&config.api_base_url, config.auth_token)?;

    let report = start_session(&store, &transport, &config.user_id).await;
    tracing::info!(
        offline = report.offline,
        errors = report.errors.len(),
        "session start finished"
    );
    println!("{}", serde_json::to_string_pretty(&report)?);

    if watch {
        println!(
            "Watching queue, draining every {}s",
            AUTO_DRAIN_INTERVAL.as_secs()
        );
        run_periodic_drain(&store, &transport, AUTO_DRAIN_INTERVAL).await;
    }
    Ok(())
}

fn resolve_contact(contacts: &[Contact], query: &str) -> Result<Contact, CliError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(CliError::ContactNotFound(String::new()));
    }

    if let Some(exact) = contacts.iter().find(|contact| contact.id == query) {
        return Ok(exact.clone());
    }

    let matches: Vec<&Contact> = contacts
        .iter()
        .filter(|contact| {
            contact.id.starts_with(query)
                || contact.legacy_id.as_deref().is_some_and(|id| id == query)
        })
        .collect();

    match matches.len() {
        0 => Err(CliError::ContactNotFound(query.to_string())),
        1 => Ok(matches[0].clone()),
        _ => {
            let options = matches
                .iter()
                .take(3)
                .map(|contact| short_id(&contact.id))
                .collect::<Vec<_>>()
                .join(", ");
            Err(CliError::AmbiguousContactId(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

fn format_contact_lines(contacts: &[Contact]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    contacts
        .iter()
        .map(|contact| {
            let company = contact.company.as_deref().unwrap_or("-");
            let relative_time = format_relative_time(contact.updated_at, now_ms);
            let dirty = if contact.needs_upsert { "*" } else { " " };
            format!(
                "{}{}  {:<28}  {:<20}  {relative_time}",
                short_id(&contact.id),
                dirty,
                truncate(&contact.name, 28),
                truncate(company, 20)
            )
        })
        .collect()
}

fn format_group_lines(groups: &[DuplicateGroup], contacts: &[Contact]) -> Vec<String> {
    let name_of = |id: &str| {
        contacts
            .iter()
            .find(|contact| contact.id == id)
            .map_or_else(|| id.to_string(), |contact| contact.name.clone())
    };

    groups
        .iter()
        .map(|group| {
            let names = group
                .contact_ids
                .iter()
                .map(|id| name_of(id))
                .collect::<Vec<_>>()
                .join(" / ");
            let reasons = group
                .reasons
                .iter()
                .map(|reason| reason.description.clone())
                .collect::<Vec<_>>()
                .join("; ");
            format!("{:>3}  {names}  ({reasons})", group.top_score)
        })
        .collect()
}

fn normalize_name_input(name: &str) -> Option<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn short_id(id: &str) -> String {
    id.chars().take(13).collect()
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = text.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("ROLO_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rolo")
        .join("rolo.db")
}

fn open_store(path: &Path) -> Result<Store, CliError> {
    Ok(Store::open(path)?)
}
