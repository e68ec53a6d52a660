//! pmg: track, commit and synchronize a working tree with a PMG server.
//!
//! # Usage
//!
//! ```bash
//! # Set up the current directory
//! pmg init
//!
//! # Stage changed and deleted files, then commit them
//! pmg add
//! pmg commit -m "first version"
//!
//! # Upload the pending commit
//! pmg push
//!
//! # Compare with the server, then pull its snapshot
//! pmg fetch
//! pmg pull
//! ```

mod prompt;
mod remote;

use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use pmg_core::{
    ChangeDetector, ClientConfig, CommitEngine, FollowUp, FollowUpOutcome, Identity, IgnoreRules,
    MetadataStore, PmgError, PullReport, PushEngine, PushLog, PushReport, Remote,
    RepositoryIdentity, StagingBuffer, Workspace, resolve_repository,
};
use prompt::StdinPrompt;
use remote::HttpRemote;
use std::path::Path;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "pmg")]
#[command(author = "PMG Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Track and synchronize a working tree with a PMG server")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Initialize the current directory as a working tree
    Init,

    /// Stage new, modified and deleted files
    Add,

    /// Record the staged changes as one commit
    Commit {
        /// Commit message (at most 50 characters)
        #[arg(short, long)]
        message: String,
    },

    /// Upload a commit to the server
    Push {
        /// Commit to push (default: latest unsynced)
        commit_id: Option<String>,
    },

    /// Overlay the server's project snapshot onto the working tree
    Pull,

    /// Compare the local and remote latest commits
    Fetch {
        /// Run the recommended push or pull without asking
        #[arg(short, long)]
        yes: bool,
    },

    /// Show staged changes and the pending commit
    Status,

    /// List recent commits
    Log {
        /// Maximum number of commits to show
        #[arg(short = 'n', long, default_value_t = 10)]
        limit: usize,
    },

    /// Show push attempts
    History {
        /// Only attempts for this commit
        commit_id: Option<String>,
    },

    /// Check the API token against the server
    Auth,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pmg=info".parse()?)
                .add_directive("pmg_core=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let cwd = std::env::current_dir()?;

    let result = match cli.command {
        Commands::Init => cmd_init(&cwd),
        Commands::Add => cmd_add(&cwd),
        Commands::Commit { message } => cmd_commit(&cwd, &message),
        Commands::Push { commit_id } => cmd_push(&cwd, commit_id.as_deref()).await,
        Commands::Pull => cmd_pull(&cwd).await,
        Commands::Fetch { yes } => cmd_fetch(&cwd, yes).await,
        Commands::Status => cmd_status(&cwd),
        Commands::Log { limit } => cmd_log(&cwd, limit),
        Commands::History { commit_id } => cmd_history(&cwd, commit_id.as_deref()),
        Commands::Auth => cmd_auth(&cwd).await,
    };

    // Nothing to commit or push is not a failure.
    match result {
        Err(e) if e.downcast_ref::<PmgError>().is_some_and(PmgError::is_informational) => {
            println!("{}", e);
            Ok(())
        }
        other => other,
    }
}

fn cmd_init(cwd: &Path) -> Result<()> {
    let ws = Workspace::init(cwd, &mut StdinPrompt)?;
    println!("Initialized empty PMG working tree in {}", ws.state_dir().display());
    Ok(())
}

fn cmd_add(cwd: &Path) -> Result<()> {
    let ws = Workspace::discover(cwd)?;
    let store = MetadataStore::open(&ws.db_path())?;
    let config = ClientConfig::load(ws.state_dir())?;
    let rules = IgnoreRules::load(&ws.ignore_path())?;
    let buffer = StagingBuffer::new(&ws.staging_path());

    let report = ChangeDetector::new(&ws, &store)
        .with_rules(rules)
        .with_max_file_size(config.max_file_size)
        .stage(&buffer)?;

    if report.staged.is_empty() {
        println!("No changes detected.");
    } else {
        for change in &report.staged {
            let tag = if change.is_deletion { "deleted" } else { "modified" };
            println!("  {:<9} {}", tag, change.path);
        }
        println!(
            "\nStaged {} file(s): {} modified, {} deleted",
            report.staged.len(),
            report.modified_count(),
            report.deleted_count()
        );
    }
    for path in &report.oversized {
        println!("  skipped (too large): {}", path);
    }
    for path in &report.unreadable {
        println!("  skipped (unreadable): {}", path);
    }
    Ok(())
}

fn cmd_commit(cwd: &Path, message: &str) -> Result<()> {
    let ws = Workspace::discover(cwd)?;
    let identity = Identity::require(ws.state_dir())?;
    let store = MetadataStore::open(&ws.db_path())?;
    let buffer = StagingBuffer::new(&ws.staging_path());

    let result = CommitEngine::new(&ws, &store, &buffer).commit(message, &identity.author)?;
    for path in &result.skipped {
        println!("  skipped (no longer on disk): {}", path);
    }
    for (path, reason) in &result.failed {
        println!("  failed: {} ({})", path, reason);
    }
    if result.is_noop() {
        println!("Nothing was committed.");
        return Ok(());
    }

    println!("Committed {}", result.commit_id);
    println!("  Files:     {}", result.files_committed);
    println!("  Deletions: {}", result.deletions);
    println!("  Date:      {}", format_time(result.timestamp));
    println!("\nRun `pmg push` to upload it.");
    Ok(())
}

/// Everything a remote operation needs.
struct Session {
    ws: Workspace,
    config: ClientConfig,
    remote: HttpRemote,
    repo: RepositoryIdentity,
}

fn open_session(cwd: &Path) -> Result<Session> {
    let ws = Workspace::discover(cwd)?;
    let identity = Identity::require(ws.state_dir())?;
    let config = ClientConfig::load(ws.state_dir())?;
    let remote = HttpRemote::new(
        &config.server_url,
        identity.token()?,
        Duration::from_secs(config.request_timeout_secs),
    )?;
    let repo = resolve_repository(ws.state_dir(), Some(&identity.project_name), &mut StdinPrompt)?;
    Ok(Session { ws, config, remote, repo })
}

async fn cmd_push(cwd: &Path, commit_id: Option<&str>) -> Result<()> {
    let session = open_session(cwd)?;
    let store = MetadataStore::open(&session.ws.db_path())?;

    let report = PushEngine::new(&session.ws, &store, &session.remote, &session.repo)
        .with_concurrency(session.config.push_concurrency)
        .push(commit_id)
        .await?;
    print_push(&report)
}

fn print_push(report: &PushReport) -> Result<()> {
    for failure in report.failures() {
        println!(
            "  failed: {} ({})",
            failure.path,
            failure.error.as_deref().unwrap_or("unknown error")
        );
    }
    println!("\nPush of {}:", report.commit_id);
    println!("  Succeeded: {}", report.succeeded);
    println!("  Failed:    {}", report.failed);
    println!("  Total:     {}", report.total);
    println!("  Time:      {}ms", report.duration_ms);

    if report.synced {
        println!("\nCommit is synced.");
        Ok(())
    } else {
        Err(anyhow!(
            "{} of {} file(s) failed; run `pmg push` again to retry the whole commit",
            report.failed,
            report.total
        ))
    }
}

async fn cmd_pull(cwd: &Path) -> Result<()> {
    let session = open_session(cwd)?;
    let report = pmg_core::pull(&session.ws, &session.remote, &session.repo).await?;
    print_pull(&report);
    Ok(())
}

fn print_pull(report: &PullReport) {
    println!("Pulled {}:", report.repository);
    println!("  Files:    {}", report.expanded.files_written);
    println!("  Received: {}", format_size(report.archive_bytes));
    for name in &report.expanded.skipped {
        println!("  skipped entry: {}", name);
    }
}

async fn cmd_fetch(cwd: &Path, yes: bool) -> Result<()> {
    let session = open_session(cwd)?;
    let store = MetadataStore::open(&session.ws.db_path())?;
    let report = pmg_core::fetch(&store, &session.remote, &session.repo).await?;

    match &report.local {
        Some(local) => println!("Local:  {} ({})", local.commit_id, format_time(local.timestamp)),
        None => println!("Local:  no commits"),
    }
    match (&report.remote.latest_commit_id, report.remote.timestamp) {
        (Some(id), Some(ts)) => println!("Remote: {} ({})", id, format_time(ts)),
        _ => println!("Remote: no commits"),
    }
    println!("Status: {}", report.divergence);

    let outcome = FollowUp::new(&session.ws, &store, &session.remote, &session.repo)
        .with_push_concurrency(session.config.push_concurrency)
        .assume_yes(yes)
        .run(&report, &mut StdinPrompt)
        .await?;
    match outcome {
        FollowUpOutcome::UpToDate | FollowUpOutcome::Declined(_) => Ok(()),
        FollowUpOutcome::Pushed(push) => print_push(&push),
        FollowUpOutcome::Pulled(pull) => {
            print_pull(&pull);
            Ok(())
        }
    }
}

fn cmd_status(cwd: &Path) -> Result<()> {
    let ws = Workspace::discover(cwd)?;
    let store = MetadataStore::open(&ws.db_path())?;
    let status = pmg_core::status(&ws, &store)?;

    println!("Working tree: {}", ws.root().display());
    if let Some(latest) = &status.latest_commit {
        println!(
            "Last commit:  {} \"{}\" ({})",
            latest.commit_id,
            latest.message,
            format_time(latest.timestamp)
        );
    }
    if let Some(pending) = &status.pending_commit {
        println!(
            "Unsynced:     {} ({} record(s)), run `pmg push`",
            pending, status.unsynced_records
        );
    }

    if status.staged.is_empty() {
        println!("\nNothing staged.");
    } else {
        println!("\nStaged:");
        for change in &status.staged {
            let tag = if change.is_deletion { "deleted" } else { "modified" };
            println!("  {:<9} {}", tag, change.path);
        }
    }
    Ok(())
}

fn cmd_log(cwd: &Path, limit: usize) -> Result<()> {
    let ws = Workspace::discover(cwd)?;
    let store = MetadataStore::open(&ws.db_path())?;
    let commits = store.commits(limit)?;
    if commits.is_empty() {
        println!("No commits yet.");
        return Ok(());
    }
    for c in commits {
        println!("commit {}{}", c.commit_id, if c.synced { "" } else { " (unsynced)" });
        println!("Author: {}", c.author);
        println!("Date:   {}", format_time(c.timestamp));
        println!("Files:  {}", c.file_count);
        println!("\n    {}\n", c.message);
    }
    Ok(())
}

fn cmd_history(cwd: &Path, commit_id: Option<&str>) -> Result<()> {
    let ws = Workspace::discover(cwd)?;
    let log = PushLog::new(ws.state_dir());
    let entries = match commit_id {
        Some(id) => log.for_commit(id)?,
        None => log.all()?,
    };
    if entries.is_empty() {
        println!("No push attempts recorded.");
        return Ok(());
    }
    println!("{:<20} {:<36} {:>5} {:>5} {:>5}  {}", "Date", "Commit", "OK", "Fail", "Total", "Synced");
    for e in entries {
        println!(
            "{:<20} {:<36} {:>5} {:>5} {:>5}  {}",
            format_time(e.timestamp),
            e.commit_id,
            e.succeeded,
            e.failed,
            e.total,
            if e.synced { "yes" } else { "no" }
        );
    }
    Ok(())
}

async fn cmd_auth(cwd: &Path) -> Result<()> {
    let ws = Workspace::discover(cwd)?;
    let identity = Identity::require(ws.state_dir())?;
    let config = ClientConfig::load(ws.state_dir())?;
    let remote = HttpRemote::new(
        &config.server_url,
        identity.token()?,
        Duration::from_secs(config.request_timeout_secs),
    )?;
    remote.authenticate().await?;
    println!("Authenticated with {} as {}", config.server_url, identity.author);
    Ok(())
}

fn format_time(timestamp: i64) -> String {
    chrono::DateTime::from_timestamp(timestamp, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
