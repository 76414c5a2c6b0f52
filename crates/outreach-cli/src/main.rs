use std::path::PathBuf;
use std::sync::Arc;

use chrono::DateTime;
use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use outreach_common::telemetry::{self, TelemetryConfig};
use outreach_common::{Config, FileStore};
use outreach_drafts::local::{self, LocalLookup};
use outreach_drafts::{
    ComposerSession, DraftKey, FileCacheStore, RecoveryDecision, RecoveryReconciler, RemoteLookup,
};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

mod store;

use store::FileDraftStore;

#[derive(Parser)]
#[command(version, about = "Outreach - email drafts with auto-save and crash recovery", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to config file (.toml or .json)
    #[arg(long, env = "OUTREACH_CONFIG")]
    config: Option<PathBuf>,

    /// User the drafts belong to
    #[arg(long, short, env = "OUTREACH_USER", default_value = "local")]
    user: String,

    /// Print collected metrics to stderr on exit
    #[arg(long)]
    metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show what a mount would offer for a contact's draft
    Status {
        /// Contact the draft is addressed to
        contact: String,
    },
    /// Compose a draft, one body line per stdin line
    ///
    /// Lines starting with `/` are commands: `/subject <text>`, `/save`, `/quit`.
    Compose {
        /// Contact the draft is addressed to
        contact: String,

        /// Subject to start with
        #[arg(long, short)]
        subject: Option<String>,

        /// Recover a cached draft without asking
        #[arg(long, conflicts_with = "discard")]
        recover: bool,

        /// Discard a cached draft without asking
        #[arg(long)]
        discard: bool,

        /// Exit without the final save, as a crash would
        #[arg(long)]
        no_save: bool,
    },
    /// Delete the cached local draft for a contact
    Discard {
        /// Contact the draft is addressed to
        contact: String,

        /// Also delete the remote draft
        #[arg(long)]
        remote: bool,
    },
    /// List cached and remote drafts
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_miette();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref()).await?;

    telemetry::init(
        TelemetryConfig::from_env("outreach-cli").with_level(config.telemetry.log_level.as_deref()),
    );

    let stores = Stores::open(&config, &cli.user)?;

    match cli.command {
        Commands::Status { contact } => status(&stores, &cli.user, contact).await?,
        Commands::Compose {
            contact,
            subject,
            recover,
            discard,
            no_save,
        } => {
            let choice = match (recover, discard) {
                (true, _) => Some(Choice::Recover),
                (_, true) => Some(Choice::Discard),
                _ => None,
            };
            compose(&stores, &config, &cli.user, contact, subject, choice, no_save).await?
        }
        Commands::Discard { contact, remote } => {
            discard(&stores, &cli.user, contact, remote).await?
        }
        Commands::List => list(&stores).await?,
    }

    if cli.metrics {
        eprintln!("{}", telemetry::render());
    }

    Ok(())
}

async fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    let store = match path {
        Some(path) => FileStore::new(path),
        None => {
            let store = FileStore::default();
            if !store.path().exists() {
                return Ok(Config::default());
            }
            store
        }
    };
    Ok(Config::load(&store).await?)
}

struct Stores {
    local: Arc<FileCacheStore>,
    remote: Arc<FileDraftStore>,
}

impl Stores {
    fn open(config: &Config, user: &str) -> Result<Self> {
        let local = FileCacheStore::open(config.cache.dir_or_default(), user).into_diagnostic()?;
        let remote = FileDraftStore::open(config.remote.dir_or_default(), user).into_diagnostic()?;
        tracing::debug!(
            cache_dir = %local.dir().display(),
            "opened draft stores"
        );
        Ok(Self {
            local: Arc::new(local),
            remote: Arc::new(remote),
        })
    }
}

#[derive(Clone, Copy)]
enum Choice {
    Recover,
    Discard,
}

async fn status(stores: &Stores, user: &str, contact: String) -> Result<()> {
    let key = DraftKey::new(user, contact);
    let reconciler = RecoveryReconciler::new(stores.local.clone(), stores.remote.clone());
    let outcome = reconciler.reconcile_with_remote(&key).await;

    println!("Draft {}", key);
    match local::load_record(&*stores.local, &key) {
        LocalLookup::Found(record) => println!(
            "  local:  \"{}\" cached at {}",
            record.content.subject,
            format_millis(record.timestamp)
        ),
        LocalLookup::Malformed(reason) => println!("  local:  unusable ({})", reason),
        LocalLookup::Absent => println!("  local:  none"),
    }
    match &outcome.remote {
        RemoteLookup::Found(record) => println!(
            "  remote: \"{}\" v{} updated {}",
            record.subject,
            record.version.unwrap_or(0),
            record.updated_at.to_rfc3339()
        ),
        RemoteLookup::Absent => println!("  remote: none"),
        RemoteLookup::Unavailable(e) => println!("  remote: unavailable ({})", e),
        RemoteLookup::Skipped => println!("  remote: not checked"),
    }
    match outcome.decision {
        RecoveryDecision::None => println!("→ nothing to recover"),
        RecoveryDecision::PromptRecovery { timestamp, .. } => println!(
            "→ would offer recovery of the draft cached at {}",
            format_millis(timestamp)
        ),
    }
    Ok(())
}

async fn compose(
    stores: &Stores,
    config: &Config,
    user: &str,
    contact: String,
    subject: Option<String>,
    choice: Option<Choice>,
    no_save: bool,
) -> Result<()> {
    let key = DraftKey::new(user, contact);
    let mut session = ComposerSession::mount(
        key.clone(),
        stores.local.clone(),
        stores.remote.clone(),
        config.autosave,
    )
    .await;
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    if let RecoveryDecision::PromptRecovery { content, timestamp } = session.decision().clone() {
        println!(
            "⚠ Found an unsaved draft from {}: \"{}\"",
            format_millis(timestamp),
            content.subject
        );
        let choice = match choice {
            Some(choice) => choice,
            None => ask_recovery(&mut stdin).await?,
        };
        match choice {
            Choice::Recover => {
                session.recover();
                println!("✓ Recovered");
            }
            Choice::Discard => {
                session.discard().into_diagnostic()?;
                println!("✓ Discarded");
            }
        }
    }

    let mut content = session.initial_content().unwrap_or_default();
    if let Some(subject) = subject {
        content.subject = subject;
        session.on_content_change(content.clone());
    }
    println!("Subject: {}", content.subject);
    if !content.body_html.is_empty() {
        println!("{}", content.body_html);
    }

    let mut updates = session.subscribe();
    let printer = n0_future::task::spawn(async move {
        let mut last = updates.borrow_and_update().status;
        while updates.changed().await.is_ok() {
            let state = updates.borrow_and_update().clone();
            if state.status == last {
                continue;
            }
            last = state.status;
            match state.error {
                Some(error) => eprintln!("[{}] {}", state.status.label(), error),
                None => eprintln!("[{}]", state.status.label()),
            }
        }
    });

    while let Some(line) = stdin.next_line().await.into_diagnostic()? {
        match line.trim() {
            "/quit" => break,
            "/save" => {
                let state = session.save_now().await;
                println!("→ {}", state.status);
                continue;
            }
            cmd if cmd.starts_with("/subject") => {
                content.subject = cmd.trim_start_matches("/subject").trim().to_string();
            }
            _ => {
                content.body_html.push_str(&format!("<p>{}</p>", line));
            }
        }
        session.on_content_change(content.clone());
    }

    if no_save {
        println!("⚠ Exiting without saving");
    } else if session.engine().latest_content().is_some() {
        let state = session.save_now().await;
        match state.error {
            Some(error) => println!("⚠ Draft saved locally, sync failed: {}", error),
            None => println!("✓ Draft saved"),
        }
    }

    printer.abort();
    session.unmount();
    Ok(())
}

async fn ask_recovery(stdin: &mut Lines<BufReader<Stdin>>) -> Result<Choice> {
    loop {
        println!("Recover it? [r]ecover / [d]iscard");
        let Some(answer) = stdin.next_line().await.into_diagnostic()? else {
            return Err(miette::miette!("stdin closed before a recovery choice was made"));
        };
        match answer.trim().to_lowercase().as_str() {
            "r" | "recover" => return Ok(Choice::Recover),
            "d" | "discard" => return Ok(Choice::Discard),
            _ => continue,
        }
    }
}

async fn discard(stores: &Stores, user: &str, contact: String, remote: bool) -> Result<()> {
    let key = DraftKey::new(user, contact);
    local::delete_record(&*stores.local, &key).into_diagnostic()?;
    println!("✓ Discarded local draft for {}", key);

    if remote {
        if stores.remote.delete(&key.contact_id).await.into_diagnostic()? {
            println!("✓ Deleted remote draft");
        } else {
            println!("No remote draft to delete");
        }
    }
    Ok(())
}

async fn list(stores: &Stores) -> Result<()> {
    let cached = stores.local.list_local_drafts().into_diagnostic()?;
    println!("Cached drafts ({}):", cached.len());
    for key in &cached {
        match local::load_record(&*stores.local, key) {
            LocalLookup::Found(record) => println!(
                "  {}  \"{}\"  {}",
                key.contact_id,
                record.content.subject,
                format_millis(record.timestamp)
            ),
            _ => println!("  {}  (unreadable)", key.contact_id),
        }
    }

    let remote = stores.remote.list().await.into_diagnostic()?;
    println!("Remote drafts ({}):", remote.len());
    for record in remote {
        println!(
            "  {}  \"{}\"  v{}  {}",
            record.contact_id,
            record.subject,
            record.version.unwrap_or(0),
            record.updated_at.to_rfc3339()
        );
    }
    Ok(())
}

fn format_millis(millis: i64) -> String {
    DateTime::from_timestamp_millis(millis)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| millis.to_string())
}

fn init_miette() {
    // Only fails if a hook is already installed.
    let _ = miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .with_cause_chain()
                .color(true)
                .context_lines(5)
                .tab_width(2)
                .break_words(true)
                .build(),
        )
    }));
    miette::set_panic_hook();
}
