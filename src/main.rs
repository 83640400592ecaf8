//! SafeSearch CLI entry point.
//!
//! Manages trusted contacts and sends location, emergency and audio alerts
//! to them.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{debug, info, warn};

use safesearch::alert::templates::EmergencyKind;
use safesearch::alert::{AlertDeps, AlertService};
use safesearch::audio::RecordingArtifact;
use safesearch::cancel::{cancel_pair, CancelSignal};
use safesearch::config::{config_dir, load_default_config, Config};
use safesearch::contacts::kv::SqliteKeyValueStore;
use safesearch::contacts::store::ContactStore;
use safesearch::contacts::{ContactPatch, NewContact};
use safesearch::dispatch::report::BatchReport;
use safesearch::dispatch::transport::{DryRunTransport, HttpSmsGateway, MessagingTransport};
use safesearch::dispatch::{DispatchEngine, DispatchProgress, ProgressFn, ProgressStatus};
use safesearch::location::geocoder::{NominatimGeocoder, ReverseGeocoder};
use safesearch::location::{LocationAcquirer, NoPositioning, Positioning, StaticPositioning};
use safesearch::upload::{BlobUploader, HttpBlobUploader};

/// SafeSearch: send emergency alerts to trusted contacts.
#[derive(Parser)]
#[command(name = "safesearch", version, about)]
struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Top-level subcommands.
#[derive(Subcommand)]
enum Command {
    /// Manage trusted contacts.
    Contacts {
        /// Contact action.
        #[command(subcommand)]
        action: ContactsCommand,
    },
    /// Send an alert.
    Alert {
        /// Alert kind.
        #[command(subcommand)]
        action: AlertCommand,
    },
}

/// Contact management actions.
#[derive(Subcommand)]
enum ContactsCommand {
    /// List all contacts.
    List,
    /// Add a contact.
    Add {
        /// Display name.
        #[arg(long)]
        name: String,
        /// Phone number.
        #[arg(long)]
        phone: String,
        /// Email address.
        #[arg(long)]
        email: Option<String>,
        /// Relationship label.
        #[arg(long)]
        relationship: Option<String>,
        /// Notes.
        #[arg(long)]
        notes: Option<String>,
    },
    /// Update fields of a contact.
    Update {
        /// Contact id.
        id: String,
        /// New display name.
        #[arg(long)]
        name: Option<String>,
        /// New phone number.
        #[arg(long)]
        phone: Option<String>,
        /// New email address.
        #[arg(long)]
        email: Option<String>,
        /// New relationship label.
        #[arg(long)]
        relationship: Option<String>,
        /// New notes.
        #[arg(long)]
        notes: Option<String>,
    },
    /// Remove a contact.
    Remove {
        /// Contact id.
        id: String,
    },
    /// Show a contact's alert history.
    History {
        /// Contact id.
        id: String,
    },
}

/// Alert actions.
#[derive(Subcommand)]
enum AlertCommand {
    /// Acquire the current location and send it.
    Location {
        /// Contact ids to alert.
        #[arg(long = "to", required = true, num_args = 1..)]
        to: Vec<String>,
        /// Send without asking for confirmation.
        #[arg(long)]
        yes: bool,
    },
    /// Send a canned emergency message.
    Emergency {
        /// general, medical, police or fire.
        #[arg(long, default_value = "general")]
        kind: EmergencyKind,
        /// Custom text (general alerts only).
        #[arg(long)]
        message: Option<String>,
        /// Contact ids to alert.
        #[arg(long = "to", required = true, num_args = 1..)]
        to: Vec<String>,
    },
    /// Upload a recording and send its link.
    Audio {
        /// Recorded audio file.
        #[arg(long)]
        file: PathBuf,
        /// Recording duration in seconds.
        #[arg(long)]
        duration: f64,
        /// Contact ids to alert.
        #[arg(long = "to", required = true, num_args = 1..)]
        to: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // Alert runs keep a JSON audit trail; contact management does not.
    let _logging_guard = match &cli.command {
        Command::Alert { .. } => Some(safesearch::logging::init_audit(
            &config_dir()?.join("logs"),
        )?),
        Command::Contacts { .. } => {
            safesearch::logging::init_cli();
            None
        }
    };

    let config = load_default_config()?;
    let store = Arc::new(open_store(&config).await?);

    let result = match cli.command {
        Command::Contacts { action } => handle_contacts(&store, action).await,
        Command::Alert { action } => handle_alert(&config, Arc::clone(&store), action).await,
    };

    if let Ok(store) = Arc::try_unwrap(store) {
        store.shutdown().await;
    }
    result
}

/// Open the contact store at the configured database path.
async fn open_store(config: &Config) -> anyhow::Result<ContactStore> {
    let db_path = match &config.storage.database {
        Some(path) => path.clone(),
        None => {
            let dir = config_dir()?;
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
            dir.join("safesearch.db")
        }
    };
    debug!(path = %db_path.display(), "opening contact database");
    let kv = SqliteKeyValueStore::open(&db_path)
        .await
        .with_context(|| format!("failed to open {}", db_path.display()))?;
    Ok(ContactStore::new(
        Arc::new(kv),
        config.storage.contacts_key.clone(),
    ))
}

async fn handle_contacts(store: &ContactStore, action: ContactsCommand) -> anyhow::Result<()> {
    match action {
        ContactsCommand::List => {
            let contacts = store.list().await?;
            if contacts.is_empty() {
                println!("No contacts.");
            }
            for c in contacts {
                let relationship = c
                    .relationship
                    .as_deref()
                    .map(|r| format!(" ({r})"))
                    .unwrap_or_default();
                println!("{}  {}{}  {}", c.id, c.name, relationship, c.phone);
            }
        }
        ContactsCommand::Add {
            name,
            phone,
            email,
            relationship,
            notes,
        } => {
            let contact = store
                .create(NewContact {
                    name,
                    phone,
                    email,
                    relationship,
                    notes,
                })
                .await?;
            println!("Added {} ({})", contact.name, contact.id);
        }
        ContactsCommand::Update {
            id,
            name,
            phone,
            email,
            relationship,
            notes,
        } => {
            let patch = ContactPatch {
                name,
                phone,
                email,
                relationship,
                notes,
            };
            if patch.is_empty() {
                anyhow::bail!("nothing to update");
            }
            let contact = store.update(&id, patch).await?;
            println!("Updated {} ({})", contact.name, contact.id);
        }
        ContactsCommand::Remove { id } => {
            if store.delete(&id).await? {
                println!("Removed {id}");
            } else {
                println!("No contact with id {id}");
            }
        }
        ContactsCommand::History { id } => {
            let contact = store
                .get(&id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("no contact with id {id}"))?;
            if contact.history.is_empty() {
                println!("No history for {}.", contact.name);
            }
            for entry in &contact.history {
                let status = if entry.delivered { "sent" } else { "failed" };
                println!(
                    "{}  {:<9}  {status}",
                    entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    entry.kind.label()
                );
            }
        }
    }
    Ok(())
}

async fn handle_alert(
    config: &Config,
    store: Arc<ContactStore>,
    action: AlertCommand,
) -> anyhow::Result<()> {
    let service = build_service(config, store);

    let (cancel_handle, cancel) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling alert");
            cancel_handle.cancel();
        }
    });

    let mut printer = print_progress;
    let progress: ProgressFn<'_> = &mut printer;

    let report = match action {
        AlertCommand::Location { to, yes } => {
            let prepared = service.prepare_location_alert(&to, Some(&cancel)).await?;
            println!("{}\n", prepared.message);
            if !yes && !ask_confirmation(&prepared.prompt, &cancel).await? {
                service.decline(&prepared.id);
                println!("Cancelled.");
                return Ok(());
            }
            service
                .confirm(&prepared.id, Some(progress), Some(&cancel))
                .await?
        }
        AlertCommand::Emergency { kind, message, to } => {
            service
                .send_emergency_alert(&to, kind, message.as_deref(), Some(progress), Some(&cancel))
                .await?
        }
        AlertCommand::Audio { file, duration, to } => {
            let mut artifact = RecordingArtifact::new(file, duration);
            service
                .send_audio_alert(&to, &mut artifact, Some(progress), Some(&cancel))
                .await?
        }
    };

    print_report(&report);
    Ok(())
}

/// Wire the service from configuration.
fn build_service(config: &Config, store: Arc<ContactStore>) -> AlertService {
    let env = |key: &str| std::env::var(key).ok();

    let transport: Arc<dyn MessagingTransport> = match &config.sms.gateway_url {
        Some(url) => {
            let token = Config::token_from(config.sms.token_env.as_deref(), env);
            Arc::new(HttpSmsGateway::new(url.clone(), token))
        }
        None => {
            info!("no SMS gateway configured, messages will not leave this machine");
            Arc::new(DryRunTransport)
        }
    };

    let positioning: Arc<dyn Positioning> = match &config.position {
        Some(p) => Arc::new(StaticPositioning::new(p.latitude, p.longitude, p.accuracy)),
        None => Arc::new(NoPositioning),
    };

    let geocoder: Option<Arc<dyn ReverseGeocoder>> = if config.geocoder.enabled {
        Some(Arc::new(NominatimGeocoder::new(
            config.geocoder.base_url.clone(),
            &config.geocoder.user_agent,
        )))
    } else {
        None
    };

    let uploader: Option<Arc<dyn BlobUploader>> = config.upload.base_url.as_ref().map(|url| {
        let token = Config::token_from(config.upload.token_env.as_deref(), env);
        Arc::new(HttpBlobUploader::new(url.clone(), token)) as Arc<dyn BlobUploader>
    });

    AlertService::new(AlertDeps {
        engine: DispatchEngine::new(
            transport,
            Arc::clone(&store),
            config.dispatch.inter_send_delay_ms,
        ),
        contacts: store,
        acquirer: LocationAcquirer::new(positioning),
        geocoder,
        uploader,
        location_options: config.location.options(),
        confirmation_expiry_secs: config.confirmation.expiry_secs,
    })
}

fn print_progress(progress: &DispatchProgress) {
    match progress.status {
        ProgressStatus::Sending => eprintln!(
            "[{}/{}] sending to {}...",
            progress.current, progress.total, progress.contact_name
        ),
        ProgressStatus::Sent => eprintln!(
            "[{}/{}] done: {}",
            progress.current, progress.total, progress.contact_name
        ),
    }
}

fn print_report(report: &BatchReport) {
    println!("{}", report.summary());
    if !report.all_succeeded() {
        println!("{}", report.failure_details());
    }
}

/// Prompt on stdout and read a yes/no answer from stdin.
///
/// An interrupt while waiting counts as "no". The read runs on a plain
/// thread so a pending read does not hold the runtime open at exit.
async fn ask_confirmation(prompt: &str, cancel: &CancelSignal) -> anyhow::Result<bool> {
    print!("{prompt} [y/N] ");
    std::io::stdout().flush()?;

    let (tx, rx) = tokio::sync::oneshot::channel();
    std::thread::spawn(move || {
        let mut line = String::new();
        let read = std::io::stdin().lock().read_line(&mut line).map(|_| line);
        let _ = tx.send(read);
    });

    tokio::select! {
        answer = rx => {
            let line = answer.context("stdin reader stopped")??;
            Ok(matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
        }
        () = cancel.cancelled() => {
            println!();
            Ok(false)
        }
    }
}
