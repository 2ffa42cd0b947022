use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::io::AsyncReadExt;

use gmshell::auth::RingStorage;
use gmshell::config::{self, Config};
use gmshell::connection::Connection;
use gmshell::models::{DetailLevel, Message, UNREAD};
use gmshell::session::Session;
use gmshell::verify::Verifier;

#[derive(Parser)]
#[command(name = "gmshell", version, about = "Terminal Gmail client")]
struct Cli {
    /// Settings file
    #[arg(long, default_value = config::DEFAULT_PATH)]
    config: PathBuf,

    /// Write debug logs to gmshell_debug.log
    #[arg(long)]
    debug: bool,

    /// Forget the stored OAuth token and exit
    #[arg(long)]
    reset_token: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// List labels, inbox first
    Labels,
    /// List messages
    List {
        #[arg(long)]
        label: Option<String>,
        #[arg(long, short)]
        query: Option<String>,
        /// Number of pages to walk
        #[arg(long, default_value_t = 1)]
        pages: usize,
    },
    /// Show one message
    Show {
        id: String,
        /// Check the GPG signature of the body
        #[arg(long)]
        verify: bool,
        #[arg(long)]
        no_key_download: bool,
    },
    /// Remove messages from the inbox
    Archive { ids: Vec<String> },
    /// Move messages to trash
    Trash { ids: Vec<String> },
    /// Add or remove a label
    Label {
        action: LabelAction,
        label: String,
        ids: Vec<String>,
    },
    /// Send an RFC 2822 message read from stdin
    Send,
    /// Show the account profile
    Profile,
}

#[derive(Clone, Copy, ValueEnum)]
enum LabelAction {
    Add,
    Remove,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug)?;

    if cli.reset_token {
        RingStorage.clear_token().await?;
        println!("Token cleared. Please restart without --reset-token to re-authenticate.");
        return Ok(());
    }

    let mut config = Config::load(&cli.config)?;
    let conn = Arc::new(
        Connection::connect(&config)
            .await
            .context("Failed to connect to Gmail")?,
    );

    let Some(command) = cli.command else {
        bail!("no command given; try --help");
    };

    if let Command::Show {
        no_key_download: true,
        ..
    } = &command
    {
        config.verify.allow_key_download = false;
    }
    let verifier = Verifier::gpg(&config.verify);
    let mut session = Session::new(conn.clone(), verifier, &config);

    match command {
        Command::Labels => {
            for label in conn.labels() {
                println!("{:<30} {}", label.display_name(), label.id());
            }
        }
        Command::List {
            label,
            query,
            pages,
        } => {
            let label = match label {
                Some(name) => Some(
                    conn.find_label(&name)
                        .with_context(|| format!("unknown label {name:?}"))?
                        .id()
                        .to_string(),
                ),
                None => None,
            };
            let mut report = session.open_list(label.as_deref(), query.as_deref()).await?;
            if let Some(page) = session.page() {
                println!("Total size: {}", page.result_size_estimate());
            }
            for n in 0..pages {
                if let Some(err) = &report.last_error {
                    eprintln!("{} messages failed to load: {}", report.failed, err);
                }
                for msg in session.messages() {
                    println!("{}", list_line(msg));
                }
                if n + 1 == pages {
                    break;
                }
                match session.next_page().await? {
                    Some(next) => report = next,
                    None => break,
                }
            }
        }
        Command::Show {
            id, verify, ..
        } => {
            let msg = conn.fetch_message(&id, DetailLevel::Full).await?;
            let mark_read = conn.mark_read_detached(&msg);
            println!("From: {}", msg.sender());
            println!("To: {}", msg.header("To").unwrap_or_default());
            println!("CC: {}", msg.header("Cc").unwrap_or_default());
            println!("Date: {}", msg.header("Date").unwrap_or_default());
            println!("Subject: {}", msg.subject());
            println!("Labels: {}", conn.labeled(&msg).join(", "));
            println!("{}", "-".repeat(72));
            match conn.body(&msg).await {
                Ok(body) => println!("{body}"),
                Err(e) => println!("<{e}>"),
            }
            if verify {
                let outcome = session.verify(&msg).await?;
                println!("{}", "-".repeat(72));
                println!("{outcome}");
            }
            // Let the read marker land before the runtime shuts down.
            if let Some(handle) = mark_read {
                let _ = handle.await;
            }
        }
        Command::Archive { ids } => {
            ids.into_iter().for_each(|id| session.mark(id));
            let report = session.archive_marked().await;
            println!("{}", report.summary("archiving"));
        }
        Command::Trash { ids } => {
            ids.into_iter().for_each(|id| session.mark(id));
            let report = session.trash_marked().await;
            println!("{}", report.summary("trashing"));
        }
        Command::Label { action, label, ids } => {
            let label = conn
                .find_label(&label)
                .with_context(|| format!("unknown label {label:?}"))?;
            ids.into_iter().for_each(|id| session.mark(id));
            let (add, verb) = match action {
                LabelAction::Add => (true, "labeling"),
                LabelAction::Remove => (false, "unlabeling"),
            };
            let report = session.label_marked(label.id(), add).await;
            println!("{}", report.summary(verb));
        }
        Command::Send => {
            let mut raw = String::new();
            tokio::io::stdin().read_to_string(&mut raw).await?;
            conn.send(&raw).await?;
            println!("Sent.");
        }
        Command::Profile => {
            let profile = conn.profile().await?;
            println!("Email: {}", profile.email_address);
            println!("Messages: {}", profile.messages_total);
            println!("Threads: {}", profile.threads_total);
        }
    }

    Ok(())
}

fn list_line(msg: &Message) -> String {
    let flag = if msg.has_label(UNREAD) { '>' } else { ' ' };
    let date = msg
        .received_at()
        .map(|d| d.format("%b %d %H:%M").to_string())
        .unwrap_or_default();
    let from: String = msg.sender().chars().take(24).collect();
    format!(
        "{flag} {:<16} {:<12} {:<24} | {}",
        msg.id(),
        date,
        from,
        msg.subject()
    )
}

fn init_logging(debug: bool) -> anyhow::Result<()> {
    if debug {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open("gmshell_debug.log")
            .context("Failed to open debug log")?;
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_writer(std::io::stderr)
            .init();
    }
    Ok(())
}
