use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use client_core::{CredentialContext, PortalClient, KEEP_ALIVE_INTERVAL};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod terminal;

use config::{load_settings, Overrides};

#[derive(Parser, Debug)]
#[command(name = "portal", about = "Student portal from the command line")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// Backend base url (overrides portal.toml and PORTAL_BACKEND_URL).
    #[arg(long, global = true)]
    backend_url: Option<String>,
    #[arg(long, global = true)]
    credentials: Option<PathBuf>,
    /// tracing filter, e.g. `debug` or `warn,client_core=debug`.
    #[arg(long, global = true)]
    log: Option<String>,
    /// Answer yes to every confirmation prompt.
    #[arg(long, short = 'y', global = true)]
    yes: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    Login {
        email: String,
        /// Read from stdin when omitted.
        #[arg(long)]
        password: Option<String>,
    },
    Logout,
    /// Reset a forgotten password with an emailed OTP.
    Recover {
        email: Option<String>,
    },
    Profile {
        #[command(subcommand)]
        action: ProfileCommand,
    },
    /// List my tasks.
    Tasks(TaskListArgs),
    Task {
        id: String,
        #[command(subcommand)]
        action: TaskCommand,
    },
    Requests {
        #[command(subcommand)]
        action: RequestCommand,
    },
    Email {
        #[command(subcommand)]
        action: EmailCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ProfileCommand {
    Show,
    Update(ProfileUpdateArgs),
    /// Save every stored document into a directory.
    Download {
        #[arg(default_value = ".")]
        dir: PathBuf,
    },
}

#[derive(Args, Debug, Default)]
struct ProfileUpdateArgs {
    #[arg(long, default_value = "")]
    name: String,
    #[arg(long, default_value = "")]
    age: String,
    #[arg(long, default_value = "")]
    gender: String,
    #[arg(long = "contact")]
    contacts: Vec<String>,
    #[arg(long, default_value = "")]
    account_number: String,
    #[arg(long, default_value = "")]
    confirm_account_number: String,
    #[arg(long, default_value = "")]
    branch: String,
    #[arg(long, default_value = "")]
    university: String,
    #[arg(long, default_value = "")]
    country: String,
    #[arg(long, default_value = "")]
    current_email: String,
    /// `kind=path`, e.g. `passport=./scan.pdf`; repeat for more files.
    #[arg(long = "document")]
    documents: Vec<String>,
}

#[derive(Args, Debug, Default)]
struct TaskListArgs {
    #[arg(long)]
    status: Option<String>,
    #[arg(long)]
    assigned: Option<String>,
    #[arg(long)]
    company: Option<String>,
    /// First deadline day, `YYYY-MM-DD`.
    #[arg(long)]
    from: Option<String>,
    /// Last deadline day, `YYYY-MM-DD`.
    #[arg(long)]
    to: Option<String>,
    #[arg(long, default_value_t = 1)]
    page: usize,
}

#[derive(Subcommand, Debug)]
enum TaskCommand {
    Show,
    Status {
        status: String,
        /// Keeps the current assignee when omitted.
        #[arg(long)]
        assigned: Option<String>,
    },
    Comment {
        text: String,
    },
    Reply {
        comment_id: String,
        text: String,
    },
    DeleteComment {
        comment_id: String,
    },
    Delete,
}

#[derive(Subcommand, Debug)]
enum RequestCommand {
    List,
    New { title: String, description: String },
    Comment { id: String, text: String },
}

#[derive(Subcommand, Debug)]
enum EmailCommand {
    List {
        student_id: String,
    },
    Send {
        student_id: String,
        /// First line becomes the subject.
        message: Option<String>,
        #[arg(long = "attach")]
        attachments: Vec<PathBuf>,
        /// Quote an earlier email from the same mailbox.
        #[arg(long)]
        reply_to: Option<String>,
    },
}

async fn run_command(portal: &PortalClient, command: Command, assume_yes: bool) -> Result<()> {
    if !command.needs_session() {
        return commands::run(portal, command, assume_yes).await;
    }
    commands::require_session(portal).await?;
    let keep_alive = portal.spawn_keep_alive(KEEP_ALIVE_INTERVAL);
    let outcome = commands::run(portal, command, assume_yes).await;
    keep_alive.abort();
    outcome
}

impl Command {
    fn needs_session(&self) -> bool {
        !matches!(
            self,
            Command::Login { .. } | Command::Logout | Command::Recover { .. }
        )
    }
}

/// An unreadable credentials file leaves the client signed out so that
/// `login` and `logout` can still replace it.
async fn load_credentials(path: &Path) -> CredentialContext {
    let credentials = CredentialContext::new();
    if let Err(err) = credentials.load_from(path).await {
        warn!(path = %path.display(), error = %format!("{err:#}"), "ignoring stored credentials");
    }
    credentials
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(&Overrides {
        backend_url: cli.global.backend_url.clone(),
        credentials_path: cli.global.credentials.clone(),
        log_filter: cli.global.log.clone(),
    })?;

    let filter = EnvFilter::try_new(&settings.log_filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    debug!(backend_url = %settings.backend_url, credentials = %settings.credentials_path.display(), "settings loaded");

    let credentials = load_credentials(&settings.credentials_path).await;
    let portal = PortalClient::connect(&settings.backend_url, credentials)
        .with_context(|| format!("cannot use backend '{}'", settings.backend_url))?;
    let mut toasts = portal.subscribe_notifications();

    let outcome = run_command(&portal, cli.command, cli.global.yes).await;

    while let Ok(toast) = toasts.try_recv() {
        terminal::print_notification(&toast);
    }

    // Persist whatever session state the command left behind, including a logout.
    portal
        .credentials()
        .save_to(&settings.credentials_path)
        .await?;
    debug!("command finished");
    outcome
}
