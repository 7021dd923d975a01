mod render;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use console::style;
use render::{ConsoleObserver, print_session_header};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tripstream_core::config::constants::defaults;
use tripstream_core::{
    Backoff, ConfigManager, HttpTransport, RetryConfig, SessionController, SessionState,
    StreamRequest, SystemClock, TripstreamConfig, open_store,
};

const DEFAULT_LOG_FILTER: &str = "tripstream=info,tripstream_core=info";

#[derive(Parser, Debug)]
#[command(
    name = "tripstream",
    version,
    about = "Stream travel plans from the discovery backend and resume saved sessions"
)]
struct Cli {
    /// Explicit config file; otherwise tripstream.toml is searched for
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the stream endpoint from the config
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Workspace root; defaults to current directory
    #[arg(long, global = true)]
    workspace: Option<PathBuf>,

    /// Print every event and technical error details
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start a stream and reconcile it into a stored session
    Stream {
        /// Prompt sent to the backend
        #[arg(long, short)]
        message: String,

        /// Backend domain, e.g. itinerary, accommodation, dining
        #[arg(long, short, default_value = defaults::DEFAULT_DOMAIN)]
        domain: String,

        #[arg(long)]
        city: Option<String>,

        /// Reuse a session id instead of generating one
        #[arg(long)]
        session_id: Option<String>,

        /// Print the final data as JSON on stdout
        #[arg(long)]
        json: bool,
    },

    /// Print a stored session; the most recent one when no id is given
    Show { session_id: Option<String> },

    /// Remove one stored session, or all of them
    Clear { session_id: Option<String> },

    /// Write a sample tripstream.toml into the workspace
    Init {
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(DEFAULT_LOG_FILTER))
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .try_init();

    let args = Cli::parse();
    let workspace = match args.workspace.clone() {
        Some(workspace) => workspace,
        None => std::env::current_dir().context("cannot determine current dir")?,
    };

    if let Commands::Init { force } = args.command {
        return init_config(&workspace, force);
    }

    let mut manager = match &args.config {
        Some(path) => ConfigManager::load_from_file(path)?,
        None => ConfigManager::load_from_workspace(&workspace)?,
    };
    if let Some(endpoint) = &args.endpoint {
        manager.config_mut().stream.endpoint = endpoint.clone();
    }
    if let Some(path) = manager.config_path() {
        tracing::debug!(path = %path.display(), "loaded configuration");
    }
    let config = manager.into_config();

    match args.command {
        Commands::Stream {
            message,
            domain,
            city,
            session_id,
            json,
        } => {
            let mut request = StreamRequest::new(message, domain);
            request.city = city;
            request.session_id = session_id;
            stream(config, request, args.verbose, json).await
        }
        Commands::Show { session_id } => show(&config, session_id.as_deref()),
        Commands::Clear { session_id } => clear(&config, session_id.as_deref()),
        Commands::Init { .. } => Ok(()),
    }
}

async fn stream(
    config: TripstreamConfig,
    request: StreamRequest,
    verbose: bool,
    json: bool,
) -> Result<()> {
    let store = open_store(&config.storage, Arc::new(SystemClock))?;
    let transport = HttpTransport::with_config(&config.stream.endpoint, config.client.clone())?;
    let controller = Arc::new(
        SessionController::new(Arc::new(transport), store, config.stream.clone())
            .with_backoff(Backoff::new(RetryConfig::from(&config.retry))),
    );

    let handle = controller.start(request, Arc::new(ConsoleObserver { verbose }));
    let session_id = handle.session_id().to_string();
    eprintln!(
        "{} session {}",
        style("tripstream:").yellow().bold(),
        style(&session_id).bold()
    );

    let interrupt = {
        let controller = Arc::clone(&controller);
        let session_id = session_id.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                controller.abort(&session_id);
            }
        })
    };

    let outcome = handle.wait().await?;
    interrupt.abort();

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome.data)?);
    }

    match outcome.state {
        SessionState::Complete => Ok(()),
        SessionState::Aborted => {
            eprintln!(
                "{} aborted; resume with `tripstream show {session_id}`",
                style("tripstream:").yellow().bold()
            );
            Ok(())
        }
        state => match outcome.error {
            Some(error) => bail!("stream {state}: {}", error.technical_message),
            None => bail!("stream ended in state {state}"),
        },
    }
}

fn show(config: &TripstreamConfig, session_id: Option<&str>) -> Result<()> {
    let store = open_store(&config.storage, Arc::new(SystemClock))?;
    let session = match session_id {
        Some(id) => store.load(id)?,
        None => store.latest()?,
    };

    match session {
        Some(session) => {
            print_session_header(&session);
            println!("{}", serde_json::to_string_pretty(&session)?);
        }
        None => match session_id {
            Some(id) => eprintln!("session {id} not found"),
            None => eprintln!("no stored sessions"),
        },
    }
    Ok(())
}

fn clear(config: &TripstreamConfig, session_id: Option<&str>) -> Result<()> {
    let store = open_store(&config.storage, Arc::new(SystemClock))?;
    match session_id {
        Some(id) => {
            if store.remove(id)? {
                eprintln!("removed session {id}");
            } else {
                eprintln!("session {id} not found");
            }
        }
        None => {
            let removed = store.clear()?;
            eprintln!("removed {removed} sessions");
        }
    }
    Ok(())
}

fn init_config(workspace: &std::path::Path, force: bool) -> Result<()> {
    match TripstreamConfig::bootstrap_project(workspace, force)? {
        Some(path) => {
            eprintln!(
                "{} wrote {}",
                style("✓").green().bold(),
                path.display()
            );
            Ok(())
        }
        None => {
            eprintln!("tripstream.toml already exists; pass --force to overwrite");
            Ok(())
        }
    }
}
