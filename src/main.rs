mod api;
mod app;
mod auth;
mod cache;
mod commands;
mod config;
mod error;
mod event;
mod model;
mod mutation;
mod notifications;
mod ui;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;

use api::{CachedBoardClient, HttpApi, MockApi, TaskApi};
use auth::SessionStore;
use config::{Backend, Config};

#[derive(Parser, Debug)]
#[command(name = "taskboard")]
#[command(about = "A task board shell with optimistic updates")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/taskboard/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Project to open on start
  #[arg(short, long)]
  project: Option<String>,

  #[command(subcommand)]
  command: Option<CliCommand>,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
  /// Log in and store the session (password from TASKBOARD_PASSWORD)
  Login {
    #[arg(short, long)]
    email: String,
  },
  /// Forget the stored session
  Logout,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;

  // Override project if specified on command line
  let config = if let Some(project) = args.project {
    Config {
      default_project: Some(project),
      ..config
    }
  } else {
    config
  };

  let _guard = init_logging(&config.log.level, &config.log_file()?)?;

  match args.command {
    Some(CliCommand::Login { email }) => login(&config, &email).await,
    Some(CliCommand::Logout) => logout(),
    None => run_shell(config).await,
  }
}

/// Route tracing output to a file; stdout belongs to the shell.
fn init_logging(level: &str, log_path: &Path) -> Result<WorkerGuard> {
  let log_dir = match log_path.parent() {
    Some(dir) if !dir.as_os_str().is_empty() => dir,
    _ => Path::new("."),
  };
  let file_name = log_path
    .file_name()
    .and_then(|name| name.to_str())
    .ok_or_else(|| eyre!("Invalid log file path: {}", log_path.display()))?;
  std::fs::create_dir_all(log_dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", log_dir.display(), e))?;

  let file_appender = tracing_appender::rolling::never(log_dir, file_name);
  let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

  let env_filter = tracing_subscriber::EnvFilter::try_from_env("TASKBOARD_LOG")
    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

  tracing_subscriber::fmt()
    .with_writer(non_blocking)
    .with_env_filter(env_filter)
    .with_ansi(false)
    .init();

  Ok(guard)
}

async fn login(config: &Config, email: &str) -> Result<()> {
  if config.api.backend != Backend::Remote {
    return Err(eyre!("Login is only needed with `api.backend: remote`"));
  }

  let password = Config::get_password()?;
  let api = HttpApi::new(&config.api, None)?;
  let session = api
    .login(email, &password)
    .await
    .map_err(|e| eyre!("Login failed: {}", e))?;

  let store = SessionStore::open()?;
  store.save(&session)?;
  info!(user = %session.user.id, "logged in");
  println!(
    "Logged in as {} (session saved to {})",
    session.user.email,
    store.path().display()
  );
  Ok(())
}

fn logout() -> Result<()> {
  SessionStore::open()?.clear()?;
  println!("Logged out");
  Ok(())
}

/// Pick the backend named in the config.
fn build_api(config: &Config) -> Result<Arc<dyn TaskApi>> {
  match config.api.backend {
    Backend::Mock => {
      info!("using in-memory backend");
      Ok(Arc::new(MockApi::new()))
    }
    Backend::Remote => {
      let token = match Config::get_api_token() {
        Some(token) => Some(token),
        None => SessionStore::open()?.load()?.map(|session| session.token),
      };
      if token.is_none() {
        warn!("no session, requests will fail until login");
        eprintln!("Not logged in. Run `taskboard login --email <email>` first.");
      }
      info!(url = %config.api.url, "using remote backend");
      Ok(Arc::new(HttpApi::new(&config.api, token)?))
    }
  }
}

async fn run_shell(config: Config) -> Result<()> {
  let api = build_api(&config)?;
  let client = CachedBoardClient::new(api, &config.cache);

  let events = event::EventHandler::new(client.cache().subscribe());
  let mut app = app::App::new(
    client,
    config.default_project.clone(),
    events.sender(),
    std::io::stdout(),
  );
  app.run(events).await?;

  Ok(())
}
