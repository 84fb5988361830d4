use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use color_eyre::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tasksync::{Config, LogNotifier, SyncEngine, UserKey};

#[derive(Parser, Debug)]
#[command(name = "tasksync")]
#[command(about = "Sync a user's tracker tasks into the local task cache")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/tasksync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Email of the tracker account to sync
  #[arg(short, long)]
  email: String,

  /// Chat identity the synced tasks belong to
  #[arg(long)]
  chat_id: i64,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let config = Config::load(args.config.as_deref())?;

  let log_dir = dirs::data_dir()
    .map(|d| d.join("tasksync"))
    .unwrap_or_else(|| PathBuf::from("."));
  std::fs::create_dir_all(&log_dir)?;
  let file_appender = tracing_appender::rolling::daily(&log_dir, "tasksync.log");
  let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);

  tracing_subscriber::registry()
    .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with(fmt::layer())
    .with(fmt::layer().with_ansi(false).with_writer(file_writer))
    .init();

  let token = Config::get_api_token()?;
  let engine = SyncEngine::new(&config, token, Arc::new(LogNotifier))?;

  let user = UserKey::new(args.chat_id, args.email);
  let accepted = engine.request_sync(&user).await?;
  if !accepted {
    tracing::info!("a sync for this user is already running, waiting for it");
  }

  // Poll until the background sync reaches a terminal state.
  loop {
    tokio::time::sleep(Duration::from_secs(2)).await;
    let status = engine.sync_status(user.chat_id)?;
    if !status.sync_in_progress {
      match status.last_sync_error {
        Some(reason) => println!("sync failed: {}", reason),
        None => {
          println!("sync complete: {} tasks", status.total_tasks_found);
          for task in engine.cached_tasks(user.chat_id, 20)? {
            println!(
              "  [{}] {} ({})",
              task.state_group.as_str(),
              task.title,
              task.url
            );
          }
        }
      }
      break;
    }
  }

  Ok(())
}
