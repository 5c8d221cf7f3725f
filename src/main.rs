//! # DailyRead — daily reading reminders
//!
//! Usage:
//!   dailyread enable --time 20:00            # Ask permission, arm the reminder
//!   dailyread set-time 07:30                 # Move it
//!   dailyread test --message "Hello"         # Deliver one right away
//!   dailyread status                         # Permission + next reminder
//!   dailyread run                            # Restore and keep delivering

use std::sync::Arc;

use anyhow::Result;
use chrono::Local;
use clap::{Parser, Subcommand};
use dailyread_core::DailyReadConfig;
use dailyread_core::config::StorageBackend;
use dailyread_scheduler::{
    JsonFileStore, LocalAgentHost, NotificationPlatform, NotificationService, NotificationTemplate,
    NotifyError, PermissionStatus, RestoreGuard, ScheduleStore, SqliteStore, SystemClock,
    TerminalPlatform, bootstrap,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dailyread", version, about = "📖 DailyRead — daily reading reminders")]
struct Cli {
    /// Config file (default: ~/.dailyread/config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Turn the daily reminder on
    Enable {
        /// Time of day, HH:MM (default from config)
        #[arg(short, long)]
        time: Option<String>,
        #[arg(short, long, default_value = "")]
        message: String,
    },
    /// Turn the daily reminder off
    Disable,
    /// Change the reminder time
    SetTime { time: String },
    /// Change the reminder text
    SetMessage { message: String },
    /// Deliver a reminder right now
    Test {
        #[arg(short, long, default_value = "")]
        message: String,
    },
    /// Show permission and schedule
    Status,
    /// Restore the saved schedule and deliver until Ctrl-C
    Run,
}

fn load_config(path: Option<&str>) -> Result<DailyReadConfig> {
    let config = match path {
        Some(p) => {
            let expanded = shellexpand::tilde(p).to_string();
            DailyReadConfig::load_from(std::path::Path::new(&expanded))?
        }
        None => DailyReadConfig::load()?,
    };
    Ok(config)
}

fn open_store(config: &DailyReadConfig) -> Result<Arc<dyn ScheduleStore>> {
    let dir = config.storage.resolved_dir();
    let store: Arc<dyn ScheduleStore> = match config.storage.backend {
        StorageBackend::Json => Arc::new(JsonFileStore::new(&dir)),
        StorageBackend::Sqlite => Arc::new(SqliteStore::open(&dir.join("dailyread.db"))?),
    };
    Ok(store)
}

/// Print the user-facing copy for unavailable notifications, otherwise propagate.
fn report(err: NotifyError, permission: PermissionStatus) -> Result<()> {
    if matches!(err, NotifyError::PermissionDenied) && permission == PermissionStatus::Unset {
        // Never asked; the platform already said why.
        return Ok(());
    }
    if err.is_unavailable() {
        println!("⚠️  {}", err.user_message());
        return Ok(());
    }
    Err(err.into())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "dailyread=debug,dailyread_scheduler=debug,dailyread_core=debug"
    } else {
        "dailyread=info,dailyread_scheduler=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config = load_config(cli.config.as_deref())?;
    let store = open_store(&config)?;
    let platform: Arc<dyn NotificationPlatform> = Arc::new(TerminalPlatform::new(
        config.storage.resolved_dir().join(&config.platform.permission_file),
    ));
    let host = Arc::new(LocalAgentHost::new(
        platform.clone(),
        NotificationTemplate::new(config.notifications.clone()),
    ));
    let service = NotificationService::new(&config, Arc::new(SystemClock), store, platform, host);

    match cli.command {
        Command::Enable { time, message } => {
            let time = time.unwrap_or_else(|| config.notifications.default_time.clone());
            match service.enable_notifications(&time, &message).await {
                Ok(at) => {
                    println!("✅ Daily reminder at {time}, next: {}", at.with_timezone(&Local));
                }
                Err(e) => return report(e, service.gate().current_status()),
            }
        }
        Command::Disable => {
            service.disable_notifications().await?;
            println!("🚫 Daily reminder disabled");
        }
        Command::SetTime { time } => {
            bootstrap(&service, &RestoreGuard::new()).await;
            let at = service.update_notification_time(&time).await?;
            println!("✅ Reminder moved to {time}, next: {}", at.with_timezone(&Local));
        }
        Command::SetMessage { message } => {
            bootstrap(&service, &RestoreGuard::new()).await;
            service.update_notification_message(&message).await?;
            println!("✅ Reminder text updated");
        }
        Command::Test { message } => {
            if let Err(e) = service.gate().ensure_granted().await {
                return report(e, service.gate().current_status());
            }
            let route = service.send_test_notification(&message).await?;
            println!("✅ Test reminder delivered ({route:?})");
        }
        Command::Status => {
            let status = service.saved_status()?;
            println!("📖 DailyRead");
            println!("   Permission: {}", status.permission);
            println!("   Scheduled:  {}", status.scheduled);
            if let Some(at) = status.next_fire_at {
                println!("   Next:       {}", at.with_timezone(&Local));
            }
        }
        Command::Run => {
            let outcome = bootstrap(&service, &RestoreGuard::new()).await;
            tracing::info!("🚀 DailyRead running ({outcome:?})");
            let driver = service.spawn_driver();
            tokio::signal::ctrl_c().await?;
            driver.abort();
            tracing::info!("👋 Shutting down");
        }
    }

    Ok(())
}
