use anyhow::{Context, Result};
use clap::Parser;
use pump_watch::api::binance::Binance;
use pump_watch::api::telegram::{Recipient, Telegram};
use pump_watch::config::{watch_config, Config, ThresholdConfig, DEFAULT_ENV_FILE};
use pump_watch::error::ConfigError;
use pump_watch::logging::init_tracing;
use pump_watch::tracking::manager::SessionManager;
use pump_watch::tracking::session::{Session, SessionSettings};
use std::sync::Arc;
use tracing::{info, warn, Level};

#[derive(Parser, Debug)]
#[command(about = "Watches 24h movers and reports pumps to Telegram")]
struct Args {
    /// Log to stdout instead of the rolling log file.
    #[arg(long)]
    stdout: bool,

    #[arg(long, default_value = "info")]
    log_level: Level,

    #[arg(long, default_value = DEFAULT_ENV_FILE)]
    env_file: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load(&args.env_file);
    let _guard = init_tracing(args.stdout, args.log_level, &config.log_dir, &config.log_file);
    info!("Application started with logging!");

    let token = config
        .telegram_token
        .clone()
        .ok_or(ConfigError::Missing("TELEGRAM_TOKEN"))?;
    let chat_id = config
        .telegram_chat_id
        .ok_or(ConfigError::Missing("TELEGRAM_CHAT_ID"))?;

    let thresholds = Arc::new(ThresholdConfig::from_config(&config));
    info!("Thresholds: {:?}", thresholds.current());

    let settings = SessionSettings::from_config(&config)?;
    let binance = Arc::new(Binance::new(&config.binance_base_url, &config.quote_asset));
    let primary = Recipient::new(Arc::new(Telegram::new(&token)), chat_id);

    let mut session = Session::new(settings, binance, primary.clone(), Arc::clone(&thresholds));
    match (&config.pump_telegram_token, config.pump_telegram_chat_id) {
        (Some(pump_token), Some(pump_chat_id)) => {
            session = session.with_pump_recipient(Recipient::new(Arc::new(Telegram::new(pump_token)), pump_chat_id));
        }
        (None, Some(pump_chat_id)) => {
            session = session.with_pump_recipient(Recipient::new(Arc::clone(&primary.notifier), pump_chat_id));
        }
        _ => info!("No pump chat configured, pump events go to chat {}", chat_id),
    }

    if let Err(e) = watch_config(&args.env_file, Arc::clone(&thresholds)) {
        warn!("Not watching {} for changes: {}", args.env_file, e);
    }

    let manager = SessionManager::new();
    manager.start(session).await;
    if let Err(e) = primary.send("Tracking service launched").await {
        warn!("Error sending start message: {}", e);
    }

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("Shutting down {} session(s)", manager.len());
    manager.stop_all().await;
    Ok(())
}
