//! One polling loop per monitored chat.
//!
//! Three timers share a single `select!`: detection (qualify, evict, pump),
//! the status digest and an optional debug dump of the registry. Each
//! handler runs to completion before the loop waits again, so a timer's
//! handler never overlaps itself. Cancellation is checked before every wait.

use crate::api::binance::{fetch_snapshot, SnapshotSource};
use crate::api::telegram::Recipient;
use crate::config::{non_zero_period, Config, ThresholdConfig};
use crate::error::{ConfigError, SourceError};
use crate::logging::log_pump_event;
use crate::tracking::detection::{detect, Detection};
use crate::tracking::digest::{render_pump, render_qualified, render_status, status_entries};
use crate::tracking::registry::Registry;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub detection_interval: Duration,
    pub digest_interval: Duration,
    pub debug_interval: Option<Duration>,
    pub quote_asset: String,
    pub event_log_folder: Option<PathBuf>,
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            detection_interval: non_zero_period("DETECTION_INTERVAL_SECONDS", config.detection_interval_seconds)?,
            digest_interval: non_zero_period("DIGEST_INTERVAL_SECONDS", config.digest_interval_seconds)?,
            debug_interval: (config.debug_interval_seconds > 0)
                .then(|| Duration::from_secs(config.debug_interval_seconds)),
            quote_asset: config.quote_asset.clone(),
            event_log_folder: Some(config.event_log_folder.trim())
                .filter(|folder| !folder.is_empty())
                .map(PathBuf::from),
        })
    }
}

pub struct Session {
    settings: SessionSettings,
    source: Arc<dyn SnapshotSource>,
    primary: Recipient,
    pump_recipient: Option<Recipient>,
    registry: Arc<Registry>,
    thresholds: Arc<ThresholdConfig>,
}

impl Session {
    pub fn new(
        settings: SessionSettings,
        source: Arc<dyn SnapshotSource>,
        primary: Recipient,
        thresholds: Arc<ThresholdConfig>,
    ) -> Self {
        Self {
            settings,
            source,
            primary,
            pump_recipient: None,
            registry: Arc::new(Registry::new()),
            thresholds,
        }
    }

    /// Sends pump events to a separate chat instead of the primary one.
    pub fn with_pump_recipient(mut self, recipient: Recipient) -> Self {
        self.pump_recipient = Some(recipient);
        self
    }

    /// Shares an existing registry, e.g. with a second loop for the same user.
    pub fn with_registry(mut self, registry: Arc<Registry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    pub fn primary_chat_id(&self) -> i64 {
        self.primary.chat_id
    }

    fn pump_recipient(&self) -> &Recipient {
        self.pump_recipient.as_ref().unwrap_or(&self.primary)
    }

    /// Runs one detection pass. A failed fetch returns before the registry is touched.
    pub async fn detection_tick(&self) -> Result<Detection, SourceError> {
        let snapshot = fetch_snapshot(self.source.as_ref()).await?;
        let thresholds = self.thresholds.current();
        let tracked = self.registry.snapshot();

        let detection = detect(&snapshot, &tracked, &thresholds, Utc::now());
        detection.apply(&self.registry);

        if !detection.evicted.is_empty() {
            info!("Evicted {} cooled symbols: {:?}", detection.evicted.len(), detection.evicted);
        }

        if let Some(message) = render_qualified(&detection.qualified, &self.settings.quote_asset) {
            info!("{} newly tracked symbols", detection.qualified.len());
            if let Err(e) = self.primary.send(&message).await {
                error!("Error sending message to chat {}: {}", self.primary.chat_id, e);
            }
        }

        let recipient = self.pump_recipient();
        for pump in &detection.pumps {
            if let Some(folder) = &self.settings.event_log_folder {
                log_pump_event(folder, pump);
            }
            let message = render_pump(pump, &self.settings.quote_asset);
            if let Err(e) = recipient.send(&message).await {
                error!("Error sending pump message to chat {}: {}", recipient.chat_id, e);
            }
        }

        Ok(detection)
    }

    /// Refreshes every tracked symbol and reports them in one message.
    /// Returns how many symbols were reported.
    pub async fn digest_tick(&self) -> Result<usize, SourceError> {
        let snapshot = fetch_snapshot(self.source.as_ref()).await?;
        let entries = status_entries(&snapshot, &self.registry.snapshot());

        for entry in &entries {
            // Merge onto the live record; skip symbols evicted since the copy was taken.
            if let Some(current) = self.registry.get(&entry.symbol.symbol) {
                self.registry.upsert(
                    current.refreshed(entry.symbol.last_observed_price, entry.symbol.change_percent),
                );
            }
        }

        if let Some(message) = render_status(&entries, &self.settings.quote_asset) {
            if let Err(e) = self.primary.send(&message).await {
                error!("Error sending digest to chat {}: {}", self.primary.chat_id, e);
            }
        }
        Ok(entries.len())
    }

    pub fn debug_tick(&self) {
        let tracked = self.registry.snapshot();
        if tracked.is_empty() {
            info!("Tracked symbols: none");
        }
        for symbol in tracked.values() {
            info!(
                "Symbol: {}, reference: {}, last: {}, Ch24h: {:.2}%, since: {}, pump notified: {}",
                symbol.symbol,
                symbol.reference_price,
                symbol.last_observed_price,
                symbol.change_percent,
                symbol.tracked_since,
                symbol.pump_notified
            );
        }
    }

    /// Drives the timers until `cancel` flips to true or its sender is dropped.
    pub async fn run(self, mut cancel: watch::Receiver<bool>) {
        let start = Instant::now();
        let mut detection = timer(start, self.settings.detection_interval);
        let mut digest = timer(start, self.settings.digest_interval);
        let mut debug = self.settings.debug_interval.map(|period| timer(start, period));

        info!("Session for chat {} started", self.primary.chat_id);
        loop {
            if *cancel.borrow() {
                break;
            }
            // Branch order is random; each work arm rechecks cancellation first.
            tokio::select! {
                changed = cancel.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = detection.tick() => {
                    if *cancel.borrow() {
                        break;
                    }
                    if let Err(e) = self.detection_tick().await {
                        warn!("Detection tick skipped: {}", e);
                    }
                }
                _ = digest.tick() => {
                    if *cancel.borrow() {
                        break;
                    }
                    if let Err(e) = self.digest_tick().await {
                        warn!("Digest tick skipped: {}", e);
                    }
                }
                _ = optional_tick(&mut debug) => {
                    if *cancel.borrow() {
                        break;
                    }
                    self.debug_tick();
                }
            }
        }
        info!("Session for chat {} stopped", self.primary.chat_id);
    }

    pub fn spawn(self) -> SessionHandle {
        let (cancel, cancelled) = watch::channel(false);
        let registry = self.registry();
        let chat_id = self.primary.chat_id;
        let task = tokio::spawn(self.run(cancelled));
        SessionHandle {
            chat_id,
            cancel,
            registry,
            task,
        }
    }
}

/// First firing one full period after start, late firings skipped rather than bunched.
fn timer(start: Instant, period: Duration) -> Interval {
    let mut timer = interval_at(start + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    timer
}

async fn optional_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Control side of a spawned session.
pub struct SessionHandle {
    chat_id: i64,
    cancel: watch::Sender<bool>,
    registry: Arc<Registry>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    pub fn chat_id(&self) -> i64 {
        self.chat_id
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    /// Asks the loop to stop at its next iteration.
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancels and waits for the loop to return.
    pub async fn stop(self) {
        self.cancel();
        if let Err(e) = self.task.await {
            error!("Session for chat {} ended abnormally: {}", self.chat_id, e);
        }
    }
}
