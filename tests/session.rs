use async_trait::async_trait;
use pump_watch::api::binance::SnapshotSource;
use pump_watch::api::telegram::{Notifier, Recipient};
use pump_watch::config::{ThresholdConfig, Thresholds};
use pump_watch::error::{NotifyError, SourceError};
use pump_watch::tracking::manager::SessionManager;
use pump_watch::tracking::session::{Session, SessionSettings};
use pump_watch::types::TrackedSymbol;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct FakeMarket {
    rows: Mutex<Vec<(String, f64, f64)>>,
    failing: AtomicBool,
    calls: AtomicUsize,
    delay_secs: AtomicU64,
}

impl FakeMarket {
    fn set(&self, rows: &[(&str, f64, f64)]) {
        *self.rows.lock().unwrap() = rows.iter().map(|(s, p, c)| (s.to_string(), *p, *c)).collect();
    }
}

#[async_trait]
impl SnapshotSource for FakeMarket {
    async fn get_prices(&self) -> Result<Vec<(String, f64)>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.delay_secs.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_secs(delay)).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(SourceError::Malformed("market down".to_string()));
        }
        Ok(self.rows.lock().unwrap().iter().map(|(s, p, _)| (s.clone(), *p)).collect())
    }

    async fn get_change_percents(&self) -> Result<Vec<(String, f64)>, SourceError> {
        Ok(self.rows.lock().unwrap().iter().map(|(s, _, c)| (s.clone(), *c)).collect())
    }
}

#[derive(Default)]
struct FakeChat {
    sent: Mutex<Vec<(i64, String)>>,
    failing: AtomicBool,
}

impl FakeChat {
    fn messages_to(&self, chat_id: i64) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| *id == chat_id)
            .map(|(_, text)| text.clone())
            .collect()
    }
}

#[async_trait]
impl Notifier for FakeChat {
    async fn send(&self, chat_id: i64, text: &str) -> Result<(), NotifyError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError::Rejected {
                chat_id,
                description: "blocked".to_string(),
            });
        }
        self.sent.lock().unwrap().push((chat_id, text.to_string()));
        Ok(())
    }
}

const PRIMARY: i64 = 1;
const PUMPS: i64 = 2;

fn settings() -> SessionSettings {
    SessionSettings {
        detection_interval: Duration::from_secs(5),
        digest_interval: Duration::from_secs(60),
        debug_interval: Some(Duration::from_secs(2)),
        quote_asset: "USDT".to_string(),
        event_log_folder: None,
    }
}

fn thresholds() -> Arc<ThresholdConfig> {
    Arc::new(ThresholdConfig::new(Thresholds {
        change_threshold_percent: 20.0,
        pump_threshold_ratio: 0.05,
        pump_window: Duration::from_secs(30 * 60),
    }))
}

fn session(market: &Arc<FakeMarket>, chat: &Arc<FakeChat>, pump_chat: &Arc<FakeChat>) -> Session {
    Session::new(
        settings(),
        market.clone(),
        Recipient::new(chat.clone(), PRIMARY),
        thresholds(),
    )
    .with_pump_recipient(Recipient::new(pump_chat.clone(), PUMPS))
}

#[tokio::test]
async fn detection_tick_tracks_movers_and_reports_them_sorted() {
    let market = Arc::new(FakeMarket::default());
    let chat = Arc::new(FakeChat::default());
    let pump_chat = Arc::new(FakeChat::default());
    market.set(&[
        ("AAAUSDT", 1.0, 30.0),
        ("BBBUSDT", 2.0, 45.0),
        ("CCCUSDT", 1.2345, 22.0),
        ("DDDUSDT", 4.0, 3.0),
    ]);
    let session = session(&market, &chat, &pump_chat);

    session.detection_tick().await.unwrap();

    let registry = session.registry();
    assert_eq!(registry.len(), 3);
    assert_eq!(registry.get("CCCUSDT").unwrap().reference_price, 1.2345);

    let messages = chat.messages_to(PRIMARY);
    assert_eq!(messages.len(), 1);
    let lines: Vec<&str> = messages[0].lines().collect();
    assert_eq!(lines[0], "✅ BBB / USDT P: 2 Ch24h: 45.00%");
    assert_eq!(lines[1], "✅ AAA / USDT P: 1 Ch24h: 30.00%");
    assert_eq!(lines[2], "✅ CCC / USDT P: 1.2345 Ch24h: 22.00%");
}

#[tokio::test]
async fn source_failure_leaves_registry_untouched() {
    let market = Arc::new(FakeMarket::default());
    let chat = Arc::new(FakeChat::default());
    let pump_chat = Arc::new(FakeChat::default());
    market.set(&[("ABCUSDT", 100.0, 25.0)]);
    let session = session(&market, &chat, &pump_chat);
    session.detection_tick().await.unwrap();
    let before = session.registry().snapshot();

    market.failing.store(true, Ordering::SeqCst);
    assert!(session.detection_tick().await.is_err());
    assert!(session.digest_tick().await.is_err());

    assert_eq!(session.registry().snapshot(), before);
    assert_eq!(chat.messages_to(PRIMARY).len(), 1);
}

#[tokio::test]
async fn pump_goes_to_pump_chat_once_even_if_primary_fails() {
    let market = Arc::new(FakeMarket::default());
    let chat = Arc::new(FakeChat::default());
    let pump_chat = Arc::new(FakeChat::default());
    market.set(&[("ABCUSDT", 100.0, 25.0)]);
    let session = session(&market, &chat, &pump_chat);
    session.detection_tick().await.unwrap();

    chat.failing.store(true, Ordering::SeqCst);
    market.set(&[("ABCUSDT", 104.0, 26.0), ("NEWUSDT", 1.0, 50.0)]);
    let detection = session.detection_tick().await.unwrap();
    assert!(detection.pumps.is_empty());
    assert_eq!(detection.qualified.len(), 1);

    market.set(&[("ABCUSDT", 106.0, 27.0), ("NEWUSDT", 1.0, 50.0)]);
    session.detection_tick().await.unwrap();
    session.detection_tick().await.unwrap();

    let pumps = pump_chat.messages_to(PUMPS);
    assert_eq!(pumps, vec!["🚀 ABC / USDT P: 106 Ch24h: 25.00% (PrP: 100)".to_string()]);
    let stored = session.registry().get("ABCUSDT").unwrap();
    assert!(stored.pump_notified);
    assert_eq!(stored.reference_price, 100.0);
}

#[tokio::test]
async fn digest_refreshes_prices_without_moving_baseline() {
    let market = Arc::new(FakeMarket::default());
    let chat = Arc::new(FakeChat::default());
    let pump_chat = Arc::new(FakeChat::default());
    market.set(&[("ABCUSDT", 100.0, 25.0), ("XYZUSDT", 10.0, 35.0)]);
    let session = session(&market, &chat, &pump_chat);
    session.detection_tick().await.unwrap();

    market.set(&[("ABCUSDT", 102.0, 40.0), ("XYZUSDT", 9.5, 30.0)]);
    assert_eq!(session.digest_tick().await.unwrap(), 2);

    let abc: TrackedSymbol = session.registry().get("ABCUSDT").unwrap();
    assert_eq!(abc.reference_price, 100.0);
    assert_eq!(abc.last_observed_price, 102.0);
    assert_eq!(abc.change_percent, 40.0);

    let messages = chat.messages_to(PRIMARY);
    assert_eq!(
        messages.last().unwrap(),
        "📈 ABC / USDT P: 102 Ch24h: 40.00%\n📉 XYZ / USDT P: 9.5 Ch24h: 30.00%\n"
    );
}

#[tokio::test]
async fn threshold_changes_apply_on_next_tick() {
    let market = Arc::new(FakeMarket::default());
    let chat = Arc::new(FakeChat::default());
    let thresholds = thresholds();
    let session = Session::new(
        settings(),
        market.clone(),
        Recipient::new(chat.clone(), PRIMARY),
        Arc::clone(&thresholds),
    );
    market.set(&[("ABCUSDT", 1.0, 25.0)]);
    session.detection_tick().await.unwrap();
    assert!(session.registry().is_tracked("ABCUSDT"));

    thresholds.set_change_threshold_percent(30.0).unwrap();
    session.detection_tick().await.unwrap();
    assert!(!session.registry().is_tracked("ABCUSDT"));
}

#[tokio::test(start_paused = true)]
async fn spawned_session_runs_timers_until_stopped() {
    let market = Arc::new(FakeMarket::default());
    let chat = Arc::new(FakeChat::default());
    let pump_chat = Arc::new(FakeChat::default());
    market.set(&[("ABCUSDT", 100.0, 25.0)]);

    let handle = session(&market, &chat, &pump_chat).spawn();
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(handle.registry().is_empty());

    tokio::time::sleep(Duration::from_secs(4)).await;
    assert!(handle.registry().is_tracked("ABCUSDT"));

    tokio::time::sleep(Duration::from_secs(60)).await;
    let messages = chat.messages_to(PRIMARY);
    assert!(messages.iter().any(|m| m.starts_with("🔹 ABC / USDT")));

    handle.stop().await;
    let calls = market.calls.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(market.calls.load(Ordering::SeqCst), calls);
}

#[tokio::test(start_paused = true)]
async fn slow_detection_does_not_starve_the_digest() {
    let market = Arc::new(FakeMarket::default());
    let chat = Arc::new(FakeChat::default());
    let pump_chat = Arc::new(FakeChat::default());
    market.set(&[("ABCUSDT", 100.0, 25.0)]);
    // Longer than the 5s detection period, so its timer is always ready again.
    market.delay_secs.store(6, Ordering::SeqCst);

    let handle = session(&market, &chat, &pump_chat).spawn();
    tokio::time::sleep(Duration::from_secs(200)).await;

    let messages = chat.messages_to(PRIMARY);
    assert!(messages.iter().any(|m| m.starts_with("🔹 ABC / USDT")));
    handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn failing_source_never_ends_the_session() {
    let market = Arc::new(FakeMarket::default());
    let chat = Arc::new(FakeChat::default());
    let pump_chat = Arc::new(FakeChat::default());
    market.failing.store(true, Ordering::SeqCst);

    let handle = session(&market, &chat, &pump_chat).spawn();
    tokio::time::sleep(Duration::from_secs(21)).await;
    assert!(!handle.is_finished());
    assert!(market.calls.load(Ordering::SeqCst) >= 4);

    market.failing.store(false, Ordering::SeqCst);
    market.set(&[("ABCUSDT", 1.0, 25.0)]);
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(handle.registry().is_tracked("ABCUSDT"));
    handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn manager_replaces_and_stops_sessions_per_chat() {
    let market = Arc::new(FakeMarket::default());
    let chat = Arc::new(FakeChat::default());
    let pump_chat = Arc::new(FakeChat::default());
    let manager = SessionManager::new();

    manager.start(session(&market, &chat, &pump_chat)).await;
    manager.start(session(&market, &chat, &pump_chat)).await;
    assert_eq!(manager.len(), 1);
    assert!(manager.is_running(PRIMARY));

    assert!(manager.stop(PRIMARY).await);
    assert!(!manager.stop(PRIMARY).await);
    assert!(manager.is_empty());

    manager.start(session(&market, &chat, &pump_chat)).await;
    manager.stop_all().await;
    assert!(manager.is_empty());
}
