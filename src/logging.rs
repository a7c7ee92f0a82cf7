use crate::types::PumpEvent;
use std::fs::{create_dir_all, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::error;

const JOURNAL_HEADER: &str = "timestamp,symbol,reference_price,current_price,ratio,change_percent\n";

/// Formats one journal row for a pump event.
pub fn pump_event_row(event: &PumpEvent) -> String {
    format!(
        "{},{},{:.8},{:.8},{:.6},{:.2}\n",
        event.detected_at.to_rfc3339(),
        event.symbol,
        event.reference_price,
        event.current_price,
        event.ratio(),
        event.change_percent
    )
}

/// Journal file a given event lands in: one CSV per UTC day.
pub fn journal_path(folder: &Path, event: &PumpEvent) -> PathBuf {
    folder.join(format!("{}.csv", event.detected_at.format("%Y-%m-%d")))
}

/// Appends the event to the daily journal. Runs on the caller's thread.
pub fn write_pump_event(folder: &Path, event: &PumpEvent) -> std::io::Result<()> {
    create_dir_all(folder)?;
    let path = journal_path(folder, event);
    let fresh = !path.exists();
    let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
    if fresh {
        file.write_all(JOURNAL_HEADER.as_bytes())?;
    }
    file.write_all(pump_event_row(event).as_bytes())
}

/// Fire-and-forget variant used from the polling loop.
pub fn log_pump_event(folder: &Path, event: &PumpEvent) {
    let folder = folder.to_path_buf();
    let event = event.clone();
    std::thread::spawn(move || {
        if let Err(e) = write_pump_event(&folder, &event) {
            error!("❌ Failed to journal pump event for {}: {}", event.symbol, e);
        }
    });
}

/// Initialize tracing
pub fn init_tracing(
    stdout: bool,
    filter: tracing::Level,
    log_dir: &str,
    log_file: &str,
) -> tracing_appender::non_blocking::WorkerGuard {
    // Decide which output should be used
    let (writer, guard) = if stdout {
        tracing_appender::non_blocking(std::io::stdout())
    } else {
        let file_appender = tracing_appender::rolling::daily(log_dir, log_file);
        tracing_appender::non_blocking(file_appender)
    };

    tracing_subscriber::fmt()
        .with_writer(writer)
        .with_max_level(filter)
        .with_ansi(stdout)
        .with_target(false)
        .with_file(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .init();

    guard
}
