use thiserror::Error;

/// Failures while pulling a market snapshot.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected status {status} from {endpoint}")]
    Status { endpoint: String, status: u16 },

    #[error("Malformed response: {0}")]
    Malformed(String),
}

/// Failures while delivering a notification.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Message to chat {chat_id} rejected: {description}")]
    Rejected { chat_id: i64, description: String },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing configuration value: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },

    #[error("Config watch error: {0}")]
    Watch(#[from] notify::Error),
}
