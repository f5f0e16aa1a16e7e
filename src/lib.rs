//! WebClicker Bot
//!
//! Drives a Chrome/Chromium browser against a WebClicker classroom-response
//! page, detects active polls, and answers each one with a uniformly random
//! choice.

pub mod bot;
pub mod browser;
pub mod login;
pub mod poll;

use std::path::PathBuf;

/// Login credentials, present only when both halves were supplied.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Watcher configuration
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatcherConfig {
    /// Target page URL
    pub url: String,
    /// Seconds between poll-state checks (the CLI default is 5)
    pub check_interval_secs: u64,
    /// Trimmed button texts the fallback scan recognizes as answer choices.
    /// The poll UI can render up to five options (A-E), but only A and B have
    /// been observed as plain lettered buttons; widen this set per deployment
    /// rather than assuming the full alphabet.
    pub answer_labels: Vec<String>,
    /// Stop after this many checks (0 = run until interrupted)
    pub max_cycles: u64,
    /// Optional login credentials
    pub credentials: Option<Credentials>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            check_interval_secs: 10,
            answer_labels: default_answer_labels(),
            max_cycles: 0,
            credentials: None,
        }
    }
}

/// The default recognized answer-label set.
pub fn default_answer_labels() -> Vec<String> {
    vec!["A".to_string(), "B".to_string()]
}

/// Get log directory path
pub fn log_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("webclicker-bot").join("logs"))
}

/// Initialize logging: console layer plus a daily-rolling file when a log
/// directory is available. Called once at startup; the returned guard must be
/// held for the life of the process so buffered log lines are flushed.
pub fn init_logging() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false);

    if let Some(log_dir) = log_dir() {
        let _ = std::fs::create_dir_all(&log_dir);
        let file_appender = tracing_appender::rolling::daily(&log_dir, "webclicker-bot.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(true)
            .with_writer(non_blocking);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .init();

        Some(guard)
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .init();

        None
    }
}
