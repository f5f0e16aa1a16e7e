//! WebClicker Bot - CLI entry point
//!
//! Acquires a browser session, then hands control to the watch loop until
//! ctrl-c. Loop-phase failures are logged and exit cleanly; only a failed
//! session acquisition aborts with an error.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::Notify;
use tracing::{error, info};
use url::Url;

use webclicker_bot::bot::{self, PollWatcher};
use webclicker_bot::browser::{BrowserSession, BrowserSessionConfig, PageDom};
use webclicker_bot::{Credentials, WatcherConfig};

/// Automatically answer WebClicker polls with a random choice.
#[derive(Parser, Debug)]
#[command(name = "webclicker-bot", version, about)]
struct Cli {
    /// WebClicker page URL.
    #[arg(long)]
    url: Url,

    /// Seconds between poll-state checks.
    #[arg(long, default_value_t = 5)]
    interval: u64,

    /// Run the browser without a visible window.
    #[arg(long)]
    headless: bool,

    /// Username for login.
    #[arg(long)]
    username: Option<String>,

    /// Password for login.
    #[arg(long)]
    password: Option<String>,

    /// Recognized answer-choice labels for the fallback button scan.
    #[arg(long, value_delimiter = ',', default_values_t = webclicker_bot::default_answer_labels())]
    labels: Vec<String>,

    /// Stop after this many checks (0 = run until interrupted).
    #[arg(long, default_value_t = 0)]
    max_cycles: u64,
}

impl Cli {
    fn watcher_config(&self) -> WatcherConfig {
        // Login is attempted only when both halves are present.
        let credentials = match (&self.username, &self.password) {
            (Some(username), Some(password)) => Some(Credentials {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => None,
        };

        WatcherConfig {
            url: self.url.to_string(),
            check_interval_secs: self.interval,
            answer_labels: self.labels.clone(),
            max_cycles: self.max_cycles,
            credentials,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = webclicker_bot::init_logging();

    info!("Starting WebClicker automation - connecting to {}", cli.url);
    if let Some(dir) = webclicker_bot::log_dir() {
        info!("Log files saved to: {}", dir.display());
    }

    let session_config = BrowserSessionConfig::with_scratch_profile().headless(cli.headless);
    let session = Arc::new(
        BrowserSession::acquire(session_config)
            .await
            .context("could not initialize a browser session; make sure Chrome is installed")?,
    );

    let mut watcher = PollWatcher::new(PageDom::new(session.clone()), cli.watcher_config());

    let is_running = Arc::new(AtomicBool::new(true));
    let shutdown = Arc::new(Notify::new());
    {
        let is_running = is_running.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Automation stopped by user");
                is_running.store(false, Ordering::Relaxed);
                shutdown.notify_one();
            }
        });
    }

    if let Err(e) =
        bot::run_to_completion(session.as_ref(), &mut watcher, &is_running, &shutdown).await
    {
        error!("Unexpected error: {e}");
    }

    info!("WebClicker automation stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["webclicker-bot", "--url", "http://poll.example/class"])
            .unwrap();
        assert_eq!(cli.interval, 5);
        assert!(!cli.headless);
        assert_eq!(cli.labels, vec!["A", "B"]);
        assert_eq!(cli.max_cycles, 0);
        assert!(cli.username.is_none());
    }

    #[test]
    fn test_url_is_required_and_validated() {
        assert!(Cli::try_parse_from(["webclicker-bot"]).is_err());
        assert!(Cli::try_parse_from(["webclicker-bot", "--url", "not a url"]).is_err());
    }

    #[test]
    fn test_credentials_require_both_halves() {
        let cli = Cli::try_parse_from([
            "webclicker-bot",
            "--url",
            "http://poll.example/class",
            "--username",
            "student",
        ])
        .unwrap();
        assert!(cli.watcher_config().credentials.is_none());

        let cli = Cli::try_parse_from([
            "webclicker-bot",
            "--url",
            "http://poll.example/class",
            "--username",
            "student",
            "--password",
            "hunter2",
        ])
        .unwrap();
        let credentials = cli.watcher_config().credentials.unwrap();
        assert_eq!(credentials.username, "student");
        assert_eq!(credentials.password, "hunter2");
    }

    #[test]
    fn test_custom_label_set() {
        let cli = Cli::try_parse_from([
            "webclicker-bot",
            "--url",
            "http://poll.example/class",
            "--labels",
            "A,B,C,D,E",
        ])
        .unwrap();
        assert_eq!(cli.labels, vec!["A", "B", "C", "D", "E"]);
    }
}
