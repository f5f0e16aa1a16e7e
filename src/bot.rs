//! Core watch loop
//!
//! Owns the poll state machine: observe the page, classify poll state, answer
//! newly active polls once, and pace everything with a fixed interval. The
//! loop is written against the DOM and session capability seams so the whole
//! thing runs against fakes in tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::browser::{BrowserError, BrowserSession, DomQuery};
use crate::{login, poll, WatcherConfig};

/// Phase of the poll currently shown on the page.
///
/// The answered flag lives in [`PollPhase::ActiveAnswered`]: it is set only
/// while the most recent observation is active and resets exactly on the
/// active-to-inactive transition, so a poll is never answered twice and the
/// next poll is never skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollPhase {
    /// No poll is running.
    Inactive,
    /// A poll is running and has not been answered yet.
    ActiveUnanswered,
    /// A poll is running and was already answered.
    ActiveAnswered,
}

/// Minimal session surface the watch loop depends on.
#[async_trait]
pub trait Session: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError>;
    fn is_alive(&self) -> bool;
    async fn close(&self) -> Result<(), BrowserError>;
}

#[async_trait]
impl Session for BrowserSession {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        BrowserSession::navigate(self, url).await
    }

    fn is_alive(&self) -> bool {
        BrowserSession::is_alive(self)
    }

    async fn close(&self) -> Result<(), BrowserError> {
        BrowserSession::close(self).await
    }
}

/// Watches the poll page and answers each active poll once.
pub struct PollWatcher<D> {
    dom: D,
    config: WatcherConfig,
    phase: PollPhase,
    clicks: u64,
}

impl<D: DomQuery> PollWatcher<D> {
    pub fn new(dom: D, config: WatcherConfig) -> Self {
        Self {
            dom,
            config,
            phase: PollPhase::Inactive,
            clicks: 0,
        }
    }

    /// Current phase
    pub fn phase(&self) -> PollPhase {
        self.phase
    }

    /// Number of selection attempts made so far
    pub fn clicks(&self) -> u64 {
        self.clicks
    }

    /// Run one observation of the page and take the matching transition.
    pub async fn tick(&mut self) {
        let active = poll::poll_active(&self.dom, &self.config.answer_labels).await;

        if !active {
            if self.phase != PollPhase::Inactive {
                info!("No active poll. Waiting for next poll...");
            }
            self.phase = PollPhase::Inactive;
            return;
        }

        if self.phase == PollPhase::Inactive {
            info!("Active poll detected!");
            self.phase = PollPhase::ActiveUnanswered;
        }

        if self.phase == PollPhase::ActiveUnanswered {
            let choices = poll::answer_choices(&self.dom, &self.config.answer_labels).await;
            if choices.is_empty() {
                // Stay unanswered and retry next cycle.
                warn!("Poll is active but no answer choices found");
            } else if poll::click_random(&choices).await {
                self.clicks += 1;
                self.phase = PollPhase::ActiveAnswered;
                info!("Poll answered. Waiting for next poll...");
            }
        }
    }

    /// Loop until interrupted, the session dies, or the cycle bound is hit.
    pub async fn run<S: Session>(
        &mut self,
        session: &S,
        is_running: &AtomicBool,
        shutdown: &Notify,
    ) {
        let interval = Duration::from_secs(self.config.check_interval_secs);
        let mut cycles: u64 = 0;

        while is_running.load(Ordering::Relaxed) {
            if !session.is_alive() {
                warn!("Browser session died, stopping watch loop");
                break;
            }

            self.tick().await;

            cycles += 1;
            if self.config.max_cycles > 0 && cycles >= self.config.max_cycles {
                info!("Reached cycle limit ({}), stopping", self.config.max_cycles);
                break;
            }

            tokio::select! {
                _ = shutdown.notified() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        info!("Watch loop ended (cycles: {cycles}, clicks: {})", self.clicks);
    }
}

/// Drive a full run: navigate, optional login, then the watch loop.
///
/// The session is released exactly once no matter how the run ends - normal
/// exit, error, interrupt, or a panic inside the loop.
pub async fn run_to_completion<D, S>(
    session: &S,
    watcher: &mut PollWatcher<D>,
    is_running: &AtomicBool,
    shutdown: &Notify,
) -> Result<(), BrowserError>
where
    D: DomQuery,
    S: Session,
{
    let outcome = std::panic::AssertUnwindSafe(run_inner(session, watcher, is_running, shutdown))
        .catch_unwind()
        .await;

    if let Err(e) = session.close().await {
        warn!("Failed to close browser session: {e}");
    }

    match outcome {
        Ok(result) => result,
        Err(panic_info) => {
            let panic_msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = panic_info.downcast_ref::<String>() {
                s.clone()
            } else {
                "Unknown panic".to_string()
            };
            Err(BrowserError::Unexpected(format!(
                "watch loop panicked: {panic_msg}"
            )))
        }
    }
}

async fn run_inner<D, S>(
    session: &S,
    watcher: &mut PollWatcher<D>,
    is_running: &AtomicBool,
    shutdown: &Notify,
) -> Result<(), BrowserError>
where
    D: DomQuery,
    S: Session,
{
    session.navigate(&watcher.config.url).await?;
    login::attempt_login(&watcher.dom, watcher.config.credentials.as_ref()).await;
    watcher.run(session, is_running, shutdown).await;
    Ok(())
}
