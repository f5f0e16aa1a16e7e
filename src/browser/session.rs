//! Browser session management
//!
//! Handles launching and controlling the Chrome browser instance the watcher
//! drives. The session owns the browser process and its single page; every
//! exit path releases it through [`BrowserSession::close`].

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::{Browser, BrowserConfig, Element};
use futures::StreamExt;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::BrowserError;

/// Find a Chrome/Chromium executable in well-known locations.
fn find_chrome() -> Option<PathBuf> {
    let candidates: Vec<PathBuf> = if cfg!(target_os = "windows") {
        let mut paths = vec![
            PathBuf::from(r"C:\Program Files\Google\Chrome\Application\chrome.exe"),
            PathBuf::from(r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe"),
        ];
        if let Ok(local) = std::env::var("LOCALAPPDATA") {
            paths.push(PathBuf::from(format!(
                r"{}\Google\Chrome\Application\chrome.exe",
                local
            )));
        }
        paths
    } else if cfg!(target_os = "macos") {
        vec![
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"),
            PathBuf::from("/Applications/Chrome.app/Contents/MacOS/Chrome"),
        ]
    } else {
        vec![
            PathBuf::from("/usr/bin/google-chrome"),
            PathBuf::from("/usr/bin/google-chrome-stable"),
            PathBuf::from("/usr/bin/chromium"),
            PathBuf::from("/usr/bin/chromium-browser"),
        ]
    };

    candidates.into_iter().find(|p| p.exists())
}

/// Ask the installed binary for its version string, e.g. "Google Chrome 142.0.7444.175".
fn probe_chrome_version(chrome_path: &Path) -> Option<String> {
    let output = std::process::Command::new(chrome_path)
        .arg("--version")
        .output()
        .ok()?;
    let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if version.is_empty() {
        None
    } else {
        Some(version)
    }
}

/// Configuration for the browser session
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserSessionConfig {
    /// Path to Chrome/Chromium executable; `None` uses the driver's discovery
    pub chrome_path: Option<String>,
    /// Run in headless mode
    pub headless: bool,
    /// User data directory
    pub user_data_dir: Option<String>,
    /// Timeout for navigation, element readiness, and JS execution, in seconds
    pub timeout_secs: u64,
    /// Window width
    pub window_width: u32,
    /// Window height
    pub window_height: u32,
}

impl Default for BrowserSessionConfig {
    fn default() -> Self {
        Self {
            chrome_path: None,
            headless: false,
            user_data_dir: None,
            timeout_secs: 10,
            window_width: 1920,
            window_height: 1080,
        }
    }
}

impl BrowserSessionConfig {
    /// Create a config with a fresh throwaway profile directory under the
    /// system temp dir, so runs never inherit cookies or crash-restore state.
    pub fn with_scratch_profile() -> Self {
        let dir = std::env::temp_dir()
            .join("webclicker-bot")
            .join("browser_data")
            .join(Uuid::new_v4().to_string());

        Self {
            user_data_dir: Some(dir.to_string_lossy().to_string()),
            ..Default::default()
        }
    }

    /// Set headless mode
    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Set the per-operation timeout
    pub fn timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

/// A live browser session: one browser process, one page.
pub struct BrowserSession {
    /// The browser instance
    browser: Arc<RwLock<Option<Browser>>>,
    /// The single page the watcher drives
    page: Arc<RwLock<Option<chromiumoxide::Page>>>,
    /// Whether the browser is still connected
    alive: Arc<AtomicBool>,
    /// Session configuration
    config: BrowserSessionConfig,
}

impl BrowserSession {
    /// Acquire a session with the retry policy: launch with the driver's own
    /// executable discovery first; if that fails, resolve the executable from
    /// platform well-known locations and launch once more. Both failing is
    /// fatal to startup.
    pub async fn acquire(config: BrowserSessionConfig) -> Result<Self, BrowserError> {
        match Self::launch(config.clone()).await {
            Ok(session) => Ok(session),
            Err(first) => {
                warn!("Browser launch with default discovery failed: {first}");

                let Some(chrome_path) = find_chrome() else {
                    error!("No browser executable found in well-known locations");
                    return Err(first);
                };

                match probe_chrome_version(&chrome_path) {
                    Some(version) => {
                        info!("Retrying launch with {} ({version})", chrome_path.display())
                    }
                    None => info!("Retrying launch with {}", chrome_path.display()),
                }

                let retry = BrowserSessionConfig {
                    chrome_path: Some(chrome_path.to_string_lossy().to_string()),
                    ..config
                };

                Self::launch(retry).await.map_err(|second| {
                    BrowserError::LaunchFailed(format!(
                        "could not start a browser even with a resolved executable path: {second}"
                    ))
                })
            }
        }
    }

    async fn launch(config: BrowserSessionConfig) -> Result<Self, BrowserError> {
        info!("Launching browser session (headless: {})", config.headless);

        let mut builder = BrowserConfig::builder();

        if !config.headless {
            builder = builder.with_head();
        }

        if let Some(ref path) = config.chrome_path {
            builder = builder.chrome_executable(path);
        }

        if let Some(ref dir) = config.user_data_dir {
            std::fs::create_dir_all(dir)?;
            builder = builder.user_data_dir(dir);
        }

        builder = builder
            .window_size(config.window_width, config.window_height)
            .request_timeout(Duration::from_secs(config.timeout_secs))
            .arg("--disable-gpu")
            .arg("--disable-extensions")
            .arg("--disable-notifications")
            .arg("--disable-popup-blocking");

        let browser_config = builder.build().map_err(BrowserError::LaunchFailed)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

        // Drain CDP events in the background. When the handler stream ends,
        // Chrome has disconnected or crashed.
        let alive = Arc::new(AtomicBool::new(true));
        let alive_for_handler = alive.clone();
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser event error: {e}");
                }
            }
            warn!("Browser disconnected (event handler ended)");
            alive_for_handler.store(false, Ordering::Relaxed);
        });

        // Chrome opens with a blank tab; adopt it and close any extras.
        let page = {
            let mut pages = browser
                .pages()
                .await
                .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

            let main_page = if !pages.is_empty() {
                pages.remove(0)
            } else {
                browser
                    .new_page("about:blank")
                    .await
                    .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?
            };

            for extra_page in pages {
                debug!("Closing extra blank tab");
                let _ = extra_page.close().await;
            }

            main_page
        };

        info!("Browser session ready");

        Ok(Self {
            browser: Arc::new(RwLock::new(Some(browser))),
            page: Arc::new(RwLock::new(Some(page))),
            alive,
            config,
        })
    }

    /// Check if the session is still connected
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    /// The configured per-operation timeout in seconds
    pub fn timeout_secs(&self) -> u64 {
        self.config.timeout_secs
    }

    /// Navigate to a URL
    pub async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        let page = self.page.read().await;
        let page = page
            .as_ref()
            .ok_or_else(|| BrowserError::ConnectionLost("No active page".into()))?;

        debug!("Navigating to: {url}");
        let _ = tokio::time::timeout(Duration::from_secs(self.config.timeout_secs), page.goto(url))
            .await
            .map_err(|_| BrowserError::Timeout("Navigation timeout".into()))?
            .map_err(|e| BrowserError::NavigationFailed(e.to_string()))?;

        Ok(())
    }

    /// Execute JavaScript on the page, returning its JSON value
    pub async fn execute_js(&self, script: &str) -> Result<serde_json::Value, BrowserError> {
        let page = self.page.read().await;
        let page = page
            .as_ref()
            .ok_or_else(|| BrowserError::ConnectionLost("No active page".into()))?;

        let result = tokio::time::timeout(
            Duration::from_secs(self.config.timeout_secs),
            page.evaluate(script),
        )
        .await
        .map_err(|_| {
            BrowserError::Timeout(format!(
                "JavaScript execution timed out after {}s",
                self.config.timeout_secs
            ))
        })?
        .map_err(|e| BrowserError::JavaScriptError(e.to_string()))?;

        Ok(result
            .into_value::<serde_json::Value>()
            .unwrap_or(serde_json::Value::Null))
    }

    /// Find all elements matching a CSS selector
    pub async fn find_elements(&self, selector: &str) -> Result<Vec<Element>, BrowserError> {
        let page = self.page.read().await;
        let page = page
            .as_ref()
            .ok_or_else(|| BrowserError::ConnectionLost("No active page".into()))?;

        page.find_elements(selector)
            .await
            .map_err(|e| BrowserError::ElementNotFound(format!("{selector}: {e}")))
    }

    /// Close the browser session
    pub async fn close(&self) -> Result<(), BrowserError> {
        // Mark as not alive first to prevent new operations
        self.alive.store(false, Ordering::Relaxed);

        // 1. Close the page first (stops navigation/JS execution)
        {
            let mut page = self.page.write().await;
            if let Some(p) = page.take() {
                let _ = p.close().await;
            }
        }

        // 2. Close the browser gracefully, then reap the child process
        {
            let mut browser = self.browser.write().await;
            if let Some(mut b) = browser.take() {
                let _ = b.close().await;
                let _ = b.wait().await;
            }
        }

        info!("Browser session closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = BrowserSessionConfig::default();
        assert_eq!(config.timeout_secs, 10);
        assert_eq!(config.window_width, 1920);
        assert_eq!(config.window_height, 1080);
        assert!(!config.headless);
        assert!(config.chrome_path.is_none());
        assert!(config.user_data_dir.is_none());
    }

    #[test]
    fn test_scratch_profiles_are_unique() {
        let a = BrowserSessionConfig::with_scratch_profile();
        let b = BrowserSessionConfig::with_scratch_profile();
        assert!(a.user_data_dir.is_some());
        assert_ne!(a.user_data_dir, b.user_data_dir);
    }

    #[test]
    fn test_config_builders() {
        let config = BrowserSessionConfig::default().headless(true).timeout(30);
        assert!(config.headless);
        assert_eq!(config.timeout_secs, 30);
    }
}
