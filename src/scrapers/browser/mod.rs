//! Browser session layer for anti-bot protected campaign pages.
//!
//! Uses chromiumoxide (CDP) with stealth evasion techniques to get past
//! bot detection heuristics on the target site.

mod config;
pub mod evasion;
mod stealth;

pub use config::BrowserEngineConfig;
pub use stealth::STEALTH_SCRIPTS;

#[cfg(feature = "browser")]
pub use with_browser::BrowserFetcher;

#[cfg(feature = "browser")]
mod with_browser {
    use std::sync::Arc;
    use std::time::Duration;

    use anyhow::{Context, Result};
    use chromiumoxide::{Browser, BrowserConfig, Page};
    use futures::StreamExt;
    use tokio::sync::Mutex;
    use tracing::{debug, info};

    use super::{evasion, BrowserEngineConfig, STEALTH_SCRIPTS};

    /// Launches or connects to a Chrome instance and hands out prepared pages.
    pub struct BrowserFetcher {
        config: BrowserEngineConfig,
        browser: Option<Arc<Mutex<Browser>>>,
    }

    impl BrowserFetcher {
        /// Common Chrome executable paths to check.
        const CHROME_PATHS: &'static [&'static str] = &[
            // Linux
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/snap/bin/chromium",
            // macOS
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/opt/google/chrome/google-chrome",
        ];

        pub fn new(config: BrowserEngineConfig) -> Self {
            Self {
                config,
                browser: None,
            }
        }

        fn find_chrome() -> Result<std::path::PathBuf> {
            for path in Self::CHROME_PATHS {
                let p = std::path::Path::new(path);
                if p.exists() {
                    info!("Found Chrome at: {}", path);
                    return Ok(p.to_path_buf());
                }
            }

            for cmd in &[
                "google-chrome",
                "google-chrome-stable",
                "chromium",
                "chromium-browser",
            ] {
                if let Ok(output) = std::process::Command::new("which").arg(cmd).output() {
                    if output.status.success() {
                        let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                        if !path.is_empty() {
                            info!("Found Chrome in PATH: {}", path);
                            return Ok(std::path::PathBuf::from(path));
                        }
                    }
                }
            }

            Err(anyhow::anyhow!(
                "Chrome/Chromium not found. Install it or set PROMO_BROWSER_URL \
                 to a remote DevTools endpoint"
            ))
        }

        /// Launch or connect to the browser if not already running.
        pub async fn ensure_browser(&mut self) -> Result<()> {
            if self.browser.is_some() {
                return Ok(());
            }

            if let Some(remote_url) = self.config.remote_url.clone() {
                return self.connect_remote(&remote_url).await;
            }

            info!("Launching browser (headless={})", self.config.headless);

            let chrome_path = Self::find_chrome()?;
            let (width, height) = evasion::random_viewport();

            let mut builder = BrowserConfig::builder()
                .chrome_executable(chrome_path)
                .window_size(width, height);

            // with_head means NOT headless, confusingly
            if !self.config.headless {
                builder = builder.with_head();
            }

            if let Some(ref proxy) = self.config.proxy {
                builder = builder.arg(format!("--proxy-server={}", proxy));
            }

            builder = builder
                .arg("--disable-blink-features=AutomationControlled")
                .arg("--disable-infobars")
                .arg("--disable-dev-shm-usage")
                .arg("--no-first-run")
                .arg("--no-default-browser-check")
                .arg("--disable-background-networking")
                .arg("--disable-sync")
                .arg("--no-sandbox")
                .arg("--disable-gpu")
                .arg("--disable-software-rasterizer");

            for arg in &self.config.chrome_args {
                builder = builder.arg(arg.as_str());
            }

            let config = builder
                .build()
                .map_err(|e| anyhow::anyhow!("Failed to build browser config: {}", e))?;

            let (browser, mut handler) = Browser::launch(config)
                .await
                .context("Failed to launch browser")?;

            tokio::spawn(async move {
                while let Some(h) = handler.next().await {
                    if h.is_err() {
                        break;
                    }
                }
            });

            self.browser = Some(Arc::new(Mutex::new(browser)));
            Ok(())
        }

        /// Connect to a remote Chrome instance.
        async fn connect_remote(&mut self, url: &str) -> Result<()> {
            info!(
                "Connecting to remote browser at {} (timeout: {}s)",
                url, self.config.timeout
            );

            // Resolve the WebSocket URL from the /json/version endpoint.
            let http_url = url
                .replace("ws://", "http://")
                .replace("wss://", "https://");
            let version_url = format!("{}/json/version", http_url.trim_end_matches('/'));

            let client = reqwest::Client::new();
            let resp: serde_json::Value = client
                .get(&version_url)
                .send()
                .await
                .context("Failed to connect to remote browser")?
                .json()
                .await
                .context("Failed to parse browser version info")?;

            let ws_url = resp
                .get("webSocketDebuggerUrl")
                .and_then(|v| v.as_str())
                .ok_or_else(|| anyhow::anyhow!("No webSocketDebuggerUrl in response"))?;

            let handler_config = chromiumoxide::handler::HandlerConfig {
                request_timeout: Duration::from_secs(self.config.timeout),
                ..Default::default()
            };

            let (browser, mut handler) = Browser::connect_with_config(ws_url, handler_config)
                .await
                .context("Failed to connect to remote browser")?;

            tokio::spawn(async move {
                while let Some(h) = handler.next().await {
                    if h.is_err() {
                        break;
                    }
                }
            });

            self.browser = Some(Arc::new(Mutex::new(browser)));
            Ok(())
        }

        /// Open a fresh page with stealth scripts and a rotated user agent.
        ///
        /// The caller owns the page and must close it on every exit path.
        pub async fn new_page(&mut self, url: &str) -> Result<Page> {
            self.ensure_browser().await?;
            let browser = self
                .browser
                .as_ref()
                .expect("ensure_browser sets the connection")
                .clone();

            let guard = browser.lock().await;
            let page = guard
                .new_page("about:blank")
                .await
                .context("Failed to create page")?;
            drop(guard);

            page.set_user_agent(evasion::random_user_agent())
                .await
                .context("Failed to set user agent")?;

            page.goto(url).await.context("Navigation failed")?;
            self.apply_stealth(&page).await;
            Ok(page)
        }

        /// Apply stealth evasion scripts to a page.
        async fn apply_stealth(&self, page: &Page) {
            for script in STEALTH_SCRIPTS {
                if let Err(e) = page.evaluate(script.to_string()).await {
                    // Can fail during page transitions; the scripts are
                    // best-effort evasion.
                    debug!("Stealth script injection skipped: {}", e);
                }
            }
        }

        /// Drop the browser connection.
        pub async fn close(&mut self) {
            self.browser = None;
        }
    }
}

// Stub for when the browser feature is disabled.
#[cfg(not(feature = "browser"))]
pub struct BrowserFetcher {
    #[allow(dead_code)]
    config: BrowserEngineConfig,
}

#[cfg(not(feature = "browser"))]
impl BrowserFetcher {
    pub fn new(config: BrowserEngineConfig) -> Self {
        Self { config }
    }

    pub async fn ensure_browser(&mut self) -> anyhow::Result<()> {
        Err(anyhow::anyhow!(
            "Browser support not compiled. Rebuild with: cargo build --features browser"
        ))
    }

    pub async fn close(&mut self) {}
}
