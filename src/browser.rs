//! Scriptable browser session used by the rendered-source extractor.
//!
//! One session (one browser process) lives for a whole run and is owned by the
//! orchestrator. Every `render` call opens its own browser context so that
//! cookies and search history never leak between work units.

use crate::common::constants::{
    BROWSER_USER_AGENT, DEFAULT_NAVIGATION_TIMEOUT_MS, DEFAULT_SETTLE_MS,
};
use crate::common::error::{IngestError, Result};
use crate::pipeline::pacing::Pacing;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams,
};
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Per-render timing knobs.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Wait after navigation; the target never signals render completion.
    pub settle: Pacing,
    pub navigation_timeout: Duration,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            settle: Pacing::Fixed {
                millis: DEFAULT_SETTLE_MS,
            },
            navigation_timeout: Duration::from_millis(DEFAULT_NAVIGATION_TIMEOUT_MS),
        }
    }
}

#[async_trait]
pub trait BrowserSession: Send {
    /// Load `url` in a fresh isolated context and return the rendered HTML.
    /// The context is torn down before returning, on success or failure.
    async fn render(&mut self, url: &str, options: &RenderOptions) -> Result<String>;

    /// Release the browser process. Called once per run.
    async fn close(&mut self) -> Result<()>;
}

/// Opens a session only when a run actually has units to work on.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self) -> Result<Box<dyn BrowserSession>>;
}

#[async_trait]
impl SessionFactory for BrowserOptions {
    async fn open(&self) -> Result<Box<dyn BrowserSession>> {
        Ok(Box::new(ChromiumSession::launch(self).await?))
    }
}

/// Launch settings for [`ChromiumSession`].
#[derive(Debug, Clone)]
pub struct BrowserOptions {
    pub executable: Option<PathBuf>,
    pub headless: bool,
    pub user_agent: String,
    pub request_timeout: Duration,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            executable: std::env::var("CHROMIUM_PATH").ok().map(PathBuf::from),
            headless: true,
            user_agent: BROWSER_USER_AGENT.to_string(),
            request_timeout: Duration::from_millis(DEFAULT_NAVIGATION_TIMEOUT_MS),
        }
    }
}

/// Headless Chromium driven over CDP.
pub struct ChromiumSession {
    browser: Browser,
    handler: JoinHandle<()>,
    user_data_dir: Option<PathBuf>,
    closed: bool,
}

impl ChromiumSession {
    pub async fn launch(options: &BrowserOptions) -> Result<Self> {
        let user_data_dir =
            std::env::temp_dir().join(format!("catalog_ingest_chrome_{}", std::process::id()));
        std::fs::create_dir_all(&user_data_dir)?;

        let mut builder = BrowserConfig::builder()
            .request_timeout(options.request_timeout)
            .window_size(1366, 900)
            .user_data_dir(user_data_dir.clone())
            .arg(format!("--user-agent={}", options.user_agent))
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-notifications")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--mute-audio");
        if let Some(path) = &options.executable {
            builder = builder.chrome_executable(path);
        }
        if !options.headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(IngestError::Browser)?;

        info!("Launching headless browser");
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| IngestError::Browser(format!("launch failed: {e}")))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler event error: {:?}", e);
                }
            }
            debug!("Browser event handler finished");
        });

        Ok(Self {
            browser,
            handler,
            user_data_dir: Some(user_data_dir),
            closed: false,
        })
    }

    fn cleanup_user_data_dir(&mut self) {
        if let Some(path) = self.user_data_dir.take() {
            if let Err(e) = std::fs::remove_dir_all(&path) {
                warn!("Failed to remove browser profile {}: {}", path.display(), e);
            }
        }
    }
}

async fn load_and_capture(page: &Page, url: &str, options: &RenderOptions) -> Result<String> {
    let navigation = async {
        page.goto(url).await?;
        page.wait_for_navigation().await?;
        Ok::<_, chromiumoxide::error::CdpError>(())
    };

    match tokio::time::timeout(options.navigation_timeout, navigation).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(IngestError::Browser(format!("navigation to {url} failed: {e}"))),
        Err(_) => {
            return Err(IngestError::Browser(format!(
                "navigation to {url} timed out after {}ms",
                options.navigation_timeout.as_millis()
            )))
        }
    }

    options.settle.wait(0).await;

    page.content()
        .await
        .map_err(|e| IngestError::Browser(format!("could not read rendered page: {e}")))
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn render(&mut self, url: &str, options: &RenderOptions) -> Result<String> {
        if self.closed {
            return Err(IngestError::Browser("session already closed".into()));
        }

        let context_id = self
            .browser
            .create_browser_context(CreateBrowserContextParams::default())
            .await
            .map_err(|e| IngestError::Browser(format!("could not open context: {e}")))?;

        let target = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(context_id.clone())
            .build()
            .map_err(IngestError::Browser)?;

        let outcome = match self.browser.new_page(target).await {
            Ok(page) => {
                let html = load_and_capture(&page, url, options).await;
                if let Err(e) = page.close().await {
                    warn!("Failed to close tab for {}: {}", url, e);
                }
                html
            }
            Err(e) => Err(IngestError::Browser(format!("could not open tab: {e}"))),
        };

        if let Err(e) = self.browser.dispose_browser_context(context_id).await {
            warn!("Failed to dispose browser context: {}", e);
        }

        outcome
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        info!("Closing browser");
        let result = match self.browser.close().await {
            Ok(_) => {
                if let Err(e) = self.browser.wait().await {
                    warn!("Browser process did not exit cleanly: {}", e);
                }
                Ok(())
            }
            Err(e) => Err(IngestError::Browser(format!("close failed: {e}"))),
        };
        self.handler.abort();
        self.cleanup_user_data_dir();
        result
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        self.handler.abort();
        if !self.closed {
            warn!("ChromiumSession dropped without close(); killing browser");
        }
        self.cleanup_user_data_dir();
    }
}
