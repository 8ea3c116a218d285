//! Browser lifecycle management
//!
//! This module handles browser launch, shutdown, and page management, and
//! implements the engine seams in [`super::page`] on top of CDP.

use crate::browser::capture::PageCapture;
use crate::browser::navigation::{PageNavigator, WaitUntil};
use crate::browser::page::{
    BrowserPage, BrowserSession, NavigationOutcome, PrintLayout, SessionCookie, SessionFactory,
};
use crate::capture::options::{CaptureOptions, VIEWPORT_HEIGHT};
use crate::error::{BrowserError, Error, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as CdpBrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{Cookie, CookieParam, SetCookiesParams};
use chromiumoxide::Page;
use futures::StreamExt;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Interval between predicate evaluations in [`BrowserPage::wait_for`]
const WAIT_FOR_POLL: Duration = Duration::from_millis(250);

/// Configuration for browser launch
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    /// Run in headless mode (default: true)
    pub headless: bool,
    /// Viewport width (default: 1366)
    pub width: u32,
    /// Viewport height (default: 900)
    pub height: u32,
    /// Device pixel ratio (default: 1.0)
    pub device_scale_factor: f64,
    /// Enable sandbox (default: true)
    pub sandbox: bool,
    /// User agent string (None = use default)
    pub user_agent: Option<String>,
    /// CDP request timeout in milliseconds (default: 45000)
    pub timeout_ms: u64,
    /// Path to Chrome/Chromium executable (None = auto-detect)
    pub chrome_path: Option<String>,
    /// Additional Chrome arguments
    pub extra_args: Vec<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            width: 1366,
            height: VIEWPORT_HEIGHT,
            device_scale_factor: 1.0,
            sandbox: true,
            user_agent: None,
            timeout_ms: 45_000,
            chrome_path: None,
            extra_args: Vec::new(),
        }
    }
}

impl BrowserConfig {
    /// Create a new config builder
    pub fn builder() -> BrowserConfigBuilder {
        BrowserConfigBuilder::default()
    }

    /// Launch configuration for a batch
    pub fn from_options(options: &CaptureOptions, headless: bool) -> Self {
        let mut builder = Self::builder()
            .headless(headless)
            .viewport(options.viewport_width, VIEWPORT_HEIGHT)
            .device_scale_factor(options.device_scale_factor)
            .sandbox(!options.no_sandbox)
            .timeout_ms(options.timeout_ms);
        if let Some(ref ua) = options.user_agent {
            builder = builder.user_agent(ua.clone());
        }
        if let Some(ref path) = options.chrome_path {
            builder = builder.chrome_path(path.clone());
        }
        builder.build()
    }
}

/// Builder for BrowserConfig
#[derive(Default)]
pub struct BrowserConfigBuilder {
    config: BrowserConfig,
}

impl BrowserConfigBuilder {
    /// Set headless mode
    pub fn headless(mut self, headless: bool) -> Self {
        self.config.headless = headless;
        self
    }

    /// Set viewport dimensions
    pub fn viewport(mut self, width: u32, height: u32) -> Self {
        self.config.width = width;
        self.config.height = height;
        self
    }

    /// Set device pixel ratio
    pub fn device_scale_factor(mut self, dpr: f64) -> Self {
        self.config.device_scale_factor = dpr;
        self
    }

    /// Enable/disable sandbox
    pub fn sandbox(mut self, sandbox: bool) -> Self {
        self.config.sandbox = sandbox;
        self
    }

    /// Set user agent
    pub fn user_agent<S: Into<String>>(mut self, ua: S) -> Self {
        self.config.user_agent = Some(ua.into());
        self
    }

    /// Set CDP request timeout
    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.config.timeout_ms = ms;
        self
    }

    /// Set Chrome path
    pub fn chrome_path<S: Into<String>>(mut self, path: S) -> Self {
        self.config.chrome_path = Some(path.into());
        self
    }

    /// Add extra Chrome argument
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.config.extra_args.push(arg.into());
        self
    }

    /// Build the config
    pub fn build(self) -> BrowserConfig {
        self.config
    }
}

/// Handle to an open browser page
#[derive(Clone)]
pub struct PageHandle {
    pub(crate) page: Page,
}

#[async_trait]
impl BrowserPage for PageHandle {
    async fn navigate(
        &self,
        url: &str,
        wait_until: WaitUntil,
        timeout: Duration,
    ) -> Result<NavigationOutcome> {
        PageNavigator::goto(self, url, wait_until, timeout).await
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| BrowserError::EvaluationFailed(e.to_string()))?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn wait_for(&self, predicate: &str, timeout: Duration) -> Result<bool> {
        let script = format!(
            "(() => {{ try {{ return !!({}); }} catch (_) {{ return false; }} }})()",
            predicate
        );
        let poll = async {
            loop {
                // The page may be mid-navigation; treat that as not yet satisfied
                if let Ok(serde_json::Value::Bool(true)) = self.evaluate(&script).await {
                    return;
                }
                tokio::time::sleep(WAIT_FOR_POLL).await;
            }
        };
        Ok(tokio::time::timeout(timeout, poll).await.is_ok())
    }

    async fn screenshot_png(&self) -> Result<Vec<u8>> {
        PageCapture::screenshot_png(self).await
    }

    async fn print_pdf(&self, layout: PrintLayout) -> Result<Vec<u8>> {
        PageCapture::print_pdf(self, layout).await
    }

    async fn cookies(&self) -> Result<Vec<SessionCookie>> {
        let raw = self
            .page
            .get_cookies()
            .await
            .map_err(|e| BrowserError::CookieFailed(e.to_string()))?;

        let cookies = raw.iter().filter_map(session_cookie).collect::<Vec<_>>();
        debug!("Exported {} cookies", cookies.len());
        Ok(cookies)
    }

    async fn set_cookies(&self, cookies: &[SessionCookie]) -> Result<()> {
        let params: Vec<CookieParam> = cookies
            .iter()
            .filter_map(|cookie| match cookie_param(cookie) {
                Ok(param) => Some(param),
                Err(e) => {
                    warn!("Skipping cookie '{}': {}", cookie.name, e);
                    None
                }
            })
            .collect();

        if params.is_empty() {
            return Ok(());
        }

        let count = params.len();
        self.page
            .execute(SetCookiesParams::new(params))
            .await
            .map_err(|e| BrowserError::CookieFailed(e.to_string()))?;
        debug!("Imported {} cookies", count);
        Ok(())
    }
}

/// Convert a CDP cookie to the transferred shape
fn session_cookie(cookie: &Cookie) -> Option<SessionCookie> {
    serde_json::to_value(cookie)
        .and_then(serde_json::from_value::<SessionCookie>)
        .map_err(|e| debug!("Dropping cookie '{}': {}", cookie.name, e))
        .ok()
}

/// Convert a transferred cookie to the CDP parameter type.
///
/// Session cookies carry no expiry; CDP rejects non-positive values.
fn cookie_param(cookie: &SessionCookie) -> std::result::Result<CookieParam, serde_json::Error> {
    let mut value = serde_json::to_value(cookie)?;
    if let Some(obj) = value.as_object_mut() {
        if cookie.is_session() {
            obj.remove("expires");
        }
        if cookie.domain.is_empty() {
            obj.remove("domain");
        }
    }
    serde_json::from_value(value)
}

/// High-level browser controller
pub struct BrowserController {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl BrowserController {
    /// Create a new browser controller with custom config
    #[instrument(skip(config))]
    pub async fn with_config(config: BrowserConfig) -> Result<Self> {
        info!(
            "Launching browser with config: headless={}, viewport={}x{}@{}",
            config.headless, config.width, config.height, config.device_scale_factor
        );

        let mut builder = CdpBrowserConfig::builder()
            .viewport(chromiumoxide::handler::viewport::Viewport {
                width: config.width,
                height: config.height,
                device_scale_factor: Some(config.device_scale_factor),
                emulating_mobile: false,
                is_landscape: true,
                has_touch: false,
            })
            .window_size(config.width, config.height)
            .request_timeout(Duration::from_millis(config.timeout_ms));

        if !config.headless {
            builder = builder.with_head();
        }

        if !config.sandbox {
            builder = builder.arg("--no-sandbox").arg("--disable-setuid-sandbox");
        }

        if let Some(ref ua) = config.user_agent {
            builder = builder.arg(format!("--user-agent={}", ua));
        }

        if let Some(ref path) = config.chrome_path {
            builder = builder.chrome_executable(path);
        }

        for arg in &config.extra_args {
            builder = builder.arg(arg);
        }

        let cdp_config = builder
            .build()
            .map_err(|e| BrowserError::ConfigError(e.to_string()))?;

        let (browser, mut handler) = Browser::launch(cdp_config)
            .await
            .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    warn!("Browser handler event error");
                    break;
                }
            }
            debug!("Browser handler finished");
        });

        info!("Browser launched successfully");

        Ok(Self {
            browser,
            handler: handler_task,
        })
    }

    /// Create a new page/tab
    #[instrument(skip(self))]
    pub async fn new_page(&self) -> Result<PageHandle> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::PageCreationFailed(e.to_string()))?;

        debug!("Created new page");
        Ok(PageHandle { page })
    }

    /// Close the browser
    #[instrument(skip(self))]
    pub async fn close(mut self) -> Result<()> {
        info!("Closing browser");

        self.browser
            .close()
            .await
            .map_err(|e| Error::cdp(e.to_string()))?;

        let _ = tokio::time::timeout(Duration::from_secs(5), self.handler).await;

        info!("Browser closed");
        Ok(())
    }
}

/// A launched browser together with its single page
pub struct ChromeSession {
    controller: BrowserController,
    page: PageHandle,
}

impl ChromeSession {
    /// Launch a browser and open its page
    pub async fn launch(config: BrowserConfig) -> Result<Self> {
        let controller = BrowserController::with_config(config).await?;
        let page = match controller.new_page().await {
            Ok(page) => page,
            Err(e) => {
                if let Err(close_err) = controller.close().await {
                    warn!("Failed to close browser after page error: {}", close_err);
                }
                return Err(e);
            }
        };
        Ok(Self { controller, page })
    }
}

#[async_trait]
impl BrowserSession for ChromeSession {
    fn page(&self) -> &dyn BrowserPage {
        &self.page
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let ChromeSession { controller, .. } = *self;
        controller.close().await
    }
}

/// Launches Chromium sessions through CDP
#[derive(Debug, Default, Clone)]
pub struct ChromeSessionFactory;

#[async_trait]
impl SessionFactory for ChromeSessionFactory {
    async fn open_primary(&self, options: &CaptureOptions) -> Result<Box<dyn BrowserSession>> {
        let session = ChromeSession::launch(BrowserConfig::from_options(options, true)).await?;
        Ok(Box::new(session))
    }

    async fn open_visible(&self, options: &CaptureOptions) -> Result<Box<dyn BrowserSession>> {
        let session = ChromeSession::launch(BrowserConfig::from_options(options, false)).await?;
        Ok(Box::new(session))
    }
}
