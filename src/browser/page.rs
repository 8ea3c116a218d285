//! Engine-facing seams
//!
//! The capture pipeline only talks to the browser through these traits.
//! [`PageHandle`](super::PageHandle) implements them over CDP; tests drive
//! the pipeline with scripted implementations.

use crate::browser::WaitUntil;
use crate::capture::CaptureOptions;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How a navigation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationOutcome {
    /// The completion criterion was met
    Loaded,
    /// The timeout elapsed first; the page holds whatever rendered
    TimedOut,
}

/// Paper geometry handed to the print engine
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PrintLayout {
    /// One page of exactly this size in inches, no margins
    Exact {
        /// Paper width in inches
        width_in: f64,
        /// Paper height in inches
        height_in: f64,
    },
    /// US Letter with uniform margins in inches
    Letter {
        /// Margin on every side
        margin_in: f64,
    },
}

/// A cookie as transferred between sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCookie {
    /// Cookie name
    pub name: String,
    /// Cookie value
    pub value: String,
    /// Cookie domain
    #[serde(default)]
    pub domain: String,
    /// Cookie path
    #[serde(default = "default_cookie_path")]
    pub path: String,
    /// Expiry as seconds since epoch; None or negative for session cookies
    #[serde(default)]
    pub expires: Option<f64>,
    /// HttpOnly flag
    #[serde(default)]
    pub http_only: bool,
    /// Secure flag
    #[serde(default)]
    pub secure: bool,
    /// SameSite policy (`Strict`, `Lax`, `None`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub same_site: Option<String>,
}

fn default_cookie_path() -> String {
    "/".to_string()
}

impl SessionCookie {
    /// Whether the cookie only lives for the browser session
    pub fn is_session(&self) -> bool {
        self.expires.map_or(true, |exp| exp <= 0.0)
    }
}

/// Primitive operations on one loaded page
#[async_trait]
pub trait BrowserPage: Send + Sync {
    /// Navigate and wait for `wait_until`, bounded by `timeout`.
    ///
    /// A timeout is reported as [`NavigationOutcome::TimedOut`], not an error.
    async fn navigate(
        &self,
        url: &str,
        wait_until: WaitUntil,
        timeout: Duration,
    ) -> Result<NavigationOutcome>;

    /// Evaluate a script expression in page context and return its value
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value>;

    /// Wait until `predicate` evaluates truthy. Returns false on timeout.
    async fn wait_for(&self, predicate: &str, timeout: Duration) -> Result<bool>;

    /// Full-page PNG screenshot
    async fn screenshot_png(&self) -> Result<Vec<u8>>;

    /// Render through the print engine with screen media emulation
    async fn print_pdf(&self, layout: PrintLayout) -> Result<Vec<u8>>;

    /// Every cookie held by the page's session
    async fn cookies(&self) -> Result<Vec<SessionCookie>>;

    /// Add cookies to the page's session
    async fn set_cookies(&self, cookies: &[SessionCookie]) -> Result<()>;
}

/// A browser instance owning exactly one page
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// The session's only page
    fn page(&self) -> &dyn BrowserPage;

    /// Tear the session down. Consumes the session so it closes once.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Launches browser sessions configured from the batch options
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Launch the headless session used for automated capture
    async fn open_primary(&self, options: &CaptureOptions) -> Result<Box<dyn BrowserSession>>;

    /// Launch a human-visible session with the same viewport and DPR
    async fn open_visible(&self, options: &CaptureOptions) -> Result<Box<dyn BrowserSession>>;
}
