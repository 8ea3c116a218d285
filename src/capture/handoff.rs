//! Human handoff for anti-bot challenges
//!
//! When a challenge is detected, a visible browser is opened on the same
//! URL and a human is asked to solve it. The human answers through a
//! [`HumanNotifier`]; the capture then resumes automatically.

use crate::browser::{BrowserPage, BrowserSession, SessionFactory, WaitUntil};
use crate::capture::captcha;
use crate::capture::normalize::PageNormalizer;
use crate::capture::options::{CaptureOptions, OutputMode};
use crate::capture::orchestrator::{CaptureResult, Strategy};
use crate::capture::render::Renderer;
use crate::capture::site_rules::{host_of, match_rules};
use crate::error::{Error, HandoffError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, instrument, warn};

/// What the human decided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandoffAction {
    /// The challenge is solved; resume capture
    Continue,
    /// Give up on the challenge and capture whatever the primary page shows
    Skip,
}

/// One answer to one handoff request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoffDecision {
    /// Chosen action
    pub action: HandoffAction,
}

impl HandoffDecision {
    /// Resume capture
    pub fn proceed() -> Self {
        Self {
            action: HandoffAction::Continue,
        }
    }

    /// Skip the challenge
    pub fn skip() -> Self {
        Self {
            action: HandoffAction::Skip,
        }
    }
}

/// Surface that asks a human to solve a challenge.
///
/// The returned receiver resolves once with the decision. Dropping the
/// sender without answering counts as [`HandoffAction::Skip`].
pub trait HumanNotifier: Send + Sync {
    /// Ask the human to handle the challenge at `url`
    fn request(&self, url: &str) -> oneshot::Receiver<HandoffDecision>;
}

/// A pending question forwarded by [`ChannelNotifier`]
#[derive(Debug)]
pub struct HandoffRequest {
    /// URL with the challenge
    pub url: String,
    /// Where the answer goes
    pub respond: oneshot::Sender<HandoffDecision>,
}

/// Forwards requests to whoever owns the receiving end
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<HandoffRequest>,
}

impl ChannelNotifier {
    /// Create a notifier and the receiver its requests arrive on
    pub fn new() -> (Self, mpsc::UnboundedReceiver<HandoffRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl HumanNotifier for ChannelNotifier {
    fn request(&self, url: &str) -> oneshot::Receiver<HandoffDecision> {
        let (respond, rx) = oneshot::channel();
        let request = HandoffRequest {
            url: url.to_string(),
            respond,
        };
        // A closed channel drops the sender, which resolves to skip
        if self.tx.send(request).is_err() {
            warn!("No handoff listener; treating challenge as skipped");
        }
        rx
    }
}

/// How a handoff episode ended
#[derive(Debug)]
pub enum HandoffOutcome {
    /// The capture was taken and written
    Captured(CaptureResult),
    /// The human skipped; continue on the primary page
    Skipped,
    /// The human continued but nothing could be captured
    Unresolved(Error),
}

/// Runs one handoff episode per challenged URL
#[derive(Clone)]
pub struct HandoffCoordinator {
    sessions: Arc<dyn SessionFactory>,
    notifier: Arc<dyn HumanNotifier>,
}

impl HandoffCoordinator {
    /// Create a coordinator
    pub fn new(sessions: Arc<dyn SessionFactory>, notifier: Arc<dyn HumanNotifier>) -> Self {
        Self { sessions, notifier }
    }

    /// Open a visible session, wait for the human, and capture.
    ///
    /// The visible session is closed before this returns, whatever the
    /// outcome.
    #[instrument(skip(self, primary, options, output_path), fields(url = %url))]
    pub async fn handle(
        &self,
        url: &str,
        output_path: &Path,
        primary: &dyn BrowserPage,
        options: &CaptureOptions,
    ) -> HandoffOutcome {
        let session = match self.sessions.open_visible(options).await {
            Ok(session) => session,
            Err(e) => {
                warn!("Could not open visible session: {}", e);
                return HandoffOutcome::Unresolved(
                    HandoffError::SessionFailed(e.to_string()).into(),
                );
            }
        };

        let outcome = self
            .episode(url, output_path, primary, session.as_ref(), options)
            .await;

        if let Err(e) = session.close().await {
            warn!("Failed to close visible session: {}", e);
        }
        outcome
    }

    async fn episode(
        &self,
        url: &str,
        output_path: &Path,
        primary: &dyn BrowserPage,
        session: &dyn BrowserSession,
        options: &CaptureOptions,
    ) -> HandoffOutcome {
        let visible = session.page();
        let timeout = Duration::from_millis(options.timeout_ms);

        match primary.cookies().await {
            Ok(cookies) if !cookies.is_empty() => {
                if let Err(e) = visible.set_cookies(&cookies).await {
                    debug!("Seeding visible session cookies failed: {}", e);
                }
            }
            Ok(_) => {}
            Err(e) => debug!("Reading primary cookies failed: {}", e),
        }

        // The challenge page may never go network-idle
        if let Err(e) = visible
            .navigate(url, WaitUntil::DomContentLoaded, timeout)
            .await
        {
            warn!("Visible navigation failed: {}", e);
        }

        info!("Visible browser opened; waiting for the challenge to be solved");
        let decision = self
            .notifier
            .request(url)
            .await
            .unwrap_or_else(|_| HandoffDecision::skip());

        if decision.action == HandoffAction::Skip {
            info!("Challenge skipped by user");
            return HandoffOutcome::Skipped;
        }

        match visible.cookies().await {
            Ok(cookies) => {
                info!("Importing {} cookies into primary session", cookies.len());
                if let Err(e) = primary.set_cookies(&cookies).await {
                    warn!("Could not import cookies: {}", e);
                }
            }
            Err(e) => warn!("Could not export cookies: {}", e),
        }

        if options.mode == OutputMode::Print {
            match self.print_on_primary(url, output_path, primary, options).await {
                Ok(result) => return HandoffOutcome::Captured(result),
                Err(e) => warn!("Primary print after handoff failed ({}); using solved window", e),
            }
        }

        match self.raster_on_visible(url, output_path, visible, options).await {
            Ok(result) => HandoffOutcome::Captured(result),
            Err(e) => {
                warn!("Capture from solved window failed: {}", e);
                HandoffOutcome::Unresolved(HandoffError::CaptureFailed(e.to_string()).into())
            }
        }
    }

    async fn print_on_primary(
        &self,
        url: &str,
        output_path: &Path,
        primary: &dyn BrowserPage,
        options: &CaptureOptions,
    ) -> Result<CaptureResult> {
        primary
            .navigate(
                url,
                options.wait_until,
                Duration::from_millis(options.timeout_ms),
            )
            .await?;

        let detection = captcha::detect(primary).await;
        if detection.found {
            return Err(Error::generic(format!(
                "challenge still present ({})",
                detection.provider
            )));
        }

        let host = host_of(url);
        let rules = match_rules(&options.site_rules, &host);
        PageNormalizer::prepare(primary, options, &rules).await;
        let pdf = Renderer::print(primary, options).await?;
        Renderer::write(output_path, &pdf).await?;
        Ok(CaptureResult::new(url, output_path, Strategy::HandoffPrint))
    }

    async fn raster_on_visible(
        &self,
        url: &str,
        output_path: &Path,
        visible: &dyn BrowserPage,
        options: &CaptureOptions,
    ) -> Result<CaptureResult> {
        let host = host_of(url);
        let rules = match_rules(&options.site_rules, &host);
        PageNormalizer::prepare(visible, options, &rules).await;
        let pdf = Renderer::raster(visible, options).await?;
        Renderer::write(output_path, &pdf).await?;
        Ok(CaptureResult::new(url, output_path, Strategy::HandoffRaster))
    }
}
