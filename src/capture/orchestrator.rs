//! Per-URL capture state machine
//!
//! ```text
//! Navigating ──▶ Detecting ──found──▶ Handoff ──captured──▶ Done
//!                    │                   │ skipped / unresolved
//!                    ▼                   ▼
//!                Preparing ◀─────────────┘
//!                    │
//!                    ▼
//!                Capturing ──print failed──▶ Fallback (raster)
//!                    │                          │
//!                    ▼                          ▼
//!                  Done                    Done / Failed
//! ```

use crate::browser::BrowserPage;
use crate::capture::batch::BatchEvent;
use crate::capture::captcha;
use crate::capture::handoff::{HandoffCoordinator, HandoffOutcome};
use crate::capture::normalize::PageNormalizer;
use crate::capture::options::{CaptureOptions, OutputMode};
use crate::capture::render::Renderer;
use crate::capture::site_rules::{host_of, match_rules};
use crate::error::{CaptureError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

/// Which path produced a PDF
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Print engine on the primary page
    Print,
    /// Screenshot of the primary page
    Raster,
    /// Print engine on the primary page after a solved challenge
    HandoffPrint,
    /// Screenshot of the visible page after a solved challenge
    HandoffRaster,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Strategy::Print => "print",
            Strategy::Raster => "raster",
            Strategy::HandoffPrint => "handoff-print",
            Strategy::HandoffRaster => "handoff-raster",
        })
    }
}

/// A written PDF
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureResult {
    /// Requested URL
    pub url: String,
    /// Where the PDF was written
    pub output_path: PathBuf,
    /// How it was produced
    pub strategy: Strategy,
}

impl CaptureResult {
    /// Create a result
    pub fn new(url: &str, output_path: &Path, strategy: Strategy) -> Self {
        Self {
            url: url.to_string(),
            output_path: output_path.to_path_buf(),
            strategy,
        }
    }
}

/// States of one capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// Loading the URL on the primary page
    Navigating,
    /// Looking for an anti-bot challenge
    Detecting,
    /// Waiting on a human in a visible session
    Handoff,
    /// Normalizing the primary page
    Preparing,
    /// Running the configured strategy
    Capturing(Strategy),
    /// Print failed; rasterizing the same page
    Fallback,
    /// PDF written
    Done,
    /// No strategy succeeded
    Failed,
}

struct Transitions<'a> {
    url: &'a str,
    state: CaptureState,
}

impl<'a> Transitions<'a> {
    fn new(url: &'a str) -> Self {
        debug!(url, state = ?CaptureState::Navigating, "capture state");
        Self {
            url,
            state: CaptureState::Navigating,
        }
    }

    fn to(&mut self, next: CaptureState) {
        debug!(url = self.url, from = ?self.state, to = ?next, "capture state");
        self.state = next;
    }
}

/// Drives single-URL captures on a primary page
#[derive(Clone)]
pub struct CaptureOrchestrator {
    handoff: HandoffCoordinator,
    events: Option<mpsc::UnboundedSender<BatchEvent>>,
}

impl CaptureOrchestrator {
    /// Create an orchestrator
    pub fn new(handoff: HandoffCoordinator) -> Self {
        Self {
            handoff,
            events: None,
        }
    }

    /// Report handoff progress on `events`
    pub fn with_events(mut self, events: mpsc::UnboundedSender<BatchEvent>) -> Self {
        self.events = Some(events);
        self
    }

    fn emit(&self, event: BatchEvent) {
        if let Some(ref tx) = self.events {
            let _ = tx.send(event);
        }
    }

    /// Capture `url` into the configured output directory
    #[instrument(skip(self, primary, options), fields(url = %url))]
    pub async fn capture_one(
        &self,
        primary: &dyn BrowserPage,
        url: &str,
        options: &CaptureOptions,
    ) -> Result<CaptureResult> {
        let output_path = options.output_path_for(url);
        let mut state = Transitions::new(url);

        primary
            .navigate(
                url,
                options.wait_until,
                Duration::from_millis(options.timeout_ms),
            )
            .await?;

        state.to(CaptureState::Detecting);
        let detection = captcha::detect(primary).await;
        if detection.found {
            info!(
                "Challenge detected ({}): {}",
                detection.provider,
                detection.signals.join(", ")
            );
            state.to(CaptureState::Handoff);
            self.emit(BatchEvent::ChallengeDetected {
                url: url.to_string(),
                detection: detection.clone(),
            });

            match self
                .handoff
                .handle(url, &output_path, primary, options)
                .await
            {
                HandoffOutcome::Captured(result) => {
                    state.to(CaptureState::Done);
                    return Ok(result);
                }
                HandoffOutcome::Skipped => {
                    info!("Proceeding on primary page after skip");
                }
                HandoffOutcome::Unresolved(e) => {
                    warn!("Handoff unresolved ({}); proceeding on primary page", e);
                }
            }
        }

        state.to(CaptureState::Preparing);
        let host = host_of(url);
        let rules = match_rules(&options.site_rules, &host);
        PageNormalizer::prepare(primary, options, &rules).await;

        let (pdf, strategy) = match options.mode {
            OutputMode::Print => {
                state.to(CaptureState::Capturing(Strategy::Print));
                match Renderer::print(primary, options).await {
                    Ok(pdf) => (pdf, Strategy::Print),
                    Err(print_err) => {
                        warn!("Print failed ({}); falling back to raster", print_err);
                        state.to(CaptureState::Fallback);
                        match Renderer::raster(primary, options).await {
                            Ok(pdf) => (pdf, Strategy::Raster),
                            Err(raster_err) => {
                                state.to(CaptureState::Failed);
                                return Err(CaptureError::Exhausted {
                                    url: url.to_string(),
                                    causes: format!(
                                        "print: {}; raster: {}",
                                        print_err, raster_err
                                    ),
                                }
                                .into());
                            }
                        }
                    }
                }
            }
            OutputMode::Screenshot => {
                state.to(CaptureState::Capturing(Strategy::Raster));
                match Renderer::raster(primary, options).await {
                    Ok(pdf) => (pdf, Strategy::Raster),
                    Err(e) => {
                        state.to(CaptureState::Failed);
                        return Err(CaptureError::Exhausted {
                            url: url.to_string(),
                            causes: format!("raster: {}", e),
                        }
                        .into());
                    }
                }
            }
        };

        if let Err(e) = Renderer::write(&output_path, &pdf).await {
            state.to(CaptureState::Failed);
            return Err(e);
        }
        state.to(CaptureState::Done);
        Ok(CaptureResult::new(url, &output_path, strategy))
    }
}
