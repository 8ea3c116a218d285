//! Sequential batch runner
//!
//! URLs are captured one after another on a single primary page. The batch
//! state lives in a watch channel so callers can observe it and request a
//! stop; a stop takes effect between URLs, never mid-capture.

use crate::browser::SessionFactory;
use crate::capture::captcha::CaptchaDetection;
use crate::capture::handoff::{HandoffCoordinator, HumanNotifier};
use crate::capture::options::CaptureOptions;
use crate::capture::orchestrator::{CaptureOrchestrator, CaptureResult};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

/// Lifecycle of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BatchState {
    /// Not running
    #[default]
    Idle,
    /// Processing URLs
    Running,
    /// Finishing the current URL, then stopping
    Stopping,
}

/// A URL that produced no PDF
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlFailure {
    /// Requested URL
    pub url: String,
    /// Why it failed
    pub cause: String,
}

/// Outcome of a whole batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Written PDFs, in input order
    pub succeeded: Vec<CaptureResult>,
    /// Failed URLs, in input order
    pub failed: Vec<UrlFailure>,
}

impl BatchReport {
    /// Number of URLs processed
    pub fn processed(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

/// Progress notifications
#[derive(Debug, Clone, PartialEq)]
pub enum BatchEvent {
    /// The batch moved to a new state
    StateChanged(BatchState),
    /// Capture of a URL started
    UrlStarted {
        /// 1-based position
        index: usize,
        /// Batch size
        total: usize,
        /// URL
        url: String,
    },
    /// A challenge was found and a human is being asked
    ChallengeDetected {
        /// URL
        url: String,
        /// What was found
        detection: CaptchaDetection,
    },
    /// A PDF was written
    UrlSucceeded(CaptureResult),
    /// A URL failed; the batch continues
    UrlFailed(UrlFailure),
    /// The batch ended
    Finished {
        /// Successful URLs
        succeeded: usize,
        /// Failed URLs
        failed: usize,
    },
}

/// Shared view of a batch's state
#[derive(Debug, Clone)]
pub struct BatchControl {
    state: Arc<watch::Sender<BatchState>>,
}

impl Default for BatchControl {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchControl {
    /// A control in the idle state
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(BatchState::Idle);
        Self {
            state: Arc::new(tx),
        }
    }

    /// Current state
    pub fn state(&self) -> BatchState {
        *self.state.borrow()
    }

    /// Subscribe to state changes
    pub fn subscribe(&self) -> watch::Receiver<BatchState> {
        self.state.subscribe()
    }

    /// Ask a running batch to stop after the current URL.
    ///
    /// Returns false when the batch was not running.
    pub fn request_stop(&self) -> bool {
        self.state.send_if_modified(|state| {
            if *state == BatchState::Running {
                *state = BatchState::Stopping;
                true
            } else {
                false
            }
        })
    }

    fn start(&self) -> bool {
        self.state.send_if_modified(|state| {
            if *state == BatchState::Idle {
                *state = BatchState::Running;
                true
            } else {
                false
            }
        })
    }

    fn finish(&self) {
        self.state.send_replace(BatchState::Idle);
    }
}

/// A batch running in the background
pub struct BatchHandle {
    control: BatchControl,
    /// Progress events
    pub events: mpsc::UnboundedReceiver<BatchEvent>,
    task: JoinHandle<Result<BatchReport>>,
}

impl BatchHandle {
    /// Current state
    pub fn state(&self) -> BatchState {
        self.control.state()
    }

    /// Ask the batch to stop after the current URL
    pub fn request_stop(&self) -> bool {
        self.control.request_stop()
    }

    /// A clone of the control, e.g. for a signal handler
    pub fn control(&self) -> BatchControl {
        self.control.clone()
    }

    /// Wait for the batch to end
    pub async fn join(self) -> Result<BatchReport> {
        self.task
            .await
            .map_err(|e| crate::error::Error::generic(format!("batch task failed: {}", e)))?
    }
}

/// Runs batches against a session factory and a human notifier
#[derive(Clone)]
pub struct BatchRunner {
    sessions: Arc<dyn SessionFactory>,
    notifier: Arc<dyn HumanNotifier>,
}

impl BatchRunner {
    /// Create a runner
    pub fn new(sessions: Arc<dyn SessionFactory>, notifier: Arc<dyn HumanNotifier>) -> Self {
        Self { sessions, notifier }
    }

    /// Start a batch in the background
    pub fn spawn(&self, urls: Vec<String>, options: CaptureOptions) -> BatchHandle {
        let control = BatchControl::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let runner = self.clone();
        let task_control = control.clone();
        let task = tokio::spawn(async move { runner.run(&urls, &options, tx, task_control).await });
        BatchHandle {
            control,
            events: rx,
            task,
        }
    }

    /// Capture every URL in order.
    ///
    /// Fails only when the batch cannot start: output directory or primary
    /// session. Per-URL failures are recorded in the report.
    #[instrument(skip_all, fields(urls = urls.len()))]
    pub async fn run(
        &self,
        urls: &[String],
        options: &CaptureOptions,
        events: mpsc::UnboundedSender<BatchEvent>,
        control: BatchControl,
    ) -> Result<BatchReport> {
        let emit = |event: BatchEvent| {
            let _ = events.send(event);
        };

        if !control.start() {
            warn!("Batch already running");
            return Err(crate::error::Error::generic("batch already running"));
        }
        emit(BatchEvent::StateChanged(BatchState::Running));

        let report = self.run_urls(urls, options, &events, &control).await;

        control.finish();
        emit(BatchEvent::StateChanged(BatchState::Idle));
        if let Ok(ref report) = report {
            emit(BatchEvent::Finished {
                succeeded: report.succeeded.len(),
                failed: report.failed.len(),
            });
        }
        report
    }

    async fn run_urls(
        &self,
        urls: &[String],
        options: &CaptureOptions,
        events: &mpsc::UnboundedSender<BatchEvent>,
        control: &BatchControl,
    ) -> Result<BatchReport> {
        tokio::fs::create_dir_all(&options.output_dir).await?;

        let session = self.sessions.open_primary(options).await?;
        let orchestrator = CaptureOrchestrator::new(HandoffCoordinator::new(
            self.sessions.clone(),
            self.notifier.clone(),
        ))
        .with_events(events.clone());

        let mut report = BatchReport::default();
        let total = urls.len();
        for (idx, url) in urls.iter().enumerate() {
            if control.state() == BatchState::Stopping {
                info!("Stop requested; {} URLs not processed", total - idx);
                break;
            }

            info!("[{}/{}] {}", idx + 1, total, url);
            let _ = events.send(BatchEvent::UrlStarted {
                index: idx + 1,
                total,
                url: url.clone(),
            });

            match orchestrator.capture_one(session.page(), url, options).await {
                Ok(result) => {
                    let _ = events.send(BatchEvent::UrlSucceeded(result.clone()));
                    report.succeeded.push(result);
                }
                Err(e) => {
                    error!("{}: {}", url, e);
                    let failure = UrlFailure {
                        url: url.clone(),
                        cause: e.to_string(),
                    };
                    let _ = events.send(BatchEvent::UrlFailed(failure.clone()));
                    report.failed.push(failure);
                }
            }
        }

        if let Err(e) = session.close().await {
            warn!("Failed to close primary session: {}", e);
        }
        Ok(report)
    }
}
