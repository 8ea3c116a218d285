//! web2pdf - Web Page to PDF Capture with Human CAPTCHA Handoff
//!
//! This crate converts an ordered list of URLs into PDF files using a
//! headless Chromium driven over CDP. When a page is gated by an anti-bot
//! challenge, a visible browser window is opened so a human can solve it,
//! after which capture resumes automatically.
//!
//! # Features
//!
//! - **Two capture strategies**: the browser's print engine, or a
//!   full-page screenshot wrapped into a PDF (single page or US Letter pages)
//! - **Page normalization**: lazy-load scrolling, consent banner removal,
//!   sticky bar flattening, global and per-site CSS/JS injection
//! - **Challenge detection**: Cloudflare, reCAPTCHA, hCaptcha and generic gates
//! - **Human handoff**: one-shot decision channel, cookie transfer back to
//!   the headless session
//!
//! # Architecture
//!
//! ```text
//! BatchRunner ──▶ CaptureOrchestrator ──▶ BrowserPage (CDP)
//!                      │        │
//!                      ▼        ▼
//!             HandoffCoordinator  PageNormalizer
//!                      │        │
//!                      ▼        ▼
//!               HumanNotifier   Renderer ──▶ RasterPaginator
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use web2pdf::browser::ChromeSessionFactory;
//! use web2pdf::capture::{BatchRunner, CaptureOptions, ChannelNotifier, HandoffDecision};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (notifier, mut requests) = ChannelNotifier::new();
//!     tokio::spawn(async move {
//!         while let Some(request) = requests.recv().await {
//!             let _ = request.respond.send(HandoffDecision::proceed());
//!         }
//!     });
//!
//!     let runner = BatchRunner::new(Arc::new(ChromeSessionFactory), Arc::new(notifier));
//!     let options = CaptureOptions::builder().output_dir("out").build();
//!     let report = runner
//!         .spawn(vec!["https://example.com".to_string()], options)
//!         .join()
//!         .await?;
//!
//!     println!("{} saved, {} failed", report.succeeded.len(), report.failed.len());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod browser;
pub mod capture;
pub mod error;
pub mod prompt;

// Re-exports for convenience
pub use browser::{BrowserController, ChromeSessionFactory};
pub use capture::{BatchRunner, CaptureOptions, CaptureOrchestrator};
pub use error::{Error, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
