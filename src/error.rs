//! Error types for web2pdf
//!
//! This module provides the error hierarchy used across the capture
//! pipeline. Only [`Error`] crosses module boundaries; the per-area enums
//! carry the detail and convert into it with `?`.

use thiserror::Error;

/// The main error type for web2pdf operations
#[derive(Error, Debug)]
pub enum Error {
    /// Browser-related errors
    #[error("Browser error: {0}")]
    Browser(#[from] BrowserError),

    /// Navigation errors
    #[error("Navigation error: {0}")]
    Navigation(#[from] NavigationError),

    /// Capture errors (print engine, screenshot, output)
    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    /// Human handoff errors
    #[error("Handoff error: {0}")]
    Handoff(#[from] HandoffError),

    /// Raster to PDF conversion errors
    #[error("Raster error: {0}")]
    Raster(#[from] RasterError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// ChromiumOxide errors
    #[error("CDP error: {0}")]
    Cdp(String),

    /// Generic error with message
    #[error("{0}")]
    Generic(String),
}

/// Browser lifecycle and control errors
#[derive(Error, Debug)]
pub enum BrowserError {
    /// Failed to launch browser
    #[error("Failed to launch browser: {0}")]
    LaunchFailed(String),

    /// Browser configuration error
    #[error("Invalid browser configuration: {0}")]
    ConfigError(String),

    /// Failed to create new page/tab
    #[error("Failed to create page: {0}")]
    PageCreationFailed(String),

    /// Script evaluation in page context failed
    #[error("Script evaluation failed: {0}")]
    EvaluationFailed(String),

    /// Cookie read or write failed
    #[error("Cookie transfer failed: {0}")]
    CookieFailed(String),
}

/// Navigation errors
#[derive(Error, Debug)]
pub enum NavigationError {
    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Page load failed
    #[error("Page load failed: {0}")]
    LoadFailed(String),
}

/// Capture errors for a single URL
#[derive(Error, Debug)]
pub enum CaptureError {
    /// Screenshot failed
    #[error("Screenshot capture failed: {0}")]
    ScreenshotFailed(String),

    /// Print engine PDF generation failed
    #[error("PDF generation failed: {0}")]
    PdfFailed(String),

    /// Every strategy available for the URL failed
    #[error("All capture strategies failed for {url}: {causes}")]
    Exhausted {
        /// URL being captured
        url: String,
        /// Semicolon separated causes, one per strategy tried
        causes: String,
    },

    /// Writing the output file failed
    #[error("Failed to write {path}: {reason}")]
    WriteFailed {
        /// Output path
        path: String,
        /// Underlying reason
        reason: String,
    },
}

/// Human handoff errors
#[derive(Error, Debug)]
pub enum HandoffError {
    /// The visible session could not be opened
    #[error("Failed to open visible session: {0}")]
    SessionFailed(String),

    /// The human chose to continue but no capture could be taken
    #[error("Capture after handoff failed: {0}")]
    CaptureFailed(String),
}

/// Raster to PDF conversion errors
#[derive(Error, Debug)]
pub enum RasterError {
    /// The bitmap could not be decoded
    #[error("Failed to decode bitmap: {0}")]
    DecodeFailed(String),

    /// The bitmap has a zero dimension
    #[error("Bitmap is empty ({width}x{height})")]
    EmptyBitmap {
        /// Width in pixels
        width: u32,
        /// Height in pixels
        height: u32,
    },

    /// A band could not be encoded
    #[error("Failed to encode band: {0}")]
    EncodeFailed(String),

    /// The PDF document could not be assembled
    #[error("Failed to assemble PDF: {0}")]
    PdfFailed(String),
}

/// Result type alias for web2pdf operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a generic error from a string
    pub fn generic<S: Into<String>>(msg: S) -> Self {
        Error::Generic(msg.into())
    }

    /// Create a CDP error from a string
    pub fn cdp<S: Into<String>>(msg: S) -> Self {
        Error::Cdp(msg.into())
    }
}

/// Convert chromiumoxide errors
impl From<chromiumoxide::error::CdpError> for Error {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        Error::Cdp(err.to_string())
    }
}
