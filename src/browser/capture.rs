//! Page capture functionality
//!
//! This module handles full-page screenshots and print-engine PDFs.

use crate::browser::{PageHandle, PrintLayout};
use crate::error::{CaptureError, Result};
use chromiumoxide::cdp::browser_protocol::emulation::SetEmulatedMediaParams;
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, PrintToPdfParams};
use chromiumoxide::page::ScreenshotParams;
use tracing::{debug, info, instrument, warn};

/// US Letter paper width in inches
pub const LETTER_WIDTH_IN: f64 = 8.5;
/// US Letter paper height in inches
pub const LETTER_HEIGHT_IN: f64 = 11.0;

/// Page capture functionality
pub struct PageCapture;

impl PageCapture {
    /// Take a full-page PNG screenshot, including content beyond the viewport
    #[instrument(skip(page))]
    pub async fn screenshot_png(page: &PageHandle) -> Result<Vec<u8>> {
        info!("Capturing full-page screenshot");

        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(true)
            .from_surface(true)
            .capture_beyond_viewport(true)
            .build();

        let data = page
            .page
            .screenshot(params)
            .await
            .map_err(|e| CaptureError::ScreenshotFailed(e.to_string()))?;

        debug!("Screenshot captured: {} bytes", data.len());
        Ok(data)
    }

    /// Render the page through the print engine under screen media
    #[instrument(skip(page))]
    pub async fn print_pdf(page: &PageHandle, layout: PrintLayout) -> Result<Vec<u8>> {
        info!("Generating PDF");

        // Print with the on-screen stylesheet, not the print one
        if let Err(e) = page
            .page
            .execute(SetEmulatedMediaParams::builder().media("screen").build())
            .await
        {
            warn!("Screen media emulation failed: {}", e);
        }

        let data = page
            .page
            .pdf(Self::print_params(layout))
            .await
            .map_err(|e| CaptureError::PdfFailed(e.to_string()))?;

        debug!("PDF generated: {} bytes", data.len());
        Ok(data)
    }

    /// Print parameters for a layout
    pub fn print_params(layout: PrintLayout) -> PrintToPdfParams {
        let (width, height, margin) = match layout {
            PrintLayout::Exact {
                width_in,
                height_in,
            } => (width_in, height_in, 0.0),
            PrintLayout::Letter { margin_in } => (LETTER_WIDTH_IN, LETTER_HEIGHT_IN, margin_in),
        };

        PrintToPdfParams::builder()
            .print_background(true)
            .prefer_css_page_size(false)
            .display_header_footer(false)
            .scale(1.0)
            .paper_width(width)
            .paper_height(height)
            .margin_top(margin)
            .margin_bottom(margin)
            .margin_left(margin)
            .margin_right(margin)
            .build()
    }
}
