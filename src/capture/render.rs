//! PDF production from a prepared page
//!
//! Print goes through the browser's print engine; raster wraps a full-page
//! screenshot. Both return PDF bytes; writing is left to the caller.

use crate::browser::{BrowserPage, PrintLayout};
use crate::capture::options::{CaptureOptions, PageLayout};
use crate::capture::raster::{clamp_margin, RasterPaginator, PX_PER_INCH};
use crate::error::{CaptureError, Error, Result};
use std::path::Path;
use tracing::{debug, info, instrument, warn};

/// Height of the rendered document in CSS pixels
pub const CONTENT_HEIGHT_SCRIPT: &str = r#"
Math.max(
  document.documentElement.scrollHeight,
  document.body ? document.body.scrollHeight : 0,
  document.documentElement.getBoundingClientRect().height
)
"#;

/// Paper geometry for print mode.
///
/// `single` prints one exact page while the content fits within
/// `single_page_max_inches`, and Letter otherwise. An unknown height also
/// falls back to Letter.
pub fn print_layout_for(options: &CaptureOptions, content_height_px: Option<f64>) -> PrintLayout {
    let letter = PrintLayout::Letter {
        margin_in: clamp_margin(options.margin_inches),
    };
    if options.layout != PageLayout::Single {
        return letter;
    }
    match content_height_px {
        Some(px) if px > 0.0 && px / PX_PER_INCH <= options.single_page_max_inches => {
            PrintLayout::Exact {
                width_in: f64::from(options.viewport_width) / PX_PER_INCH,
                height_in: px / PX_PER_INCH,
            }
        }
        _ => letter,
    }
}

/// Strategy implementations shared by the orchestrator and the handoff
pub struct Renderer;

impl Renderer {
    /// Print the page through the browser's print engine
    #[instrument(skip_all)]
    pub async fn print(page: &dyn BrowserPage, options: &CaptureOptions) -> Result<Vec<u8>> {
        let height = if options.layout == PageLayout::Single {
            match page.evaluate(CONTENT_HEIGHT_SCRIPT).await {
                Ok(value) => value.as_f64(),
                Err(e) => {
                    warn!("Content height measurement failed: {}", e);
                    None
                }
            }
        } else {
            None
        };
        let layout = print_layout_for(options, height);
        info!("Print mode via browser PDF engine ({:?})", layout);
        page.print_pdf(layout).await
    }

    /// Screenshot the full page and convert it per the configured layout
    #[instrument(skip_all)]
    pub async fn raster(page: &dyn BrowserPage, options: &CaptureOptions) -> Result<Vec<u8>> {
        info!("Screenshot full-page raster");
        let png = page.screenshot_png().await?;
        debug!("Screenshot: {} bytes", png.len());
        Self::rasterize(png, options.layout, options.margin_inches).await
    }

    /// Convert PNG bytes off the async runtime
    pub async fn rasterize(png: Vec<u8>, layout: PageLayout, margin_in: f64) -> Result<Vec<u8>> {
        tokio::task::spawn_blocking(move || match layout {
            PageLayout::Single => RasterPaginator::to_single_page_pdf(&png),
            PageLayout::PaginatedLetter => RasterPaginator::to_paginated_pdf(&png, margin_in),
        })
        .await
        .map_err(|e| Error::generic(format!("raster task failed: {}", e)))?
    }

    /// Write PDF bytes to `path`
    pub async fn write(path: &Path, pdf: &[u8]) -> Result<()> {
        tokio::fs::write(path, pdf)
            .await
            .map_err(|e| CaptureError::WriteFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        info!("Saved {}", path.display());
        Ok(())
    }
}
