//! Batch configuration
//!
//! [`CaptureOptions`] is built once per batch and shared read-only by every
//! component of the pipeline.

use crate::browser::WaitUntil;
use crate::capture::raster::{clamp_margin, DEFAULT_MARGIN_INCHES};
use crate::capture::site_rules::SiteRule;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How the PDF is produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Full-page raster screenshot wrapped into a PDF
    #[default]
    Screenshot,
    /// Browser print engine, falling back to raster on failure
    Print,
}

/// Page layout of the produced PDF
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum PageLayout {
    /// One page sized to the whole capture
    Single,
    /// US Letter pages with margins
    #[default]
    PaginatedLetter,
}

/// How output file names are derived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum FileNaming {
    /// `example_com_a_b_html.pdf`
    #[default]
    FromUrl,
    /// Sanitized URL plus capture timestamp
    Timestamped,
}

/// Viewport height used for every session; only the width is configurable.
pub const VIEWPORT_HEIGHT: u32 = 900;

/// Immutable configuration for one batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureOptions {
    /// Output mode
    #[serde(default)]
    pub mode: OutputMode,
    /// Page layout
    #[serde(default)]
    pub layout: PageLayout,
    /// Viewport width in CSS pixels
    #[serde(default = "default_viewport_width")]
    pub viewport_width: u32,
    /// Device pixel ratio
    #[serde(default = "default_dpr")]
    pub device_scale_factor: f64,
    /// Navigation completion criterion
    #[serde(default)]
    pub wait_until: WaitUntil,
    /// Per-navigation timeout
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Extra settle delay before capture
    #[serde(default)]
    pub delay_ms: u64,
    /// Remove cookie/consent banners
    #[serde(default = "default_true")]
    pub hide_cookie_banners: bool,
    /// Convert sticky headers/footers to static flow
    #[serde(default = "default_true")]
    pub unstick_bars: bool,
    /// CSS injected into every page
    #[serde(default)]
    pub global_css: String,
    /// JS executed on every page
    #[serde(default)]
    pub global_js: String,
    /// Domain-scoped overrides, in declaration order
    #[serde(default)]
    pub site_rules: Vec<SiteRule>,
    /// Output directory
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// File naming strategy
    #[serde(default)]
    pub naming: FileNaming,
    /// User agent override
    #[serde(default)]
    pub user_agent: Option<String>,
    /// Launch Chromium with `--no-sandbox`
    #[serde(default)]
    pub no_sandbox: bool,
    /// Path to Chrome/Chromium executable (None = auto-detect)
    #[serde(default)]
    pub chrome_path: Option<String>,
    /// Tallest content printed as one exact page; taller pages use Letter
    #[serde(default = "default_single_page_max_inches")]
    pub single_page_max_inches: f64,
    /// Margin for Letter output, in inches
    #[serde(default = "default_margin_inches")]
    pub margin_inches: f64,
}

fn default_viewport_width() -> u32 {
    1366
}

fn default_dpr() -> f64 {
    1.0
}

fn default_timeout_ms() -> u64 {
    45_000
}

fn default_true() -> bool {
    true
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_single_page_max_inches() -> f64 {
    199.0
}

fn default_margin_inches() -> f64 {
    DEFAULT_MARGIN_INCHES
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            mode: OutputMode::default(),
            layout: PageLayout::default(),
            viewport_width: default_viewport_width(),
            device_scale_factor: default_dpr(),
            wait_until: WaitUntil::default(),
            timeout_ms: default_timeout_ms(),
            delay_ms: 0,
            hide_cookie_banners: true,
            unstick_bars: true,
            global_css: String::new(),
            global_js: String::new(),
            site_rules: Vec::new(),
            output_dir: default_output_dir(),
            naming: FileNaming::default(),
            user_agent: None,
            no_sandbox: false,
            chrome_path: None,
            single_page_max_inches: default_single_page_max_inches(),
            margin_inches: default_margin_inches(),
        }
    }
}

impl CaptureOptions {
    /// Create a new options builder
    pub fn builder() -> CaptureOptionsBuilder {
        CaptureOptionsBuilder::default()
    }

    /// Output path for a URL under the configured naming strategy
    pub fn output_path_for(&self, url: &str) -> PathBuf {
        let name = match self.naming {
            FileNaming::FromUrl => super::naming::url_to_filename(url),
            FileNaming::Timestamped => {
                super::naming::timestamped_filename(url, chrono::Local::now())
            }
        };
        self.output_dir.join(name)
    }
}

/// Builder for CaptureOptions
#[derive(Default)]
pub struct CaptureOptionsBuilder {
    options: CaptureOptions,
}

impl CaptureOptionsBuilder {
    /// Set output mode
    pub fn mode(mut self, mode: OutputMode) -> Self {
        self.options.mode = mode;
        self
    }

    /// Set page layout
    pub fn layout(mut self, layout: PageLayout) -> Self {
        self.options.layout = layout;
        self
    }

    /// Set viewport width
    pub fn viewport_width(mut self, width: u32) -> Self {
        self.options.viewport_width = width;
        self
    }

    /// Set device pixel ratio
    pub fn device_scale_factor(mut self, dpr: f64) -> Self {
        self.options.device_scale_factor = dpr;
        self
    }

    /// Set navigation completion criterion
    pub fn wait_until(mut self, wait_until: WaitUntil) -> Self {
        self.options.wait_until = wait_until;
        self
    }

    /// Set navigation timeout
    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.options.timeout_ms = ms;
        self
    }

    /// Set extra settle delay
    pub fn delay_ms(mut self, ms: u64) -> Self {
        self.options.delay_ms = ms;
        self
    }

    /// Enable/disable consent banner removal
    pub fn hide_cookie_banners(mut self, enabled: bool) -> Self {
        self.options.hide_cookie_banners = enabled;
        self
    }

    /// Enable/disable sticky bar flattening
    pub fn unstick_bars(mut self, enabled: bool) -> Self {
        self.options.unstick_bars = enabled;
        self
    }

    /// Set global CSS
    pub fn global_css<S: Into<String>>(mut self, css: S) -> Self {
        self.options.global_css = css.into();
        self
    }

    /// Set global JS
    pub fn global_js<S: Into<String>>(mut self, js: S) -> Self {
        self.options.global_js = js.into();
        self
    }

    /// Set site rules
    pub fn site_rules(mut self, rules: Vec<SiteRule>) -> Self {
        self.options.site_rules = rules;
        self
    }

    /// Set output directory
    pub fn output_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.options.output_dir = dir.into();
        self
    }

    /// Set naming strategy
    pub fn naming(mut self, naming: FileNaming) -> Self {
        self.options.naming = naming;
        self
    }

    /// Set user agent
    pub fn user_agent<S: Into<String>>(mut self, ua: S) -> Self {
        self.options.user_agent = Some(ua.into());
        self
    }

    /// Enable/disable `--no-sandbox`
    pub fn no_sandbox(mut self, no_sandbox: bool) -> Self {
        self.options.no_sandbox = no_sandbox;
        self
    }

    /// Set Chrome path
    pub fn chrome_path<S: Into<String>>(mut self, path: S) -> Self {
        self.options.chrome_path = Some(path.into());
        self
    }

    /// Set the single-page height limit
    pub fn single_page_max_inches(mut self, inches: f64) -> Self {
        self.options.single_page_max_inches = inches;
        self
    }

    /// Set the Letter margin, clamped so the content box stays positive
    pub fn margin_inches(mut self, inches: f64) -> Self {
        self.options.margin_inches = clamp_margin(inches);
        self
    }

    /// Build the options
    pub fn build(self) -> CaptureOptions {
        self.options
    }
}
