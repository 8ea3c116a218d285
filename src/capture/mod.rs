//! Capture pipeline
//!
//! Everything here talks to the browser through the traits in
//! [`crate::browser::page`], so the pipeline runs unchanged against CDP or a
//! scripted page.

pub mod batch;
pub mod captcha;
pub mod handoff;
pub mod naming;
pub mod normalize;
pub mod options;
pub mod orchestrator;
pub mod raster;
pub mod render;
pub mod site_rules;

pub use batch::{
    BatchControl, BatchEvent, BatchHandle, BatchReport, BatchRunner, BatchState, UrlFailure,
};
pub use captcha::{CaptchaDetection, PageSnapshot, Provider};
pub use handoff::{
    ChannelNotifier, HandoffAction, HandoffCoordinator, HandoffDecision, HandoffOutcome,
    HandoffRequest, HumanNotifier,
};
pub use normalize::PageNormalizer;
pub use options::{CaptureOptions, CaptureOptionsBuilder, FileNaming, OutputMode, PageLayout};
pub use orchestrator::{CaptureOrchestrator, CaptureResult, CaptureState, Strategy};
pub use raster::RasterPaginator;
pub use render::Renderer;
pub use site_rules::{ParseIssue, SiteRule};
