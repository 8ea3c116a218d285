//! Capture state machine tests
//!
//! These drive the orchestrator and the handoff through a scripted browser,
//! so no Chrome/Chromium instance is needed.

mod common;

use common::{cookie, png_bytes, FakeFactory, FakePage, ScriptedNotifier};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use tempfile::TempDir;
use web2pdf::capture::{
    CaptureOptions, CaptureOrchestrator, HandoffCoordinator, HandoffDecision, OutputMode,
    PageLayout, SiteRule, Strategy,
};
use web2pdf::error::{CaptureError, Error};

const URL: &str = "https://example.com/a/b.html?x=1";

struct Harness {
    factory: Arc<FakeFactory>,
    notifier: Arc<ScriptedNotifier>,
    orchestrator: CaptureOrchestrator,
    dir: TempDir,
}

impl Harness {
    fn new(primary: FakePage, visible: FakePage, decision: Option<HandoffDecision>) -> Self {
        Self::with_factory(FakeFactory::new(primary, visible), decision)
    }

    fn with_factory(factory: FakeFactory, decision: Option<HandoffDecision>) -> Self {
        let factory = Arc::new(factory);
        let notifier = Arc::new(ScriptedNotifier::new(decision));
        let orchestrator =
            CaptureOrchestrator::new(HandoffCoordinator::new(factory.clone(), notifier.clone()));
        Self {
            factory,
            notifier,
            orchestrator,
            dir: TempDir::new().unwrap(),
        }
    }

    fn options(&self, mode: OutputMode) -> CaptureOptions {
        CaptureOptions::builder()
            .mode(mode)
            .output_dir(self.dir.path())
            .build()
    }
}

#[tokio::test(start_paused = true)]
async fn test_clean_page_screenshot() {
    let h = Harness::new(FakePage::new(), FakePage::new(), None);
    let options = h.options(OutputMode::Screenshot);

    let result = h
        .orchestrator
        .capture_one(&h.factory.primary, URL, &options)
        .await
        .unwrap();

    assert_eq!(result.strategy, Strategy::Raster);
    assert_eq!(result.url, URL);
    assert_eq!(
        result.output_path,
        h.dir.path().join("example_com_a_b_html.pdf")
    );
    let bytes = std::fs::read(&result.output_path).unwrap();
    assert!(bytes.starts_with(b"%PDF"));
    assert_eq!(h.factory.visible_opened(), 0);
    assert_eq!(h.notifier.request_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_clean_page_print_uses_letter() {
    let h = Harness::new(FakePage::new(), FakePage::new(), None);
    let options = h.options(OutputMode::Print);

    let result = h
        .orchestrator
        .capture_one(&h.factory.primary, URL, &options)
        .await
        .unwrap();

    assert_eq!(result.strategy, Strategy::Print);
    assert_eq!(
        h.factory.primary.print_layouts(),
        vec![web2pdf::browser::PrintLayout::Letter { margin_in: 0.5 }]
    );
    assert_eq!(h.factory.primary.count("screenshot"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_single_layout_prints_exact_page() {
    let h = Harness::new(FakePage::new().content_height(960.0), FakePage::new(), None);
    let mut options = h.options(OutputMode::Print);
    options.layout = PageLayout::Single;

    h.orchestrator
        .capture_one(&h.factory.primary, URL, &options)
        .await
        .unwrap();

    assert_eq!(
        h.factory.primary.print_layouts(),
        vec![web2pdf::browser::PrintLayout::Exact {
            width_in: 1366.0 / 96.0,
            height_in: 10.0
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn test_print_failure_falls_back_to_raster() {
    let h = Harness::new(FakePage::new().print_fails(), FakePage::new(), None);
    let options = h.options(OutputMode::Print);

    let result = h
        .orchestrator
        .capture_one(&h.factory.primary, URL, &options)
        .await
        .unwrap();

    assert_eq!(result.strategy, Strategy::Raster);
    let calls = h.factory.primary.calls();
    let print_at = calls.iter().position(|c| c == "print").unwrap();
    let shot_at = calls.iter().position(|c| c == "screenshot").unwrap();
    assert!(print_at < shot_at);
}

#[tokio::test(start_paused = true)]
async fn test_both_strategies_failing_is_an_error() {
    let h = Harness::new(
        FakePage::new().print_fails().screenshot_fails(),
        FakePage::new(),
        None,
    );
    let options = h.options(OutputMode::Print);

    let err = h
        .orchestrator
        .capture_one(&h.factory.primary, URL, &options)
        .await
        .unwrap_err();

    match err {
        Error::Capture(CaptureError::Exhausted { url, causes }) => {
            assert_eq!(url, URL);
            assert!(causes.contains("print"));
            assert!(causes.contains("raster"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!h.dir.path().join("example_com_a_b_html.pdf").exists());
}

#[tokio::test(start_paused = true)]
async fn test_navigation_error_fails_url() {
    let h = Harness::new(FakePage::new().failing_url(URL), FakePage::new(), None);
    let options = h.options(OutputMode::Screenshot);

    let err = h
        .orchestrator
        .capture_one(&h.factory.primary, URL, &options)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Navigation(_)));
}

#[tokio::test(start_paused = true)]
async fn test_skip_captures_primary() {
    let h = Harness::new(
        FakePage::new().blocked(true),
        FakePage::new(),
        Some(HandoffDecision::skip()),
    );
    let options = h.options(OutputMode::Screenshot);

    let result = h
        .orchestrator
        .capture_one(&h.factory.primary, URL, &options)
        .await
        .unwrap();

    assert_eq!(result.strategy, Strategy::Raster);
    assert_eq!(h.notifier.request_count(), 1);
    assert_eq!(h.factory.visible_opened(), 1);
    assert_eq!(h.factory.visible_closed(), 1);
    assert_eq!(h.factory.primary.count("screenshot"), 1);
    assert_eq!(h.factory.visible.count("screenshot"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_decision_counts_as_skip() {
    let h = Harness::new(FakePage::new().blocked(true), FakePage::new(), None);
    let options = h.options(OutputMode::Screenshot);

    let result = h
        .orchestrator
        .capture_one(&h.factory.primary, URL, &options)
        .await
        .unwrap();

    assert_eq!(result.strategy, Strategy::Raster);
    assert_eq!(h.factory.visible_closed(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_visible_session_navigates_leniently() {
    let h = Harness::new(
        FakePage::new().blocked(true),
        FakePage::new(),
        Some(HandoffDecision::skip()),
    );
    let options = h.options(OutputMode::Screenshot);

    h.orchestrator
        .capture_one(&h.factory.primary, URL, &options)
        .await
        .unwrap();

    assert!(h
        .factory
        .visible
        .calls()
        .contains(&format!("navigate {} DomContentLoaded", URL)));
}

#[tokio::test(start_paused = true)]
async fn test_continue_screenshot_uses_visible_page() {
    let primary = FakePage::new()
        .blocked(true)
        .with_cookies(vec![cookie("tracking")]);
    let visible = FakePage::new()
        .png(png_bytes(60, 90))
        .with_cookies(vec![cookie("cf_clearance")]);
    let h = Harness::new(primary, visible, Some(HandoffDecision::proceed()));
    let options = h.options(OutputMode::Screenshot);

    let result = h
        .orchestrator
        .capture_one(&h.factory.primary, URL, &options)
        .await
        .unwrap();

    assert_eq!(result.strategy, Strategy::HandoffRaster);
    assert_eq!(h.factory.visible.count("screenshot"), 1);
    assert_eq!(h.factory.primary.count("screenshot"), 0);
    assert_eq!(h.factory.visible_closed(), 1);
    // Cookies flow both ways: seeded into the window, cleared cookies back
    assert!(h.factory.visible.cookie_names().contains(&"tracking".to_string()));
    assert!(h
        .factory
        .primary
        .cookie_names()
        .contains(&"cf_clearance".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_continue_print_on_cleared_primary() {
    let primary = FakePage::new().blocked(true).clears_with("cf_clearance");
    let visible = FakePage::new().with_cookies(vec![cookie("cf_clearance")]);
    let h = Harness::new(primary, visible, Some(HandoffDecision::proceed()));
    let options = h.options(OutputMode::Print);

    let result = h
        .orchestrator
        .capture_one(&h.factory.primary, URL, &options)
        .await
        .unwrap();

    assert_eq!(result.strategy, Strategy::HandoffPrint);
    assert_eq!(h.factory.primary.count("navigate"), 2);
    assert_eq!(h.factory.primary.count("print"), 1);
    assert_eq!(h.factory.visible.count("screenshot"), 0);
    assert_eq!(h.factory.visible_closed(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_continue_print_still_blocked_uses_visible() {
    let h = Harness::new(
        FakePage::new().blocked(true),
        FakePage::new(),
        Some(HandoffDecision::proceed()),
    );
    let options = h.options(OutputMode::Print);

    let result = h
        .orchestrator
        .capture_one(&h.factory.primary, URL, &options)
        .await
        .unwrap();

    assert_eq!(result.strategy, Strategy::HandoffRaster);
    assert_eq!(h.factory.primary.count("print"), 0);
    assert_eq!(h.factory.visible.count("screenshot"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_continue_print_failure_uses_visible() {
    let primary = FakePage::new()
        .blocked(true)
        .clears_with("cf_clearance")
        .print_fails();
    let visible = FakePage::new().with_cookies(vec![cookie("cf_clearance")]);
    let h = Harness::new(primary, visible, Some(HandoffDecision::proceed()));
    let options = h.options(OutputMode::Print);

    let result = h
        .orchestrator
        .capture_one(&h.factory.primary, URL, &options)
        .await
        .unwrap();

    assert_eq!(result.strategy, Strategy::HandoffRaster);
    assert_eq!(h.factory.primary.count("print"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unresolved_handoff_falls_back_to_primary() {
    let h = Harness::new(
        FakePage::new().blocked(true),
        FakePage::new().screenshot_fails(),
        Some(HandoffDecision::proceed()),
    );
    let options = h.options(OutputMode::Screenshot);

    let result = h
        .orchestrator
        .capture_one(&h.factory.primary, URL, &options)
        .await
        .unwrap();

    assert_eq!(result.strategy, Strategy::Raster);
    assert_eq!(h.factory.primary.count("screenshot"), 1);
    assert_eq!(h.factory.visible_opened(), 1);
    assert_eq!(h.factory.visible_closed(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_visible_launch_failure_falls_back_to_primary() {
    let mut factory = FakeFactory::new(FakePage::new().blocked(true), FakePage::new());
    factory.fail_visible = true;
    let h = Harness::with_factory(factory, Some(HandoffDecision::proceed()));
    let options = h.options(OutputMode::Screenshot);

    let result = h
        .orchestrator
        .capture_one(&h.factory.primary, URL, &options)
        .await
        .unwrap();

    assert_eq!(result.strategy, Strategy::Raster);
    assert_eq!(h.notifier.request_count(), 0);
    assert_eq!(h.factory.visible_closed(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_navigation_timeout_still_captures() {
    let h = Harness::new(FakePage::new().times_out(), FakePage::new(), None);
    let options = h.options(OutputMode::Screenshot);

    let result = h
        .orchestrator
        .capture_one(&h.factory.primary, URL, &options)
        .await
        .unwrap();

    assert_eq!(result.strategy, Strategy::Raster);
    assert!(result.output_path.exists());
    assert_eq!(h.factory.primary.count("navigate"), 1);
    assert_eq!(h.factory.primary.script_count("'position', 'static'"), 1);
    assert_eq!(h.factory.primary.count("screenshot"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_site_rules_apply_only_to_matching_host() {
    let h = Harness::new(FakePage::new(), FakePage::new(), None);
    let options = CaptureOptions::builder()
        .output_dir(h.dir.path())
        .site_rules(vec![
            SiteRule::new("example.com", "", "window.__mine = 1;"),
            SiteRule::new("other.org", "", "window.__theirs = 1;"),
        ])
        .build();

    h.orchestrator
        .capture_one(&h.factory.primary, URL, &options)
        .await
        .unwrap();

    assert_eq!(h.factory.primary.script_count("window.__mine = 1;"), 1);
    assert_eq!(h.factory.primary.script_count("window.__theirs = 1;"), 0);
}
