//! Page preparation against a scripted page

mod common;

use common::FakePage;
use pretty_assertions::assert_eq;
use tokio::time::{Duration, Instant};
use web2pdf::capture::{CaptureOptions, PageNormalizer, SiteRule};

const SCROLL_STEP: &str = "window.scrollBy(0, 1200)";
const SCROLL_TOP: &str = "window.scrollTo(0, 0)";

fn position(steps: &[String], needle: &str) -> usize {
    steps
        .iter()
        .position(|s| s.contains(needle))
        .unwrap_or_else(|| panic!("no step containing {:?} in {:#?}", needle, steps))
}

fn options() -> CaptureOptions {
    CaptureOptions::builder()
        .global_css("body { outline: 1px solid red; }")
        .global_js("window.__global = 1;")
        .build()
}

#[tokio::test(start_paused = true)]
async fn test_autoscroll_stops_when_height_settles() {
    let page = FakePage::new().scroll_heights(&[1000.0, 2000.0, 3000.0, 3000.0]);

    PageNormalizer::autoscroll(&page).await;

    assert_eq!(page.script_count(SCROLL_STEP), 3);
    let steps = page.page_steps();
    assert!(steps.last().unwrap().contains(SCROLL_TOP));
    assert_eq!(page.script_count(SCROLL_TOP), 1);
}

#[tokio::test(start_paused = true)]
async fn test_autoscroll_on_static_page_scrolls_once() {
    let page = FakePage::new();

    PageNormalizer::autoscroll(&page).await;

    assert_eq!(page.script_count(SCROLL_STEP), 1);
    assert_eq!(page.script_count(SCROLL_TOP), 1);
}

#[tokio::test(start_paused = true)]
async fn test_autoscroll_is_bounded_for_endless_pages() {
    let page = FakePage::new().endless_scroll();
    let started = Instant::now();

    PageNormalizer::autoscroll(&page).await;

    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(20), "{:?}", elapsed);
    assert!(elapsed < Duration::from_secs(21), "{:?}", elapsed);
    let steps = page.script_count(SCROLL_STEP);
    assert!((40..=50).contains(&steps), "{}", steps);
    assert!(page.page_steps().last().unwrap().contains(SCROLL_TOP));
}

#[tokio::test(start_paused = true)]
async fn test_failed_scroll_step_still_returns_to_top() {
    let page = FakePage::new().fail_script("scrollBy");

    PageNormalizer::autoscroll(&page).await;

    assert_eq!(page.script_count(SCROLL_STEP), 1);
    assert_eq!(page.script_count(SCROLL_TOP), 1);
}

#[tokio::test(start_paused = true)]
async fn test_prepare_runs_steps_in_order() {
    let page = FakePage::new();
    let rule = SiteRule::new("example.com", "nav { display: none; }", "window.__rule = 1;");

    PageNormalizer::prepare(&page, &options(), &[&rule]).await;

    let steps = page.page_steps();
    let order = [
        position(&steps, "document.fonts"),
        position(&steps, "wait_for Array.from(document.images)"),
        position(&steps, SCROLL_STEP),
        position(&steps, SCROLL_TOP),
        position(&steps, "onetrust-accept-btn-handler"),
        position(&steps, "const keywords"),
        position(&steps, "outline: 1px solid red"),
        position(&steps, "window.__global = 1;"),
        position(&steps, "nav { display: none; }"),
        position(&steps, "window.__rule = 1;"),
        position(&steps, "'position', 'static'"),
    ];
    assert!(order.windows(2).all(|w| w[0] < w[1]), "{:?}", order);
    assert!(steps[order[6]].contains("document.createElement('style')"));
}

#[tokio::test(start_paused = true)]
async fn test_disabled_steps_are_skipped() {
    let page = FakePage::new();
    let options = CaptureOptions::builder()
        .hide_cookie_banners(false)
        .unstick_bars(false)
        .build();

    PageNormalizer::prepare(&page, &options, &[]).await;

    assert_eq!(page.script_count("onetrust-accept-btn-handler"), 0);
    assert_eq!(page.script_count("const keywords"), 0);
    assert_eq!(page.script_count("'position', 'static'"), 0);
    assert_eq!(page.script_count("createElement('style')"), 0);
    assert_eq!(page.script_count(SCROLL_TOP), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failing_steps_do_not_stop_later_steps() {
    let page = FakePage::new()
        .fail_script("outline: 1px solid red")
        .fail_script("onetrust-accept-btn-handler");
    let rule = SiteRule::new("example.com", "nav { display: none; }", "window.__rule = 1;");

    PageNormalizer::prepare(&page, &options(), &[&rule]).await;

    assert_eq!(page.script_count("const keywords"), 1);
    assert_eq!(page.script_count("window.__global = 1;"), 1);
    assert_eq!(page.script_count("nav { display: none; }"), 1);
    assert_eq!(page.script_count("window.__rule = 1;"), 1);
    assert_eq!(page.script_count("'position', 'static'"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_extra_delay_is_honoured() {
    let page = FakePage::new();
    let options = CaptureOptions::builder().delay_ms(3_000).build();
    let started = Instant::now();

    PageNormalizer::prepare(&page, &options, &[]).await;

    assert!(started.elapsed() >= Duration::from_millis(3_000));
}

#[tokio::test(start_paused = true)]
async fn test_prepare_twice_is_harmless() {
    let page = FakePage::new();
    let options = options();

    PageNormalizer::prepare(&page, &options, &[]).await;
    PageNormalizer::prepare(&page, &options, &[]).await;

    assert_eq!(page.script_count("'position', 'static'"), 2);
    assert_eq!(page.script_count(SCROLL_TOP), 2);
}
