//! Page preparation before capture
//!
//! Every step is best-effort: failures are logged and the next step runs.
//! Running [`PageNormalizer::prepare`] twice on the same page is harmless.

use crate::browser::BrowserPage;
use crate::capture::options::CaptureOptions;
use crate::capture::site_rules::SiteRule;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Upper bound for the fonts/images wait
const ASSET_WAIT_CAP: Duration = Duration::from_millis(15_000);
/// Pixels scrolled per autoscroll step
const SCROLL_STEP_PX: u32 = 1200;
/// Pause after each autoscroll step
const SCROLL_PAUSE: Duration = Duration::from_millis(400);
/// Total autoscroll budget
const SCROLL_MAX: Duration = Duration::from_millis(20_000);
/// Pause once the document stops growing
const SCROLL_SETTLE: Duration = Duration::from_millis(500);
/// Pause after consent controls were clicked
const CLICK_PAUSE: Duration = Duration::from_millis(250);
/// Final settle before capture
const SETTLE: Duration = Duration::from_millis(250);

const FONTS_READY_SCRIPT: &str = r#"
(async () => {
  if (document.fonts && document.fonts.ready) { await document.fonts.ready; }
  return true;
})()
"#;

const IMAGES_COMPLETE_PREDICATE: &str = "Array.from(document.images).every(img => img.complete)";

const SCROLL_HEIGHT_SCRIPT: &str = "document.documentElement.scrollHeight";

const SCROLL_TOP_SCRIPT: &str = "window.scrollTo(0, 0); true";

const CLICK_CONSENT_SCRIPT: &str = r#"
(() => {
  const pattern = /accept( all)?|agree|got it|i understand|continue/i;
  const visible = (el) => {
    const r = el.getBoundingClientRect();
    const cs = getComputedStyle(el);
    return r.width > 0 && r.height > 0 && cs.visibility !== 'hidden' && cs.display !== 'none';
  };
  const candidates = new Set();
  document.querySelectorAll('button, a').forEach(el => {
    if (pattern.test(el.innerText || el.textContent || '')) candidates.add(el);
  });
  [
    '#onetrust-accept-btn-handler',
    '#onetrust-reject-all-handler',
    "[data-action='accept']",
    '[data-didomi-accept-button]',
    "[class*='qc-cmp']"
  ].forEach(sel => {
    try { document.querySelectorAll(sel).forEach(el => candidates.add(el)); } catch (_) {}
  });
  let clicked = 0;
  candidates.forEach(el => {
    try {
      if (visible(el)) { el.click(); clicked++; }
    } catch (_) {}
  });
  return clicked;
})()
"#;

const REMOVE_OVERLAYS_SCRIPT: &str = r#"
(() => {
  const selectors = [
    "[id*='onetrust']", "[class*='onetrust']", "[id*='cmp']", "[class*='cmp']",
    "[id*='consent']", "[class*='consent']", "[id*='cookie']", "[class*='cookie']",
    "[aria-label*='cookie' i]", "[role='dialog'] [class*='cookie']", "[role='dialog'][id*='cookie']",
    "div[style*='position: fixed']", "div[class*='sticky']", "div[id*='sticky']",
    "footer[style*='position: fixed']"
  ];
  const keywords = ['cookie', 'consent', 'cmp', 'onetrust', 'gdpr', 'quantcast', 'didomi'];
  let removed = 0;
  for (const sel of selectors) {
    let nodes;
    try { nodes = document.querySelectorAll(sel); } catch (_) { continue; }
    nodes.forEach(n => {
      if (!n.isConnected) return;
      const cls = typeof n.className === 'string' ? n.className : (n.getAttribute('class') || '');
      const text = (n.id + ' ' + cls + ' ' + (n.getAttribute('aria-label') || '')).toLowerCase();
      if (keywords.some(k => text.includes(k))) {
        n.remove(); removed++;
        return;
      }
      const cs = getComputedStyle(n);
      if (cs && cs.position === 'fixed') {
        const r = n.getBoundingClientRect();
        if (r.height >= 40 && r.width >= 200) { n.remove(); removed++; }
      }
    });
  }
  return removed;
})()
"#;

const UNSTICK_SCRIPT: &str = r#"
(() => {
  let changed = 0;
  const vh = window.innerHeight || 800;
  for (const el of document.querySelectorAll('body *')) {
    const cs = getComputedStyle(el);
    if (!cs || (cs.position !== 'fixed' && cs.position !== 'sticky')) continue;
    const r = el.getBoundingClientRect();
    if (!(r.top < 20 || (vh - r.bottom) < 20)) continue;
    if (r.width < 200 || r.height < 32) continue;
    const role = (el.getAttribute('role') || '').toLowerCase();
    if (role === 'dialog' || role === 'alert') continue;
    for (const [prop, value] of [['position', 'static'], ['top', 'auto'], ['bottom', 'auto'],
                                 ['left', 'auto'], ['right', 'auto'], ['z-index', 'auto']]) {
      el.style.setProperty(prop, value, 'important');
    }
    changed++;
  }
  return changed;
})()
"#;

/// Script that appends `css` as a style element
pub fn style_injection_script(css: &str) -> String {
    // A JSON string literal is a valid JS string literal
    let literal = serde_json::Value::String(css.to_string()).to_string();
    format!(
        "(() => {{ const s = document.createElement('style'); s.textContent = {}; \
         (document.head || document.documentElement).appendChild(s); return true; }})()",
        literal
    )
}

/// Makes a loaded page ready for capture
pub struct PageNormalizer;

impl PageNormalizer {
    /// Run every preparation step in order
    #[instrument(skip_all)]
    pub async fn prepare(page: &dyn BrowserPage, options: &CaptureOptions, rules: &[&SiteRule]) {
        let asset_bound = ASSET_WAIT_CAP.min(Duration::from_millis(options.timeout_ms));
        info!("Waiting for fonts and images");
        Self::wait_for_assets(page, asset_bound).await;

        info!("Triggering lazy-load");
        Self::autoscroll(page).await;

        if options.hide_cookie_banners {
            info!("Removing cookie/consent overlays");
            Self::dismiss_cookie_banners(page).await;
        }

        Self::inject_css(page, "global", &options.global_css).await;
        Self::run_js(page, "global", &options.global_js).await;
        for rule in rules {
            Self::inject_css(page, &rule.domain, &rule.css).await;
            Self::run_js(page, &rule.domain, &rule.js).await;
        }

        if options.unstick_bars {
            info!("Converting sticky/fixed bars to static flow");
            Self::unstick_bars(page).await;
        }

        tokio::time::sleep(SETTLE).await;
        if options.delay_ms > 0 {
            debug!("Extra delay of {}ms", options.delay_ms);
            tokio::time::sleep(Duration::from_millis(options.delay_ms)).await;
        }
    }

    /// Wait for web fonts and images, each bounded by `bound`
    pub async fn wait_for_assets(page: &dyn BrowserPage, bound: Duration) {
        match tokio::time::timeout(bound, page.evaluate(FONTS_READY_SCRIPT)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => debug!("Fonts wait failed: {}", e),
            Err(_) => debug!("Fonts not ready after {}ms", bound.as_millis()),
        }
        match page.wait_for(IMAGES_COMPLETE_PREDICATE, bound).await {
            Ok(true) => {}
            Ok(false) => debug!("Images still loading after {}ms", bound.as_millis()),
            Err(e) => debug!("Images wait failed: {}", e),
        }
    }

    /// Scroll down in steps until the document stops growing, then return to top
    pub async fn autoscroll(page: &dyn BrowserPage) {
        let started = Instant::now();
        let mut last_height = Self::scroll_height(page).await;
        let step = format!("window.scrollBy(0, {}); true", SCROLL_STEP_PX);
        let mut steps = 0u32;

        while started.elapsed() < SCROLL_MAX {
            if let Err(e) = page.evaluate(&step).await {
                debug!("Scroll step failed: {}", e);
                break;
            }
            steps += 1;
            tokio::time::sleep(SCROLL_PAUSE).await;
            let Some(height) = Self::scroll_height(page).await else {
                break;
            };
            if last_height.is_some_and(|last| height <= last) {
                tokio::time::sleep(SCROLL_SETTLE).await;
                break;
            }
            last_height = Some(height);
        }
        debug!("Autoscroll finished after {} steps", steps);

        if let Err(e) = page.evaluate(SCROLL_TOP_SCRIPT).await {
            debug!("Scroll to top failed: {}", e);
        }
    }

    async fn scroll_height(page: &dyn BrowserPage) -> Option<f64> {
        page.evaluate(SCROLL_HEIGHT_SCRIPT)
            .await
            .ok()
            .and_then(|v| v.as_f64())
    }

    /// Click consent controls, then remove remaining overlays
    pub async fn dismiss_cookie_banners(page: &dyn BrowserPage) {
        match page.evaluate(CLICK_CONSENT_SCRIPT).await {
            Ok(value) => {
                let clicked = value.as_u64().unwrap_or(0);
                if clicked > 0 {
                    debug!("Clicked {} consent controls", clicked);
                    tokio::time::sleep(CLICK_PAUSE).await;
                }
            }
            Err(e) => warn!("Consent click failed: {}", e),
        }

        match page.evaluate(REMOVE_OVERLAYS_SCRIPT).await {
            Ok(value) => {
                let removed = value.as_u64().unwrap_or(0);
                if removed > 0 {
                    debug!("Removed {} consent/overlay elements", removed);
                }
            }
            Err(e) => warn!("Overlay removal failed: {}", e),
        }
    }

    /// Flatten fixed/sticky bars hugging the viewport edges
    pub async fn unstick_bars(page: &dyn BrowserPage) {
        match page.evaluate(UNSTICK_SCRIPT).await {
            Ok(value) => {
                let changed = value.as_u64().unwrap_or(0);
                if changed > 0 {
                    debug!("Converted {} sticky/fixed bars to static flow", changed);
                }
            }
            Err(e) => warn!("Unstick failed: {}", e),
        }
    }

    async fn inject_css(page: &dyn BrowserPage, scope: &str, css: &str) {
        if css.trim().is_empty() {
            return;
        }
        match page.evaluate(&style_injection_script(css)).await {
            Ok(_) => debug!("Applied {} CSS", scope),
            Err(e) => warn!("{} CSS failed: {}", scope, e),
        }
    }

    async fn run_js(page: &dyn BrowserPage, scope: &str, js: &str) {
        if js.trim().is_empty() {
            return;
        }
        match page.evaluate(js).await {
            Ok(_) => debug!("Executed {} JS", scope),
            Err(e) => warn!("{} JS failed: {}", scope, e),
        }
    }
}
