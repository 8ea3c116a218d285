//! Scripted browser for pipeline tests
//!
//! The fakes answer the pipeline's scripts by recognizing them, and record
//! every engine call so tests can assert on ordering.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashSet, VecDeque};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use web2pdf::browser::{
    BrowserPage, BrowserSession, NavigationOutcome, PrintLayout, SessionCookie, SessionFactory,
    WaitUntil,
};
use web2pdf::capture::captcha::SNAPSHOT_SCRIPT;
use web2pdf::capture::render::CONTENT_HEIGHT_SCRIPT;
use web2pdf::capture::{BatchControl, CaptureOptions, HandoffDecision, HumanNotifier};
use web2pdf::error::{CaptureError, NavigationError, Result};

/// Encode a solid PNG of the given size
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = image::RgbImage::from_pixel(width, height, image::Rgb([200, 120, 40]));
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, image::ImageFormat::Png)
        .expect("encode png");
    out.into_inner()
}

/// A challenge page snapshot
pub fn challenge_snapshot() -> Value {
    json!({
        "title": "just a moment...",
        "bodyText": "checking your browser before accessing example.com",
        "selectors": { "challengeForm": true }
    })
}

/// A clean page snapshot
pub fn clean_snapshot() -> Value {
    json!({ "title": "example domain", "bodyText": "hello", "selectors": {} })
}

pub fn cookie(name: &str) -> SessionCookie {
    SessionCookie {
        name: name.to_string(),
        value: "1".to_string(),
        domain: "example.com".to_string(),
        path: "/".to_string(),
        expires: None,
        http_only: false,
        secure: false,
        same_site: None,
    }
}

#[derive(Default)]
struct PageState {
    /// Page shows a challenge
    blocked: bool,
    /// Importing this cookie clears the challenge on the next navigation
    clears_with: Option<String>,
    cookie_jar: Vec<SessionCookie>,
    failing_urls: HashSet<String>,
    print_fails: bool,
    screenshot_fails: bool,
    evaluate_fails: bool,
    png: Vec<u8>,
    content_height: f64,
    /// Navigation gives up before the load event
    times_out: bool,
    /// Successive `scrollHeight` answers; the last one repeats
    scroll_heights: VecDeque<f64>,
    /// Every `scrollHeight` query sees a taller document
    endless_scroll: bool,
    /// Scripts containing any of these fail
    failing_scripts: Vec<String>,
    calls: Vec<String>,
    /// Evaluated scripts and wait predicates, in order
    scripts: Vec<String>,
    print_layouts: Vec<PrintLayout>,
}

/// A page whose behavior is configured up front
#[derive(Clone)]
pub struct FakePage {
    state: Arc<Mutex<PageState>>,
}

impl Default for FakePage {
    fn default() -> Self {
        Self::new()
    }
}

impl FakePage {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(PageState {
                png: png_bytes(40, 120),
                content_height: 1200.0,
                ..PageState::default()
            })),
        }
    }

    pub fn blocked(self, blocked: bool) -> Self {
        self.state.lock().unwrap().blocked = blocked;
        self
    }

    pub fn clears_with(self, cookie_name: &str) -> Self {
        self.state.lock().unwrap().clears_with = Some(cookie_name.to_string());
        self
    }

    pub fn with_cookies(self, cookies: Vec<SessionCookie>) -> Self {
        self.state.lock().unwrap().cookie_jar = cookies;
        self
    }

    pub fn failing_url(self, url: &str) -> Self {
        self.state.lock().unwrap().failing_urls.insert(url.to_string());
        self
    }

    pub fn print_fails(self) -> Self {
        self.state.lock().unwrap().print_fails = true;
        self
    }

    pub fn screenshot_fails(self) -> Self {
        self.state.lock().unwrap().screenshot_fails = true;
        self
    }

    pub fn evaluate_fails(self) -> Self {
        self.state.lock().unwrap().evaluate_fails = true;
        self
    }

    pub fn png(self, png: Vec<u8>) -> Self {
        self.state.lock().unwrap().png = png;
        self
    }

    pub fn content_height(self, px: f64) -> Self {
        self.state.lock().unwrap().content_height = px;
        self
    }

    pub fn times_out(self) -> Self {
        self.state.lock().unwrap().times_out = true;
        self
    }

    pub fn scroll_heights(self, heights: &[f64]) -> Self {
        self.state.lock().unwrap().scroll_heights = heights.iter().copied().collect();
        self
    }

    pub fn endless_scroll(self) -> Self {
        self.state.lock().unwrap().endless_scroll = true;
        self
    }

    pub fn fail_script(self, needle: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .failing_scripts
            .push(needle.to_string());
        self
    }

    pub fn scripts(&self) -> Vec<String> {
        self.state.lock().unwrap().scripts.clone()
    }

    /// Scripts that act on the page, without snapshot and height queries
    pub fn page_steps(&self) -> Vec<String> {
        self.scripts()
            .into_iter()
            .filter(|s| {
                s != SNAPSHOT_SCRIPT && s != CONTENT_HEIGHT_SCRIPT && !s.contains("scrollHeight")
            })
            .collect()
    }

    pub fn script_count(&self, needle: &str) -> usize {
        self.scripts().iter().filter(|s| s.contains(needle)).count()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(call)).count()
    }

    pub fn cookie_names(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.cookie_jar.iter().map(|c| c.name.clone()).collect()
    }

    pub fn print_layouts(&self) -> Vec<PrintLayout> {
        self.state.lock().unwrap().print_layouts.clone()
    }

    fn record(&self, call: String) {
        self.state.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl BrowserPage for FakePage {
    async fn navigate(
        &self,
        url: &str,
        wait_until: WaitUntil,
        _timeout: Duration,
    ) -> Result<NavigationOutcome> {
        self.record(format!("navigate {} {:?}", url, wait_until));
        let mut state = self.state.lock().unwrap();
        if state.failing_urls.contains(url) {
            return Err(NavigationError::LoadFailed("net::ERR_NAME_NOT_RESOLVED".into()).into());
        }
        if let Some(ref name) = state.clears_with {
            if state.cookie_jar.iter().any(|c| &c.name == name) {
                state.blocked = false;
            }
        }
        if state.times_out {
            return Ok(NavigationOutcome::TimedOut);
        }
        Ok(NavigationOutcome::Loaded)
    }

    async fn evaluate(&self, script: &str) -> Result<Value> {
        let mut state = self.state.lock().unwrap();
        state.scripts.push(script.to_string());
        if state.evaluate_fails || state.failing_scripts.iter().any(|n| script.contains(n)) {
            return Err(
                web2pdf::error::BrowserError::EvaluationFailed("context destroyed".into()).into(),
            );
        }
        if script == SNAPSHOT_SCRIPT {
            return Ok(if state.blocked {
                challenge_snapshot()
            } else {
                clean_snapshot()
            });
        }
        if script == CONTENT_HEIGHT_SCRIPT {
            return Ok(json!(state.content_height));
        }
        if script.contains("scrollHeight") {
            if state.endless_scroll {
                state.content_height += 1000.0;
            }
            let next = if state.scroll_heights.len() > 1 {
                state.scroll_heights.pop_front()
            } else {
                state.scroll_heights.front().copied()
            };
            return Ok(json!(next.unwrap_or(state.content_height)));
        }
        Ok(Value::Null)
    }

    async fn wait_for(&self, predicate: &str, _timeout: Duration) -> Result<bool> {
        self.state
            .lock()
            .unwrap()
            .scripts
            .push(format!("wait_for {}", predicate));
        Ok(true)
    }

    async fn screenshot_png(&self) -> Result<Vec<u8>> {
        self.record("screenshot".to_string());
        let state = self.state.lock().unwrap();
        if state.screenshot_fails {
            return Err(CaptureError::ScreenshotFailed("target closed".into()).into());
        }
        Ok(state.png.clone())
    }

    async fn print_pdf(&self, layout: PrintLayout) -> Result<Vec<u8>> {
        self.record("print".to_string());
        let mut state = self.state.lock().unwrap();
        state.print_layouts.push(layout);
        if state.print_fails {
            return Err(CaptureError::PdfFailed("Printing failed".into()).into());
        }
        Ok(b"%PDF-1.4 printed".to_vec())
    }

    async fn cookies(&self) -> Result<Vec<SessionCookie>> {
        Ok(self.state.lock().unwrap().cookie_jar.clone())
    }

    async fn set_cookies(&self, cookies: &[SessionCookie]) -> Result<()> {
        self.record(format!("set_cookies {}", cookies.len()));
        self.state
            .lock()
            .unwrap()
            .cookie_jar
            .extend(cookies.iter().cloned());
        Ok(())
    }
}

pub struct FakeSession {
    page: FakePage,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl BrowserSession for FakeSession {
    fn page(&self) -> &dyn BrowserPage {
        &self.page
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out sessions over a fixed primary and visible page
pub struct FakeFactory {
    pub primary: FakePage,
    pub visible: FakePage,
    pub primary_opens: AtomicUsize,
    pub visible_opens: AtomicUsize,
    pub primary_closes: Arc<AtomicUsize>,
    pub visible_closes: Arc<AtomicUsize>,
    pub fail_primary: bool,
    pub fail_visible: bool,
}

impl FakeFactory {
    pub fn new(primary: FakePage, visible: FakePage) -> Self {
        Self {
            primary,
            visible,
            primary_opens: AtomicUsize::new(0),
            visible_opens: AtomicUsize::new(0),
            primary_closes: Arc::new(AtomicUsize::new(0)),
            visible_closes: Arc::new(AtomicUsize::new(0)),
            fail_primary: false,
            fail_visible: false,
        }
    }

    pub fn visible_opened(&self) -> usize {
        self.visible_opens.load(Ordering::SeqCst)
    }

    pub fn visible_closed(&self) -> usize {
        self.visible_closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionFactory for FakeFactory {
    async fn open_primary(&self, _options: &CaptureOptions) -> Result<Box<dyn BrowserSession>> {
        if self.fail_primary {
            return Err(web2pdf::error::BrowserError::LaunchFailed("no chrome".into()).into());
        }
        self.primary_opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            page: self.primary.clone(),
            closes: self.primary_closes.clone(),
        }))
    }

    async fn open_visible(&self, _options: &CaptureOptions) -> Result<Box<dyn BrowserSession>> {
        if self.fail_visible {
            return Err(web2pdf::error::BrowserError::LaunchFailed("no display".into()).into());
        }
        self.visible_opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            page: self.visible.clone(),
            closes: self.visible_closes.clone(),
        }))
    }
}

/// Answers every request with a fixed decision; `None` drops the sender
pub struct ScriptedNotifier {
    decision: Option<HandoffDecision>,
    stop: Option<BatchControl>,
    pub requests: Mutex<Vec<String>>,
}

impl ScriptedNotifier {
    pub fn new(decision: Option<HandoffDecision>) -> Self {
        Self {
            decision,
            stop: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Request a batch stop while answering
    pub fn stopping(mut self, control: BatchControl) -> Self {
        self.stop = Some(control);
        self
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl HumanNotifier for ScriptedNotifier {
    fn request(&self, url: &str) -> oneshot::Receiver<HandoffDecision> {
        self.requests.lock().unwrap().push(url.to_string());
        if let Some(ref control) = self.stop {
            control.request_stop();
        }
        let (tx, rx) = oneshot::channel();
        if let Some(decision) = self.decision {
            let _ = tx.send(decision);
        }
        rx
    }
}
