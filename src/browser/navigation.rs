//! Page navigation functionality
//!
//! This module handles URL navigation with a configurable completion
//! criterion. A navigation that outlives its timeout is not an error: the
//! caller proceeds with whatever the page rendered.

use crate::browser::{NavigationOutcome, PageHandle};
use crate::error::{Error, NavigationError, Result};
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::error::CdpError;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Condition to wait for after navigation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
pub enum WaitUntil {
    /// Wait until load event fires
    #[serde(rename = "load")]
    #[value(name = "load")]
    Load,
    /// Wait until DOMContentLoaded event fires
    #[serde(rename = "domcontentloaded")]
    #[value(name = "domcontentloaded")]
    DomContentLoaded,
    /// Wait until load fired and no new resources arrived for a while
    #[default]
    #[serde(rename = "networkidle")]
    #[value(name = "networkidle")]
    NetworkIdle,
}

/// Milliseconds without new resource entries that count as network idle
const NETWORK_IDLE_MS: u64 = 500;

/// URL validation utilities
pub struct UrlValidator;

impl UrlValidator {
    /// Validate a URL for navigation
    pub fn validate(url: &str) -> std::result::Result<(), String> {
        if url.is_empty() {
            return Err("URL cannot be empty".to_string());
        }

        if !url.starts_with("http://")
            && !url.starts_with("https://")
            && !url.starts_with("file://")
        {
            return Err(format!(
                "URL must start with http://, https://, or file://: {}",
                url
            ));
        }

        if url::Url::parse(url).is_err() {
            return Err(format!("URL is malformed: {}", url));
        }

        Ok(())
    }
}

/// Page navigator
pub struct PageNavigator;

impl PageNavigator {
    /// Navigate to a URL and wait for `wait_until`, bounded by `timeout`
    #[instrument(skip(page))]
    pub async fn goto(
        page: &PageHandle,
        url: &str,
        wait_until: WaitUntil,
        timeout: Duration,
    ) -> Result<NavigationOutcome> {
        UrlValidator::validate(url).map_err(NavigationError::InvalidUrl)?;

        info!("Navigating to: {}", url);
        let start = Instant::now();

        let navigation = async {
            let started = match wait_until {
                WaitUntil::DomContentLoaded => {
                    // Page.navigate returns on commit, without waiting for load
                    match page.page.execute(NavigateParams::new(url)).await {
                        Ok(response) => match response.error_text {
                            Some(ref error_text) => {
                                return Err(NavigationError::LoadFailed(error_text.clone()).into())
                            }
                            None => Ok(()),
                        },
                        Err(e) => Err(e),
                    }
                }
                WaitUntil::Load | WaitUntil::NetworkIdle => page.page.goto(url).await.map(|_| ()),
            };
            match started {
                Ok(()) => {}
                Err(CdpError::Timeout) => return Ok(NavigationOutcome::TimedOut),
                Err(e) => return Err(NavigationError::LoadFailed(e.to_string()).into()),
            }
            Self::wait_for_ready(&page.page, wait_until).await?;
            Ok::<_, Error>(NavigationOutcome::Loaded)
        };

        let outcome = match tokio::time::timeout(timeout, navigation).await {
            Ok(result) => result?,
            Err(_) => NavigationOutcome::TimedOut,
        };

        let final_url = page
            .page
            .url()
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| url.to_string());

        match outcome {
            NavigationOutcome::Loaded => debug!(
                "Navigation complete: {} -> {} in {}ms",
                url,
                final_url,
                start.elapsed().as_millis()
            ),
            NavigationOutcome::TimedOut => warn!(
                "Navigation timed out after {}ms; proceeding with whatever rendered",
                timeout.as_millis()
            ),
        }

        Ok(outcome)
    }

    /// Wait for page to be ready based on wait_until condition
    async fn wait_for_ready(page: &chromiumoxide::Page, wait_until: WaitUntil) -> Result<()> {
        let script = match wait_until {
            WaitUntil::Load => r#"
                new Promise(resolve => {
                    if (document.readyState === 'complete') {
                        resolve(true);
                    } else {
                        window.addEventListener('load', () => resolve(true));
                    }
                })
            "#
            .to_string(),
            WaitUntil::DomContentLoaded => r#"
                new Promise(resolve => {
                    if (document.readyState !== 'loading') {
                        resolve(true);
                    } else {
                        document.addEventListener('DOMContentLoaded', () => resolve(true));
                    }
                })
            "#
            .to_string(),
            WaitUntil::NetworkIdle => format!(
                r#"
                (async () => {{
                    const idleMs = {idle};
                    const interval = 100;
                    const count = () => {{
                        try {{ return performance.getEntriesByType('resource').length; }}
                        catch (_) {{ return 0; }}
                    }};
                    let last = count();
                    let stable = 0;
                    while (true) {{
                        await new Promise(r => setTimeout(r, interval));
                        const cur = count();
                        if (document.readyState === 'complete' && cur === last) {{
                            stable += interval;
                            if (stable >= idleMs) return true;
                        }} else {{
                            stable = 0;
                        }}
                        last = cur;
                    }}
                }})()
                "#,
                idle = NETWORK_IDLE_MS
            ),
        };

        page.evaluate(script.as_str())
            .await
            .map_err(|e| Error::cdp(e.to_string()))?;

        Ok(())
    }
}
