//! Anti-bot challenge detection
//!
//! A fixed script gathers a [`PageSnapshot`] in page context; classification
//! runs in Rust over a table of signal rules, so it can be tested without a
//! browser.

use crate::browser::BrowserPage;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

/// Script returning the raw material for classification
pub const SNAPSHOT_SCRIPT: &str = r##"
(() => {
  const d = document;
  const sel = (s) => { try { return !!d.querySelector(s); } catch (_) { return false; } };
  return {
    title: (d.title || "").toLowerCase(),
    bodyText: (d.body ? d.body.innerText || "" : "").toLowerCase(),
    selectors: {
      cfChallenge: sel("#cf-challenge"),
      challengeForm: sel("#challenge-form"),
      challengeStage: sel("#challenge-stage"),
      cloudflareIframe: sel("iframe[src*='challenges.cloudflare.com']"),
      recaptchaIframe: sel("iframe[src*='www.google.com/recaptcha']"),
      recaptchaWidget: sel(".g-recaptcha"),
      hcaptchaIframe: sel("iframe[src*='hcaptcha.com']")
    }
  };
})()
"##;

/// Challenge provider, in decreasing precedence
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Cloudflare Turnstile or interstitial
    Cloudflare,
    /// Google reCAPTCHA
    Recaptcha,
    /// hCaptcha
    Hcaptcha,
    /// A human check of unknown origin
    Generic,
    /// Nothing detected
    #[default]
    Unknown,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Provider::Cloudflare => "cloudflare",
            Provider::Recaptcha => "recaptcha",
            Provider::Hcaptcha => "hcaptcha",
            Provider::Generic => "generic",
            Provider::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Selector presence flags gathered by [`SNAPSHOT_SCRIPT`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SelectorFlags {
    /// `#cf-challenge`
    pub cf_challenge: bool,
    /// `#challenge-form`
    pub challenge_form: bool,
    /// `#challenge-stage`
    pub challenge_stage: bool,
    /// Turnstile iframe
    pub cloudflare_iframe: bool,
    /// reCAPTCHA iframe
    pub recaptcha_iframe: bool,
    /// `.g-recaptcha`
    pub recaptcha_widget: bool,
    /// hCaptcha iframe
    pub hcaptcha_iframe: bool,
}

/// Page state relevant to challenge detection. Text is lower-cased.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PageSnapshot {
    /// Document title
    pub title: String,
    /// Body inner text
    pub body_text: String,
    /// Provider selector presence
    pub selectors: SelectorFlags,
}

impl PageSnapshot {
    /// Snapshot with the given title and body text, lower-casing both
    pub fn from_text(title: &str, body_text: &str) -> Self {
        Self {
            title: title.to_lowercase(),
            body_text: body_text.to_lowercase(),
            selectors: SelectorFlags::default(),
        }
    }

    fn body_has(&self, needle: &str) -> bool {
        self.body_text.contains(needle)
    }
}

/// Result of one detection pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptchaDetection {
    /// True exactly when `signals` is non-empty
    pub found: bool,
    /// Highest-precedence provider among the signals
    pub provider: Provider,
    /// Names of the signals that fired, in table order
    pub signals: Vec<String>,
}

struct SignalRule {
    name: &'static str,
    family: Provider,
    test: fn(&PageSnapshot) -> bool,
}

const SIGNAL_RULES: &[SignalRule] = &[
    SignalRule {
        name: "text: verify you are human",
        family: Provider::Generic,
        test: |s| s.body_has("verify you are human"),
    },
    SignalRule {
        name: "text: i'm not a robot",
        family: Provider::Generic,
        test: |s| s.body_has("i'm not a robot") || s.body_has("im not a robot"),
    },
    // Cloudflare's interstitial wording
    SignalRule {
        name: "text: checking your browser",
        family: Provider::Cloudflare,
        test: |s| s.body_has("checking your browser before accessing"),
    },
    SignalRule {
        name: "text: security check",
        family: Provider::Generic,
        test: |s| s.body_has("complete the security check"),
    },
    SignalRule {
        name: "title: just a moment",
        family: Provider::Generic,
        test: |s| s.title.contains("just a moment"),
    },
    SignalRule {
        name: "title: attention required",
        family: Provider::Generic,
        test: |s| s.title.contains("attention required"),
    },
    SignalRule {
        name: "cloudflare selectors",
        family: Provider::Cloudflare,
        test: |s| {
            let f = &s.selectors;
            f.cf_challenge
                || f.challenge_form
                || f.challenge_stage
                || f.cloudflare_iframe
                || s.body_has("cloudflare")
        },
    },
    SignalRule {
        name: "recaptcha selectors",
        family: Provider::Recaptcha,
        test: |s| {
            s.selectors.recaptcha_iframe || s.selectors.recaptcha_widget || s.body_has("recaptcha")
        },
    },
    SignalRule {
        name: "hcaptcha selectors",
        family: Provider::Hcaptcha,
        test: |s| s.selectors.hcaptcha_iframe || s.body_has("hcaptcha"),
    },
];

/// Classify a snapshot against the signal table
pub fn classify(snapshot: &PageSnapshot) -> CaptchaDetection {
    let fired: Vec<&SignalRule> = SIGNAL_RULES
        .iter()
        .filter(|rule| (rule.test)(snapshot))
        .collect();

    let provider = fired
        .iter()
        .map(|rule| rule.family)
        .min()
        .unwrap_or(Provider::Unknown);

    CaptchaDetection {
        found: !fired.is_empty(),
        provider,
        signals: fired.iter().map(|rule| rule.name.to_string()).collect(),
    }
}

/// Snapshot the page and classify it.
///
/// Any evaluation failure yields an empty detection.
#[instrument(skip(page))]
pub async fn detect(page: &dyn BrowserPage) -> CaptchaDetection {
    let snapshot = match page.evaluate(SNAPSHOT_SCRIPT).await {
        Ok(value) => match serde_json::from_value::<PageSnapshot>(value) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Challenge snapshot malformed: {}", e);
                return CaptchaDetection::default();
            }
        },
        Err(e) => {
            warn!("Challenge snapshot failed: {}", e);
            return CaptchaDetection::default();
        }
    };

    let detection = classify(&snapshot);
    debug!(
        found = detection.found,
        provider = %detection.provider,
        "Challenge detection: {:?}",
        detection.signals
    );
    detection
}
