//! Output file naming

use chrono::{DateTime, Local};
use regex::Regex;
use std::sync::OnceLock;

/// Longest base name kept before the `.pdf` extension
const MAX_BASE_LEN: usize = 200;

fn illegal_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1F\x7F-\x9F]+"#).expect("static regex"))
}

fn underscore_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"_+").expect("static regex"))
}

/// Replace characters that are illegal in file names and collapse the
/// resulting underscores. Never returns an empty string.
pub fn sanitize_filename_component(raw: &str) -> String {
    let replaced = illegal_chars().replace_all(raw.trim(), "_");
    let collapsed = underscore_runs().replace_all(&replaced, "_");
    let trimmed = collapsed.trim_matches('_');
    if trimmed.is_empty() {
        return "file".to_string();
    }
    truncate_chars(trimmed, MAX_BASE_LEN)
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].trim_end_matches('_').to_string(),
        None => s.to_string(),
    }
}

/// Deterministic file name derived from host and path.
///
/// `https://example.com/a/b.html?x=1` becomes `example_com_a_b_html.pdf`.
/// Query and fragment are dropped.
pub fn url_to_filename(url: &str) -> String {
    let (host, path) = match url::Url::parse(url) {
        Ok(parsed) => {
            let host = match (parsed.host_str(), parsed.port()) {
                (Some(h), Some(port)) => format!("{}:{}", h, port),
                (Some(h), None) => h.to_string(),
                (None, _) => String::new(),
            };
            (host, parsed.path().to_string())
        }
        Err(_) => {
            let end = url.find(['?', '#']).unwrap_or(url.len());
            (String::new(), url[..end].to_string())
        }
    };

    let host = if host.is_empty() {
        "site".to_string()
    } else {
        host.replace('.', "_")
    };

    let mut path = path.strip_suffix('/').unwrap_or(&path).to_string();
    if path.is_empty() {
        path = "/index.html".to_string();
    }
    let path_part = path.trim_start_matches('/').replace(['/', '.'], "_");

    let base = if path_part.is_empty() {
        host
    } else {
        format!("{}_{}", host, path_part)
    };

    with_pdf_extension(sanitize_filename_component(&base))
}

/// Sanitized full URL followed by the capture timestamp.
pub fn timestamped_filename(url: &str, at: DateTime<Local>) -> String {
    format!(
        "{}_{}.pdf",
        sanitize_filename_component(url),
        at.format("%Y%m%d_%H%M%S")
    )
}

fn with_pdf_extension(mut base: String) -> String {
    if !base.to_lowercase().ends_with(".pdf") {
        base.push_str(".pdf");
    }
    base
}
