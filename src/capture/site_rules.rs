//! Domain-scoped CSS/JS overrides
//!
//! Rules are written as blocks:
//!
//! ```text
//! @domain example.com
//! CSS:
//! .paywall { display: none !important; }
//! JS:
//! document.querySelector('#more')?.click();
//! @end
//! ```
//!
//! Both sections are optional. A rule for `example.com` also applies to
//! every subdomain, and all matching rules apply in declaration order.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// One parsed override block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteRule {
    /// Lower-cased host suffix without leading dot
    pub domain: String,
    /// CSS injected as a style element
    pub css: String,
    /// JS evaluated in page context
    pub js: String,
}

impl SiteRule {
    /// Create a rule, normalizing the domain
    pub fn new(domain: &str, css: impl Into<String>, js: impl Into<String>) -> Self {
        Self {
            domain: normalize_domain(domain),
            css: css.into(),
            js: js.into(),
        }
    }

    /// Whether this rule applies to `host` (exact or subdomain match)
    pub fn matches(&self, host: &str) -> bool {
        let host = host.trim().to_lowercase();
        if self.domain.is_empty() {
            return false;
        }
        host == self.domain
            || host
                .strip_suffix(self.domain.as_str())
                .is_some_and(|prefix| prefix.ends_with('.'))
    }
}

fn normalize_domain(raw: &str) -> String {
    raw.trim().trim_start_matches('.').to_lowercase()
}

/// A recoverable problem found while parsing rule text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIssue {
    /// 1-based line number
    pub line: usize,
    /// What went wrong
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token<'a> {
    Domain(&'a str),
    Css(&'a str),
    Js(&'a str),
    End,
    Text(&'a str),
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &s[prefix.len()..])
}

fn tokenize_line(line: &str) -> Token<'_> {
    let trimmed = line.trim();
    if let Some(rest) = strip_prefix_ignore_case(trimmed, "@domain") {
        if rest.is_empty() || rest.starts_with(char::is_whitespace) {
            return Token::Domain(rest.trim());
        }
    }
    if trimmed.eq_ignore_ascii_case("@end") {
        return Token::End;
    }
    if let Some(rest) = strip_prefix_ignore_case(trimmed, "CSS:") {
        return Token::Css(rest.trim());
    }
    if let Some(rest) = strip_prefix_ignore_case(trimmed, "JS:") {
        return Token::Js(rest.trim());
    }
    Token::Text(line)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Css,
    Js,
}

/// Headers only open sections in `CSS:` then `JS:` order; anything else is body text
fn demote_header<'a>(token: Token<'a>, section: Option<Section>, line: &'a str) -> Token<'a> {
    match (token, section) {
        (Token::Css(_), Some(Section::Css | Section::Js)) | (Token::Js(_), Some(Section::Js)) => {
            Token::Text(line)
        }
        (token, _) => token,
    }
}

struct OpenBlock {
    domain: String,
    line: usize,
    section: Section,
    css: Vec<String>,
    js: Vec<String>,
}

impl OpenBlock {
    fn new(domain: &str, line: usize) -> Self {
        Self {
            domain: normalize_domain(domain),
            line,
            section: Section::None,
            css: Vec::new(),
            js: Vec::new(),
        }
    }

    fn push(&mut self, text: &str) -> bool {
        match self.section {
            Section::Css => self.css.push(text.to_string()),
            Section::Js => self.js.push(text.to_string()),
            Section::None => return text.trim().is_empty(),
        }
        true
    }

    fn finish(self) -> SiteRule {
        SiteRule {
            domain: self.domain,
            css: self.css.join("\n").trim().to_string(),
            js: self.js.join("\n").trim().to_string(),
        }
    }
}

/// Parse rule text, returning the rules and every recoverable problem.
///
/// A block that is not closed by `@end` before the next `@domain` (or the
/// end of input) produces no rule; parsing resumes at the next block.
pub fn parse_with_issues(text: &str) -> (Vec<SiteRule>, Vec<ParseIssue>) {
    let mut rules = Vec::new();
    let mut issues = Vec::new();
    let mut open: Option<OpenBlock> = None;

    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let section = open.as_ref().map(|block| block.section);
        match demote_header(tokenize_line(line), section, line) {
            Token::Domain(domain) => {
                if let Some(prev) = open.take() {
                    issues.push(ParseIssue {
                        line: prev.line,
                        message: format!("block for '{}' is missing @end", prev.domain),
                    });
                }
                open = Some(OpenBlock::new(domain, line_no));
            }
            Token::End => match open.take() {
                Some(block) if block.domain.is_empty() => issues.push(ParseIssue {
                    line: block.line,
                    message: "@domain without a host".to_string(),
                }),
                Some(block) => rules.push(block.finish()),
                None => issues.push(ParseIssue {
                    line: line_no,
                    message: "@end without a matching @domain".to_string(),
                }),
            },
            Token::Css(_) | Token::Js(_) if open.is_none() => {
                issues.push(ParseIssue {
                    line: line_no,
                    message: "section header outside of a block".to_string(),
                });
            }
            Token::Css(rest) => {
                if let Some(block) = open.as_mut() {
                    block.section = Section::Css;
                    if !rest.is_empty() {
                        block.push(rest);
                    }
                }
            }
            Token::Js(rest) => {
                if let Some(block) = open.as_mut() {
                    block.section = Section::Js;
                    if !rest.is_empty() {
                        block.push(rest);
                    }
                }
            }
            Token::Text(content) => {
                if let Some(block) = open.as_mut() {
                    if !block.push(content) {
                        issues.push(ParseIssue {
                            line: line_no,
                            message: "text before CSS:/JS: ignored".to_string(),
                        });
                    }
                }
            }
        }
    }

    if let Some(block) = open {
        issues.push(ParseIssue {
            line: block.line,
            message: format!("block for '{}' is missing @end", block.domain),
        });
    }

    (rules, issues)
}

/// Parse rule text, logging any problems
pub fn parse(text: &str) -> Vec<SiteRule> {
    let (rules, issues) = parse_with_issues(text);
    for issue in &issues {
        warn!(line = issue.line, "site rules: {}", issue.message);
    }
    rules
}

/// All rules that apply to `host`, in declaration order
pub fn match_rules<'a>(rules: &'a [SiteRule], host: &str) -> Vec<&'a SiteRule> {
    rules.iter().filter(|rule| rule.matches(host)).collect()
}

/// Lower-cased host of a URL, without port
pub fn host_of(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_lowercase))
        .unwrap_or_default()
}
