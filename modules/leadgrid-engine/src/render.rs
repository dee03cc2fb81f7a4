//! Rendered-page facts: everything the verifier needs to know about a page,
//! extracted once from the browser-rendered HTML.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::LazyLock;
use thiserror::Error;

const CONTENT_PREVIEW_CHARS: usize = 2000;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("render timed out")]
    Timeout,

    #[error("navigation failed: {0}")]
    NavigationFailed(String),

    #[error("blocked by bot wall")]
    BotWall,
}

impl RenderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, RenderError::Timeout)
    }
}

/// Extracted facts from a fully rendered page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderedPage {
    pub final_url: String,
    pub title: String,
    pub meta_description: String,
    pub phones: Vec<String>,
    pub emails: Vec<String>,
    pub has_address: bool,
    pub has_hours: bool,
    pub content_preview: String,
    pub word_count: usize,
    pub image_count: usize,
    pub form_count: usize,
    /// Content-hash reference to the stored screenshot artifact, when taken.
    pub screenshot_ref: Option<String>,
}

static SCRIPT_STYLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style|noscript)\b.*?</(script|style|noscript)>").unwrap()
});
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]+>").unwrap());
static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap());
static META_DESC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<meta\s+[^>]*name=["']description["'][^>]*content=["']([^"']*)["']"#)
        .unwrap()
});
static IMG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<img\b").unwrap());
static FORM_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<form\b").unwrap());

// US/Canada NANP, with or without +1; UK and generic international with +cc.
static PHONE_US_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\+?1[\s.\-]?)?\(?\d{3}\)?[\s.\-]\d{3}[\s.\-]\d{4}").unwrap()
});
static PHONE_INTL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\+\d{1,3}[\s.\-]?\(?\d{1,4}\)?(?:[\s.\-]?\d{2,4}){2,4}").unwrap()
});
static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}").unwrap()
});

// Street-address heuristic: house number plus a street-suffix word, or a
// US ZIP following a state code.
static ADDRESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\d{1,5}\s+\w[\w\s.]{0,40}\b(st|street|ave|avenue|blvd|boulevard|rd|road|dr|drive|ln|lane|way|suite|ste|ct|court|pkwy|parkway)\b|\b[A-Z]{2}\s+\d{5}(-\d{4})?\b",
    )
    .unwrap()
});
static HOURS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(hours|open)\b.{0,80}?\d{1,2}(:\d{2})?\s*(am|pm)|\b(mon|tue|wed|thu|fri|sat|sun)[a-z]*\s*[-–]\s*(mon|tue|wed|thu|fri|sat|sun)[a-z]*",
    )
    .unwrap()
});

/// Markers of anti-bot interstitials. Checked against the lowercased page.
const BOT_WALL_MARKERS: &[&str] = &[
    "cf-challenge",
    "just a moment...",
    "attention required! | cloudflare",
    "verify you are human",
    "are you a robot",
    "enable javascript and cookies to continue",
    "access denied | ",
    "captcha",
];

/// Whether the rendered response is an anti-bot challenge rather than the
/// actual site.
pub fn is_bot_wall(status: u16, html: &str) -> bool {
    if status == 403 || status == 429 {
        return true;
    }
    let lowered = html.to_lowercase();
    BOT_WALL_MARKERS.iter().any(|m| lowered.contains(m))
}

/// Visible text of the page: scripts/styles removed, tags stripped,
/// whitespace collapsed.
pub fn visible_text(html: &str) -> String {
    let no_scripts = SCRIPT_STYLE_RE.replace_all(html, " ");
    let no_tags = TAG_RE.replace_all(&no_scripts, " ");
    WHITESPACE_RE.replace_all(no_tags.trim(), " ").to_string()
}

/// Extract page facts from rendered HTML.
pub fn extract_page_facts(final_url: &str, html: &str) -> RenderedPage {
    let text = visible_text(html);

    let title = TITLE_RE
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| WHITESPACE_RE.replace_all(m.as_str().trim(), " ").to_string())
        .unwrap_or_default();

    let meta_description = META_DESC_RE
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();

    let mut phones: Vec<String> = Vec::new();
    let mut seen_digits: HashSet<String> = HashSet::new();
    for m in PHONE_US_RE.find_iter(&text).chain(PHONE_INTL_RE.find_iter(&text)) {
        let raw = m.as_str().trim().to_string();
        let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.len() >= 10 && seen_digits.insert(digits) {
            phones.push(raw);
        }
    }

    let mut emails: Vec<String> = Vec::new();
    let mut seen_emails: HashSet<String> = HashSet::new();
    for m in EMAIL_RE.find_iter(&text) {
        let email = m.as_str().to_lowercase();
        // Inline images and asset names match the pattern but aren't emails
        if email.ends_with(".png") || email.ends_with(".jpg") || email.ends_with(".svg") {
            continue;
        }
        if seen_emails.insert(email.clone()) {
            emails.push(email);
        }
    }

    let word_count = text.split_whitespace().count();

    let mut end = CONTENT_PREVIEW_CHARS.min(text.len());
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    let content_preview = text[..end].to_string();

    RenderedPage {
        final_url: final_url.to_string(),
        title,
        meta_description,
        phones,
        emails,
        has_address: ADDRESS_RE.is_match(&text),
        has_hours: HOURS_RE.is_match(&text),
        content_preview,
        word_count,
        image_count: IMG_RE.find_iter(html).count(),
        form_count: FORM_RE.find_iter(html).count(),
        screenshot_ref: None,
    }
}

const PLACEHOLDER_MARKERS: &[&str] = &[
    "coming soon",
    "under construction",
    "lorem ipsum",
    "this domain is parked",
    "website is for sale",
    "default web page",
];

fn is_placeholder(page: &RenderedPage) -> bool {
    if page.word_count < 30 {
        return true;
    }
    let lowered = page.content_preview.to_lowercase();
    PLACEHOLDER_MARKERS.iter().any(|m| lowered.contains(m))
}

/// Quality score 0-100. A prioritization signal only; never a disposition.
pub fn quality_score(page: &RenderedPage) -> i32 {
    let mut score = 0;
    if !page.phones.is_empty() {
        score += 20;
    }
    if !page.emails.is_empty() {
        score += 15;
    }
    if page.has_address {
        score += 15;
    }
    if page.has_hours {
        score += 10;
    }
    if page.word_count > 200 {
        score += 15;
    }
    if page.image_count > 0 {
        score += 10;
    }
    if page.form_count > 0 {
        score += 10;
    }
    if !is_placeholder(page) {
        score += 5;
    }
    score
}
