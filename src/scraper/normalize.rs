//! Turning raw attribute values into absolute http(s) URLs.

use regex::Regex;
use std::sync::OnceLock;
use url::Url;

use super::page::{ImageCandidate, ImageSource};

/// Width substituted into Shopify-style `{width}` image templates
pub const TEMPLATE_WIDTH: &str = "600";

fn css_url_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"url\(\s*['"]?([^'")]+?)['"]?\s*\)"#).ok())
        .as_ref()
}

/// Resolve a raw href/src against the page URL. Only http(s) results are kept.
pub fn resolve_url(raw: &str, base: &Url) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with('#') {
        return None;
    }

    let lowered = raw.to_ascii_lowercase();
    if lowered.starts_with("data:") || lowered.starts_with("javascript:") || lowered.starts_with("blob:") {
        return None;
    }

    let raw = raw.replace("{width}", TEMPLATE_WIDTH);
    let resolved = if raw.starts_with("//") {
        Url::parse(&format!("https:{}", raw)).ok()?
    } else {
        base.join(&raw).ok()?
    };

    match resolved.scheme() {
        "http" | "https" => Some(resolved.to_string()),
        _ => None,
    }
}

/// First `url(...)` inside an inline style
pub fn background_image_url(style: &str) -> Option<String> {
    css_url_regex()?
        .captures(style)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|url| !url.is_empty())
}

/// Split a srcset-like list into entries.
///
/// Commas inside a URL (no whitespace after them) stay with the URL.
fn srcset_entries(value: &str) -> Vec<String> {
    let mut entries: Vec<String> = Vec::new();
    for piece in value.split(',') {
        let glued = !piece.starts_with(char::is_whitespace) && !piece.is_empty();
        match entries.last_mut() {
            Some(last) if glued && !last.trim().contains(char::is_whitespace) => {
                last.push(',');
                last.push_str(piece);
            }
            _ => entries.push(piece.to_string()),
        }
    }
    entries
        .into_iter()
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
        .collect()
}

/// Pick the largest candidate of a `srcset`/`data-bgset` list
pub fn pick_from_srcset(value: &str) -> Option<String> {
    let mut best: Option<(f64, String)> = None;

    for entry in srcset_entries(value) {
        let mut parts = entry.split_whitespace();
        let url = match parts.next() {
            Some(url) => url.to_string(),
            None => continue,
        };
        let weight = parts
            .next()
            .and_then(|descriptor| {
                let number = descriptor.trim_end_matches(|c| c == 'w' || c == 'x');
                number.parse::<f64>().ok()
            })
            .unwrap_or(0.0);

        if best.as_ref().map_or(true, |(w, _)| weight > *w) {
            best = Some((weight, url));
        }
    }

    best.map(|(_, url)| url)
}

/// Candidate value as a plain URL string
fn candidate_url(candidate: &ImageCandidate) -> Option<String> {
    match candidate.source {
        ImageSource::Src => Some(candidate.value.clone()),
        ImageSource::Style => background_image_url(&candidate.value),
        ImageSource::Srcset => pick_from_srcset(&candidate.value),
    }
}

/// First candidate that resolves to an http(s) URL
pub fn normalize_image(candidates: &[ImageCandidate], base: &Url) -> Option<String> {
    candidates
        .iter()
        .filter_map(candidate_url)
        .find_map(|raw| resolve_url(&raw, base))
}

/// Product link, or the closest enclosing anchor when the link selector found nothing
pub fn normalize_link(link: Option<&str>, fallback: Option<&str>, base: &Url) -> Option<String> {
    link.and_then(|raw| resolve_url(raw, base))
        .or_else(|| fallback.and_then(|raw| resolve_url(raw, base)))
}
