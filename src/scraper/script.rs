//! JavaScript evaluated inside the page.
//!
//! Selectors are embedded as JSON string literals, never spliced in raw, so quotes and
//! backslashes inside a selector cannot break the script.

use crate::config::{PaginationConfig, SelectorChain, SelectorSet};

fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

fn js_list(chain: &SelectorChain) -> String {
    let items: Vec<String> = chain.selectors().into_iter().map(js_string).collect();
    format!("[{}]", items.join(", "))
}

/// Helpers shared by the extraction script. Invalid selectors are skipped, not fatal.
const EXTRACTION_HELPERS: &str = r#"
  const safeAll = (root, sel) => { try { return Array.from(root.querySelectorAll(sel)); } catch (e) { return []; } };
  const safeOne = (root, sel) => { try { return root.querySelector(sel); } catch (e) { return null; } };
  const firstMatchAll = (root, chain) => {
    for (const sel of chain) {
      const found = safeAll(root, sel);
      if (found.length > 0) return found;
    }
    return [];
  };
  const firstText = (root, chain) => {
    for (const sel of chain) {
      const el = safeOne(root, sel);
      const text = el ? (el.textContent || '').trim() : '';
      if (text) return text;
    }
    return '';
  };
  const firstElement = (root, chain) => {
    for (const sel of chain) {
      const el = safeOne(root, sel);
      if (el) return el;
    }
    return null;
  };
  const imageCandidates = (img) => {
    const out = [];
    if (!img) return out;
    const push = (source, value) => { if (value && String(value).trim()) out.push({ source, value: String(value).trim() }); };
    push('src', img.currentSrc);
    push('src', img.src);
    for (const attr of ['src', 'data-src', 'data-original']) push('src', img.getAttribute(attr));
    push('style', img.getAttribute('style'));
    for (const attr of ['data-bgset', 'srcset', 'data-srcset']) push('srcset', img.getAttribute(attr));
    return out;
  };
  const closestHref = (el) => {
    const anchor = el ? el.closest('a') : null;
    return anchor ? (anchor.getAttribute('href') || null) : null;
  };
"#;

/// Extraction of every product element into `RawProduct` objects
pub fn extraction_script(selectors: &SelectorSet) -> String {
    let link_chain = selectors
        .link
        .as_ref()
        .map(js_list)
        .unwrap_or_else(|| "[]".to_string());

    let mut script = String::new();
    script.push_str("(() => {\n");
    script.push_str(EXTRACTION_HELPERS);
    script.push_str(&format!("  const productChain = {};\n", js_list(&selectors.product)));
    script.push_str(&format!("  const nameChain = {};\n", js_list(&selectors.name)));
    script.push_str(&format!("  const priceChain = {};\n", js_list(&selectors.price)));
    script.push_str(&format!("  const imageChain = {};\n", js_list(&selectors.image)));
    script.push_str(&format!("  const linkChain = {};\n", link_chain));
    script.push_str(
        r#"
  return firstMatchAll(document, productChain).map((product, index) => {
    const img = firstElement(product, imageChain);
    const linkEl = firstElement(product, linkChain);
    return {
      index,
      name: firstText(product, nameChain),
      price: firstText(product, priceChain),
      imageCandidates: imageCandidates(img),
      link: linkEl ? (linkEl.getAttribute('href') || null) : null,
      fallbackLink: closestHref(img) || closestHref(product),
    };
  });
})()"#,
    );
    script
}

/// Every `<img>` with a non-empty source
pub fn images_script() -> &'static str {
    r#"(() => Array.from(document.querySelectorAll('img'))
  .map((img) => ({
    src: (img.currentSrc || img.src || img.getAttribute('src') || '').trim(),
    alt: (img.alt || '').trim(),
    width: img.naturalWidth || img.width || 0,
    height: img.naturalHeight || img.height || 0,
  }))
  .filter((img) => img.src.length > 0))()"#
}

/// Scroll by 100px every 200ms until the bottom is reached
pub fn auto_scroll_script() -> &'static str {
    r#"(async () => {
  await new Promise((resolve) => {
    let totalHeight = 0;
    const distance = 100;
    const timer = setInterval(() => {
      const scrollHeight = document.body.scrollHeight;
      window.scrollBy(0, distance);
      totalHeight += distance;
      if (totalHeight >= scrollHeight - window.innerHeight) {
        clearInterval(timer);
        resolve();
      }
    }, 200);
  });
  return true;
})()"#
}

/// Click the next-page control. Evaluates to `"next"`, `"page"` or `null`.
///
/// Disabled and backward-pointing matches of the next selector are skipped. A control marked
/// as forward (`rel=next`, a "next" label or a `--next` class) wins, else the last match.
pub fn click_next_script(pagination: &PaginationConfig, next_page: u32) -> String {
    let next = pagination
        .next_selector
        .as_deref()
        .map(js_string)
        .unwrap_or_else(|| "null".to_string());
    let numbered = pagination
        .page_selector
        .as_deref()
        .map(js_string)
        .unwrap_or_else(|| "null".to_string());

    format!(
        r#"(() => {{
  const usable = (el) => el && !el.disabled && !el.classList.contains('disabled') && el.getAttribute('aria-disabled') !== 'true';
  const nextSelector = {next};
  const pageSelector = {numbered};
  const wanted = {wanted};
  const label = (el) => (el.getAttribute('aria-label') || '').toLowerCase();
  const rel = (el) => (el.getAttribute('rel') || '').toLowerCase().split(/\s+/);
  const classes = (el) => el.getAttribute('class') || '';
  const backward = (el) => rel(el).includes('prev') || label(el).includes('prev') || /--prev\b/.test(classes(el));
  const forward = (el) => rel(el).includes('next') || label(el).includes('next') || /--next\b/.test(classes(el));
  if (nextSelector) {{
    let matches = [];
    try {{ matches = Array.from(document.querySelectorAll(nextSelector)); }} catch (e) {{}}
    const candidates = matches.filter((el) => usable(el) && !backward(el));
    const el = candidates.find(forward) || candidates[candidates.length - 1];
    if (el) {{ el.click(); return 'next'; }}
  }}
  if (pageSelector) {{
    let links = [];
    try {{ links = Array.from(document.querySelectorAll(pageSelector)); }} catch (e) {{}}
    const el = links.find((link) => (link.textContent || '').trim() === wanted);
    if (usable(el)) {{ el.click(); return 'page'; }}
  }}
  return null;
}})()"#,
        next = next,
        numbered = numbered,
        wanted = js_string(&next_page.to_string()),
    )
}

/// Navigation, paint and resource timings of the loaded document.
///
/// Resource entries are read from the performance timeline after load rather than from an
/// observer, so nothing registered before navigation is lost.
pub fn performance_script() -> &'static str {
    r#"(() => {
  const timing = performance.timing || {};
  const nav = performance.getEntriesByType('navigation')[0] || {};
  const resources = performance.getEntriesByType('resource');
  const since = (end) => Math.max(0, (end || 0) - (timing.navigationStart || 0));
  const span = (end, start) => Math.max(0, (end || 0) - (start || 0));
  const timings = {
    redirectTime: span(timing.redirectEnd, timing.redirectStart),
    dnsTime: span(timing.domainLookupEnd, timing.domainLookupStart),
    connectTime: span(timing.connectEnd, timing.connectStart),
    responseTime: span(timing.responseEnd, timing.requestStart),
    domInteractive: since(timing.domInteractive),
    domContentLoaded: since(timing.domContentLoadedEventEnd),
    domComplete: since(timing.domComplete),
    loadEvent: since(timing.loadEventEnd),
    firstPaint: 0,
    firstContentfulPaint: 0,
    resourceCount: resources.length,
    totalResourceSize: resources.reduce((total, r) => total + (r.transferSize || 0), 0),
    timeToFirstByte: span(timing.responseStart, timing.requestStart),
    navigationType: nav.type || 'navigate',
  };
  for (const entry of performance.getEntriesByType('paint')) {
    if (entry.name === 'first-paint') timings.firstPaint = entry.startTime;
    if (entry.name === 'first-contentful-paint') timings.firstContentfulPaint = entry.startTime;
  }
  return timings;
})()"#
}
