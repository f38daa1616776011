//! Tolerant HTML field extractors.
//!
//! Each helper probes an ordered list of candidate selectors against a DOM
//! subtree and returns the first non-empty match, coerced to the target
//! type, or a caller-supplied default. Selector lists are ordered from
//! most-specific/most-trusted to most-generic. No helper errors on missing
//! data — absence is expected when scraping a page without a contract.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Selector};

static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("static regex"));
static FLOAT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("static regex"));

/// First non-empty text content among the candidate selectors.
#[must_use]
pub fn first_text(el: ElementRef<'_>, selectors: &[&str]) -> Option<String> {
    for raw in selectors {
        let Ok(sel) = Selector::parse(raw) else {
            continue;
        };
        for matched in el.select(&sel) {
            let text = matched.text().collect::<String>().trim().to_string();
            if !text.is_empty() {
                return Some(text);
            }
        }
    }
    None
}

/// Like [`first_text`] but with a default value.
#[must_use]
pub fn text_or(el: ElementRef<'_>, selectors: &[&str], default: &str) -> String {
    first_text(el, selectors).unwrap_or_else(|| default.to_string())
}

/// First non-empty attribute among `(selector, attribute)` probes.
///
/// An empty selector probes the element itself.
#[must_use]
pub fn first_attr(el: ElementRef<'_>, probes: &[(&str, &str)]) -> Option<String> {
    for (raw, attr) in probes {
        if raw.is_empty() {
            if let Some(value) = el.value().attr(attr) {
                let value = value.trim();
                if !value.is_empty() {
                    return Some(value.to_string());
                }
            }
            continue;
        }
        let Ok(sel) = Selector::parse(raw) else {
            continue;
        };
        for matched in el.select(&sel) {
            if let Some(value) = matched.value().attr(attr) {
                let value = value.trim();
                if !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }
    None
}

/// First run of digits in the first matching text, as an integer.
#[must_use]
pub fn number(el: ElementRef<'_>, selectors: &[&str]) -> Option<u64> {
    first_text(el, selectors).as_deref().and_then(parse_number)
}

/// First run of digits (with optional decimal point) as a float.
#[must_use]
pub fn float(el: ElementRef<'_>, selectors: &[&str]) -> Option<f64> {
    first_text(el, selectors).as_deref().and_then(parse_float)
}

/// Currency amount: strips everything except digits and dots before
/// parsing, so `"$1,299.50"` and `"€ 12"` both work.
#[must_use]
pub fn price(el: ElementRef<'_>, selectors: &[&str]) -> Option<f64> {
    first_text(el, selectors).as_deref().and_then(parse_price)
}

/// All matching texts across the candidate selectors, trimmed and deduped,
/// original order preserved.
#[must_use]
pub fn tags(el: ElementRef<'_>, selectors: &[&str]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for raw in selectors {
        let Ok(sel) = Selector::parse(raw) else {
            continue;
        };
        for matched in el.select(&sel) {
            let text = matched.text().collect::<String>().trim().to_string();
            if !text.is_empty() && !out.contains(&text) {
                out.push(text);
            }
        }
        if !out.is_empty() {
            // First selector that yields anything wins the whole list.
            break;
        }
    }
    out
}

/// Extract the first run of digits from free text.
#[must_use]
pub fn parse_number(text: &str) -> Option<u64> {
    NUMBER_RE.find(text)?.as_str().parse().ok()
}

/// Extract the first decimal number from free text.
#[must_use]
pub fn parse_float(text: &str) -> Option<f64> {
    FLOAT_RE.find(text)?.as_str().parse().ok()
}

/// Parse a currency string, tolerating symbols and thousands separators.
#[must_use]
pub fn parse_price(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse().ok().filter(|p: &f64| *p >= 0.0)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    fn doc(html: &str) -> Html {
        Html::parse_fragment(html)
    }

    #[test]
    fn first_text_respects_selector_order() {
        let html = doc(r#"<div><span class="generic">fallback</span><h3 class="name">Heart</h3></div>"#);
        let got = first_text(html.root_element(), &["h3.name", ".generic"]);
        assert_eq!(got.as_deref(), Some("Heart"));
    }

    #[test]
    fn first_text_skips_empty_matches() {
        let html = doc(r#"<div><h3 class="name">  </h3><span class="alt">Spiral</span></div>"#);
        let got = first_text(html.root_element(), &["h3.name", ".alt"]);
        assert_eq!(got.as_deref(), Some("Spiral"));
    }

    #[test]
    fn text_or_falls_back_to_default() {
        let html = doc("<div></div>");
        assert_eq!(
            text_or(html.root_element(), &[".missing"], "Untitled Formation"),
            "Untitled Formation"
        );
    }

    #[test]
    fn invalid_selector_is_skipped_not_fatal() {
        let html = doc(r#"<div><p class="ok">yes</p></div>"#);
        let got = first_text(html.root_element(), &["p..[broken", "p.ok"]);
        assert_eq!(got.as_deref(), Some("yes"));
    }

    #[test]
    fn first_attr_probes_in_order() {
        let html = doc(r#"<div><img data-src="lazy.jpg" src="eager.jpg"></div>"#);
        let got = first_attr(html.root_element(), &[("img", "data-src"), ("img", "src")]);
        assert_eq!(got.as_deref(), Some("lazy.jpg"));
    }

    #[test]
    fn first_attr_empty_selector_probes_self() {
        let html = Html::parse_fragment(r#"<div data-formation-id="f-42"></div>"#);
        let el = html
            .select(&Selector::parse("div").unwrap())
            .next()
            .unwrap();
        let got = first_attr(el, &[("", "data-formation-id")]);
        assert_eq!(got.as_deref(), Some("f-42"));
    }

    #[test]
    fn number_extracts_first_digit_run() {
        let html = doc(r#"<div><span class="drones">Requires 150 drones</span></div>"#);
        assert_eq!(number(html.root_element(), &[".drones"]), Some(150));
    }

    #[test]
    fn float_handles_decimals() {
        let html = doc(r#"<div><span class="duration">3.5 min</span></div>"#);
        assert_eq!(float(html.root_element(), &[".duration"]), Some(3.5));
    }

    #[test]
    fn price_strips_currency_noise() {
        assert_eq!(parse_price("$1,299.50"), Some(1299.50));
        assert_eq!(parse_price("€ 12"), Some(12.0));
        assert_eq!(parse_price("free"), None);
    }

    #[test]
    fn tags_first_matching_selector_wins() {
        let html = doc(
            r#"<div>
                 <span class="tag">wedding</span>
                 <span class="tag">romance</span>
                 <span class="tag">wedding</span>
                 <span class="chip">unused</span>
               </div>"#,
        );
        let got = tags(html.root_element(), &[".tag", ".chip"]);
        assert_eq!(got, vec!["wedding", "romance"]);
    }

    #[test]
    fn tags_empty_when_nothing_matches() {
        let html = doc("<div></div>");
        assert!(tags(html.root_element(), &[".tag"]).is_empty());
    }

    #[test]
    fn missing_fields_default_silently() {
        let html = doc("<div></div>");
        let root = html.root_element();
        assert!(first_text(root, &[".name"]).is_none());
        assert!(number(root, &[".drones"]).is_none());
        assert!(price(root, &[".price"]).is_none());
        assert!(first_attr(root, &[("img", "src")]).is_none());
    }
}
