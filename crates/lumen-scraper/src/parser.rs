//! Listing and detail page parsers.
//!
//! Converts fetched marketplace pages into normalized
//! [`lumen_core::Formation`] records:
//!
//! - [`parse_listing_page`] walks card elements with DOM extraction.
//! - [`parse_detail_page`] first tries the known embedded-JSON conventions
//!   (assignment blob, JSON script tag, data attribute) and normalizes
//!   whichever shape it finds; if none parses, it falls back to
//!   DOM-structure extraction with the same helpers.
//!
//! Selector and pattern lists are ordered most-trusted first; the first
//! non-empty match wins. A card that yields no usable name is a parse
//! failure for that card, never for the page.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use tracing::debug;

use lumen_core::formation::{DronePoint, Formation, FormationData, Frame};

use crate::extract;

/// Default used when a card has no extractable name; such cards are
/// discarded rather than emitted.
const PLACEHOLDER_NAME: &str = "Untitled Formation";

/// Card-level selectors tried in order on listing pages.
const CARD_SELECTORS: &[&str] = &[
    "div.formation-card",
    "article.formation",
    "li.formation-item",
    "div.card[data-formation-id]",
];

const NAME_SELECTORS: &[&str] = &[
    "h3.formation-name",
    ".formation-title",
    "h3.card-title",
    "h2",
    "h3",
];

const DESCRIPTION_SELECTORS: &[&str] = &[".formation-description", "p.description", ".card-text"];
const CATEGORY_SELECTORS: &[&str] = &[".formation-category", ".category", ".badge"];
const DRONE_COUNT_SELECTORS: &[&str] = &[".drone-count", ".drones", ".fleet-size"];
const DURATION_SELECTORS: &[&str] = &[".formation-duration", ".duration"];
const PRICE_SELECTORS: &[&str] = &[".formation-price", ".price"];
const TAG_SELECTORS: &[&str] = &[".formation-tags .tag", ".tag", ".chip"];
const CREATOR_SELECTORS: &[&str] = &[".formation-creator", ".creator", ".author"];
const RATING_SELECTORS: &[&str] = &[".formation-rating", ".rating", ".stars"];
const DOWNLOAD_SELECTORS: &[&str] = &[".download-count", ".downloads"];

const THUMBNAIL_PROBES: &[(&str, &str)] = &[
    ("img.formation-thumb", "src"),
    ("img", "data-src"),
    ("img", "src"),
];

/// Marker prefixes for embedded assignment blobs, tried in order.
static BLOB_MARKERS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"window\.__FORMATION_DATA__\s*=",
        r"window\.__INITIAL_STATE__\s*=",
        r"var\s+formationData\s*=",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static regex"))
    .collect()
});

/// JSON script-tag selectors, tried in order.
const JSON_SCRIPT_SELECTORS: &[&str] = &[
    r#"script#formation-data"#,
    r#"script[type="application/json"][data-formation]"#,
];

/// Parse a listing page into zero or more candidate formations.
///
/// Cards with no extractable name (or only the placeholder default) are
/// dropped; a bad card never fails the page.
#[must_use]
pub fn parse_listing_page(html: &str, source: &str) -> Vec<Formation> {
    let document = Html::parse_document(html);
    let mut out = Vec::new();

    for raw in CARD_SELECTORS {
        let Ok(sel) = Selector::parse(raw) else {
            continue;
        };
        let cards: Vec<ElementRef<'_>> = document.select(&sel).collect();
        if cards.is_empty() {
            continue;
        }
        for card in cards {
            if let Some(formation) = parse_card(card, source) {
                out.push(formation);
            }
        }
        // The first selector that matches any cards owns the page.
        break;
    }

    debug!(count = out.len(), "parsed listing page");
    out
}

fn parse_card(card: ElementRef<'_>, source: &str) -> Option<Formation> {
    let name = extract::text_or(card, NAME_SELECTORS, PLACEHOLDER_NAME);
    if name == PLACEHOLDER_NAME {
        return None;
    }

    let id = card_id(card)?;
    let mut formation = Formation::candidate(source, &id, &name);
    formation.description = extract::text_or(card, DESCRIPTION_SELECTORS, "");
    formation.category = extract::text_or(card, CATEGORY_SELECTORS, "");
    formation.thumbnail_url = extract::first_attr(card, THUMBNAIL_PROBES);
    formation.drone_count = extract::number(card, DRONE_COUNT_SELECTORS).unwrap_or(0) as u32;
    formation.duration_secs = extract::float(card, DURATION_SELECTORS).unwrap_or(0.0);
    formation.price = extract::price(card, PRICE_SELECTORS);
    formation.tags = extract::tags(card, TAG_SELECTORS);
    formation.creator = extract::first_text(card, CREATOR_SELECTORS);
    formation.rating = extract::float(card, RATING_SELECTORS)
        .unwrap_or(0.0)
        .clamp(0.0, 5.0);
    formation.download_count = extract::number(card, DOWNLOAD_SELECTORS).unwrap_or(0);
    Some(formation)
}

/// Card identity: data attributes first, then the detail link's last path
/// segment.
fn card_id(card: ElementRef<'_>) -> Option<String> {
    if let Some(id) = extract::first_attr(
        card,
        &[
            ("", "data-formation-id"),
            ("", "data-id"),
            ("a", "data-formation-id"),
        ],
    ) {
        return Some(id);
    }
    let href = extract::first_attr(card, &[(r#"a[href*="/formations/"]"#, "href"), ("a", "href")])?;
    href.trim_end_matches('/')
        .rsplit('/')
        .next()
        .map(|s| s.split('?').next().unwrap_or(s).to_string())
        .filter(|s| !s.is_empty())
}

/// Parse a detail page into a normalized formation.
///
/// Returns `None` when neither the embedded-JSON strategies nor the DOM
/// fallback yield a usable name and id.
#[must_use]
pub fn parse_detail_page(html: &str, source: &str) -> Option<Formation> {
    if let Some(blob) = find_embedded_blob(html) {
        if let Some(formation) = normalize_blob(&blob, source) {
            return Some(formation);
        }
        debug!("embedded blob found but not normalizable, trying DOM fallback");
    }
    parse_detail_dom(html, source)
}

/// Locate and JSON-parse an embedded data blob using the known embedding
/// conventions, in order of trust.
#[must_use]
pub fn find_embedded_blob(html: &str) -> Option<Value> {
    // 1. Script assignment markers: `window.__FORMATION_DATA__ = {…};`
    for marker in BLOB_MARKERS.iter() {
        if let Some(m) = marker.find(html) {
            if let Some(json) = balanced_json_object(&html[m.end()..]) {
                if let Ok(value) = serde_json::from_str::<Value>(json) {
                    return Some(value);
                }
            }
        }
    }

    let document = Html::parse_document(html);

    // 2. JSON script tags.
    for raw in JSON_SCRIPT_SELECTORS {
        let Ok(sel) = Selector::parse(raw) else {
            continue;
        };
        for script in document.select(&sel) {
            let text = script.text().collect::<String>();
            if let Ok(value) = serde_json::from_str::<Value>(text.trim()) {
                return Some(value);
            }
        }
    }

    // 3. A `data-formation` attribute carrying inline JSON.
    if let Ok(sel) = Selector::parse("[data-formation]") {
        for el in document.select(&sel) {
            if let Some(attr) = el.value().attr("data-formation") {
                if let Ok(value) = serde_json::from_str::<Value>(attr) {
                    return Some(value);
                }
            }
        }
    }

    None
}

/// Slice the first balanced `{…}` object from `text`.
fn balanced_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Normalize an embedded blob into the canonical formation shape.
///
/// Handles three nesting conventions for the same logical fields:
/// flat (`{id, name, …}`), wrapped (`{formation: {…}}`), and
/// JSON:API-style (`{data: {id, attributes: {…}}}`).
#[must_use]
pub fn normalize_blob(blob: &Value, source: &str) -> Option<Formation> {
    let (fields, outer_id) = unwrap_blob(blob)?;

    let id = str_field(fields, &["id", "formationId", "slug"])
        .or_else(|| fields.get("id").and_then(Value::as_u64).map(|n| n.to_string()))
        .or(outer_id)?;
    let name = str_field(fields, &["name", "title"])?;
    if name.is_empty() || id.is_empty() {
        return None;
    }

    let mut formation = Formation::candidate(source, &id, &name);
    formation.description = str_field(fields, &["description", "summary"]).unwrap_or_default();
    formation.category = str_field(fields, &["category", "categoryName"]).unwrap_or_default();
    formation.tags = match fields.get("tags") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(joined)) => joined
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    };
    formation.drone_count =
        u64_field(fields, &["droneCount", "drone_count", "drones"]).unwrap_or(0) as u32;
    formation.duration_secs = f64_field(
        fields,
        &["duration", "durationSecs", "duration_seconds"],
    )
    .unwrap_or(0.0);
    formation.thumbnail_url = str_field(fields, &["thumbnailUrl", "thumbnail", "image"]);
    formation.file_url = str_field(fields, &["fileUrl", "file_url", "downloadUrl"]);
    formation.price = f64_field(fields, &["price"]).filter(|p| *p >= 0.0);
    formation.creator = str_field(fields, &["creator", "author", "designer"]);
    formation.rating = f64_field(fields, &["rating"]).unwrap_or(0.0).clamp(0.0, 5.0);
    formation.download_count = u64_field(fields, &["downloadCount", "downloads"]).unwrap_or(0);
    formation.formation_data = parse_frames(fields);

    // A frames payload can fill in physical fields the metadata omitted.
    if let Some(data) = &formation.formation_data {
        if formation.drone_count == 0 {
            formation.drone_count = data.drone_count() as u32;
        }
        if formation.duration_secs.abs() < f64::EPSILON {
            formation.duration_secs = data.duration_secs();
        }
    }

    Some(formation)
}

/// Peel the nesting conventions down to the field object. Returns the
/// field map plus an id found on an outer wrapper (JSON:API keeps `id`
/// beside `attributes`).
fn unwrap_blob(blob: &Value) -> Option<(&serde_json::Map<String, Value>, Option<String>)> {
    let obj = blob.as_object()?;

    if let Some(inner) = obj.get("formation").and_then(Value::as_object) {
        return Some((inner, None));
    }
    if let Some(data) = obj.get("data").and_then(Value::as_object) {
        let outer_id = data
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| data.get("id").and_then(Value::as_u64).map(|n| n.to_string()));
        if let Some(attributes) = data.get("attributes").and_then(Value::as_object) {
            return Some((attributes, outer_id));
        }
        return Some((data, outer_id));
    }
    Some((obj, None))
}

fn str_field(obj: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn u64_field(obj: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<u64> {
    keys.iter().find_map(|k| {
        let v = obj.get(*k)?;
        v.as_u64()
            .or_else(|| v.as_str().and_then(crate::extract::parse_number))
    })
}

fn f64_field(obj: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| {
        let v = obj.get(*k)?;
        v.as_f64()
            .or_else(|| v.as_str().and_then(crate::extract::parse_float))
    })
}

/// Parse the choreography frames from whichever key/shape the producer
/// used: `frames` or `timeline`, positions as objects or `[x, y, z]`
/// triples.
fn parse_frames(obj: &serde_json::Map<String, Value>) -> Option<FormationData> {
    let frames_value = obj.get("frames").or_else(|| obj.get("timeline"))?;
    let items = frames_value.as_array()?;

    let mut frames = Vec::with_capacity(items.len());
    for item in items {
        let frame_obj = item.as_object()?;
        let t = frame_obj
            .get("t")
            .or_else(|| frame_obj.get("time"))
            .and_then(Value::as_f64)?;
        let positions_value = frame_obj
            .get("positions")
            .or_else(|| frame_obj.get("drones"))?;
        let mut positions = Vec::new();
        for (index, p) in positions_value.as_array()?.iter().enumerate() {
            positions.push(parse_position(p, index as u32)?);
        }
        frames.push(Frame { t, positions });
    }

    if frames.is_empty() {
        return None;
    }
    Some(FormationData { frames })
}

fn parse_position(value: &Value, index: u32) -> Option<DronePoint> {
    match value {
        // Bare [x, y, z] triple; drone id is the array index.
        Value::Array(coords) if coords.len() >= 3 => Some(DronePoint {
            drone_id: index,
            x: coords[0].as_f64()?,
            y: coords[1].as_f64()?,
            z: coords[2].as_f64()?,
            color: None,
            brightness: None,
        }),
        Value::Object(obj) => Some(DronePoint {
            drone_id: obj
                .get("droneId")
                .or_else(|| obj.get("drone_id"))
                .or_else(|| obj.get("id"))
                .and_then(Value::as_u64)
                .map_or(index, |id| id as u32),
            x: obj.get("x")?.as_f64()?,
            y: obj.get("y")?.as_f64()?,
            z: obj.get("z")?.as_f64()?,
            color: obj.get("color").and_then(Value::as_str).map(str::to_string),
            brightness: obj.get("brightness").and_then(Value::as_f64),
        }),
        _ => None,
    }
}

/// DOM-structure fallback for detail pages without a parseable blob.
fn parse_detail_dom(html: &str, source: &str) -> Option<Formation> {
    let document = Html::parse_document(html);
    let root = document.root_element();

    let name = extract::first_text(root, &["h1.formation-title", ".formation-detail h1", "h1"])?;
    let id = extract::first_attr(
        root,
        &[
            ("[data-formation-id]", "data-formation-id"),
            (r#"meta[property="og:url"]"#, "content"),
        ],
    )
    .and_then(|raw| {
        raw.trim_end_matches('/')
            .rsplit('/')
            .next()
            .map(str::to_string)
    })
    .filter(|s| !s.is_empty())?;

    let mut formation = Formation::candidate(source, &id, &name);
    formation.description = extract::text_or(root, DESCRIPTION_SELECTORS, "");
    formation.category = extract::text_or(root, CATEGORY_SELECTORS, "");
    formation.thumbnail_url = extract::first_attr(root, THUMBNAIL_PROBES);
    formation.drone_count = extract::number(root, DRONE_COUNT_SELECTORS).unwrap_or(0) as u32;
    formation.duration_secs = extract::float(root, DURATION_SELECTORS).unwrap_or(0.0);
    formation.price = extract::price(root, PRICE_SELECTORS);
    formation.tags = extract::tags(root, TAG_SELECTORS);
    formation.creator = extract::first_text(root, CREATOR_SELECTORS);
    formation.rating = extract::float(root, RATING_SELECTORS)
        .unwrap_or(0.0)
        .clamp(0.0, 5.0);
    formation.download_count = extract::number(root, DOWNLOAD_SELECTORS).unwrap_or(0);
    Some(formation)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"
      <html><body>
        <div class="formation-card" data-formation-id="heart-128">
          <img class="formation-thumb" src="https://cdn.example.com/heart.jpg">
          <h3 class="formation-name">Beating Heart</h3>
          <p class="formation-description">A pulsing heart outline.</p>
          <span class="formation-category">Romance</span>
          <span class="drone-count">128 drones</span>
          <span class="duration">45.5s</span>
          <span class="price">$299.00</span>
          <span class="tag">wedding</span>
          <span class="tag">romance</span>
          <span class="creator">SkyArts</span>
          <span class="rating">4.5</span>
          <span class="download-count">1024 downloads</span>
        </div>
        <div class="formation-card" data-formation-id="spiral-64">
          <h3 class="formation-name">Spiral</h3>
        </div>
        <div class="formation-card" data-formation-id="broken-1">
          <p class="formation-description">No name on this card.</p>
        </div>
      </body></html>
    "#;

    #[test]
    fn listing_extracts_all_card_fields() {
        let out = parse_listing_page(LISTING, "skybrush-market");
        assert_eq!(out.len(), 2);

        let heart = &out[0];
        assert_eq!(heart.source_id.as_deref(), Some("heart-128"));
        assert_eq!(heart.name, "Beating Heart");
        assert_eq!(heart.description, "A pulsing heart outline.");
        assert_eq!(heart.category, "Romance");
        assert_eq!(
            heart.thumbnail_url.as_deref(),
            Some("https://cdn.example.com/heart.jpg")
        );
        assert_eq!(heart.drone_count, 128);
        assert!((heart.duration_secs - 45.5).abs() < 1e-9);
        assert_eq!(heart.price, Some(299.0));
        assert_eq!(heart.tags, vec!["wedding", "romance"]);
        assert_eq!(heart.creator.as_deref(), Some("SkyArts"));
        assert!((heart.rating - 4.5).abs() < 1e-9);
        assert_eq!(heart.download_count, 1024);
    }

    #[test]
    fn listing_excludes_cards_without_name() {
        let out = parse_listing_page(LISTING, "skybrush-market");
        assert!(out.iter().all(|f| f.source_id.as_deref() != Some("broken-1")));
    }

    #[test]
    fn listing_sparse_card_gets_defaults() {
        let out = parse_listing_page(LISTING, "skybrush-market");
        let spiral = &out[1];
        assert_eq!(spiral.name, "Spiral");
        assert_eq!(spiral.drone_count, 0);
        assert!(spiral.price.is_none());
        assert!(spiral.tags.is_empty());
    }

    #[test]
    fn listing_id_falls_back_to_link_segment() {
        let html = r#"
          <article class="formation">
            <a href="/formations/wave-32?ref=home"><h3>Wave</h3></a>
          </article>
        "#;
        let out = parse_listing_page(html, "skybrush-market");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].source_id.as_deref(), Some("wave-32"));
    }

    #[test]
    fn listing_empty_page_yields_nothing() {
        assert!(parse_listing_page("<html><body></body></html>", "s").is_empty());
    }

    #[test]
    fn detail_parses_assignment_blob() {
        let html = r#"
          <html><head><script>
            window.__FORMATION_DATA__ = {"id": "heart-128", "name": "Beating Heart",
              "droneCount": 128, "duration": 45.5, "price": 299.0,
              "tags": ["wedding", "romance"],
              "frames": [{"t": 0.0, "positions": [{"droneId": 0, "x": 1.0, "y": 2.0, "z": 3.0}]}]};
          </script></head><body></body></html>
        "#;
        let f = parse_detail_page(html, "skybrush-market").unwrap();
        assert_eq!(f.source_id.as_deref(), Some("heart-128"));
        assert_eq!(f.drone_count, 128);
        assert_eq!(f.tags, vec!["wedding", "romance"]);
        let data = f.formation_data.unwrap();
        assert_eq!(data.frames.len(), 1);
        assert!((data.frames[0].positions[0].z - 3.0).abs() < 1e-9);
    }

    #[test]
    fn detail_blob_handles_nested_braces_and_strings() {
        let html = r#"
          <script>window.__FORMATION_DATA__ = {"id": "x1", "name": "Brace {test}",
            "description": "contains \" and } inside"};</script>
        "#;
        let f = parse_detail_page(html, "s").unwrap();
        assert_eq!(f.name, "Brace {test}");
        assert!(f.description.contains('}'));
    }

    #[test]
    fn detail_parses_json_script_tag() {
        let html = r#"
          <html><body>
            <script id="formation-data" type="application/json">
              {"formation": {"id": "spiral-64", "name": "Spiral", "drone_count": 64}}
            </script>
          </body></html>
        "#;
        let f = parse_detail_page(html, "s").unwrap();
        assert_eq!(f.source_id.as_deref(), Some("spiral-64"));
        assert_eq!(f.drone_count, 64);
    }

    #[test]
    fn detail_parses_data_attribute_blob() {
        let html = r#"
          <div data-formation='{"id": "wave-32", "name": "Wave", "drones": 32}'></div>
        "#;
        let f = parse_detail_page(html, "s").unwrap();
        assert_eq!(f.source_id.as_deref(), Some("wave-32"));
        assert_eq!(f.drone_count, 32);
    }

    #[test]
    fn detail_normalizes_json_api_shape() {
        let blob: Value = serde_json::from_str(
            r#"{"data": {"id": "ring-96", "attributes": {"name": "Ring",
                "durationSecs": 30.0, "downloads": 55}}}"#,
        )
        .unwrap();
        let f = normalize_blob(&blob, "s").unwrap();
        assert_eq!(f.source_id.as_deref(), Some("ring-96"));
        assert_eq!(f.name, "Ring");
        assert!((f.duration_secs - 30.0).abs() < 1e-9);
        assert_eq!(f.download_count, 55);
    }

    #[test]
    fn detail_frames_as_triples_and_timeline_key() {
        let blob: Value = serde_json::from_str(
            r#"{"id": "tri", "name": "Triangle",
                "timeline": [{"time": 0.0, "positions": [[0.0, 1.0, 2.0], [3.0, 4.0, 5.0]]},
                             {"time": 1.0, "positions": [[0.5, 1.5, 2.5], [3.5, 4.5, 5.5]]}]}"#,
        )
        .unwrap();
        let f = normalize_blob(&blob, "s").unwrap();
        let data = f.formation_data.unwrap();
        assert_eq!(data.frames.len(), 2);
        assert_eq!(data.frames[0].positions[1].drone_id, 1);
        assert!((data.frames[1].positions[0].x - 0.5).abs() < 1e-9);
        // Physical fields inferred from frames
        assert_eq!(f.drone_count, 2);
        assert!((f.duration_secs - 1.0).abs() < 1e-9);
    }

    #[test]
    fn detail_falls_back_to_dom_extraction() {
        let html = r#"
          <html><head>
            <meta property="og:url" content="https://market.example.com/formations/dove-80">
          </head><body>
            <div class="formation-detail">
              <h1 class="formation-title">Dove</h1>
              <span class="drone-count">80</span>
              <span class="price">$150</span>
            </div>
          </body></html>
        "#;
        let f = parse_detail_page(html, "s").unwrap();
        assert_eq!(f.source_id.as_deref(), Some("dove-80"));
        assert_eq!(f.name, "Dove");
        assert_eq!(f.drone_count, 80);
        assert_eq!(f.price, Some(150.0));
    }

    #[test]
    fn detail_unusable_page_returns_none() {
        assert!(parse_detail_page("<html><body><p>nothing here</p></body></html>", "s").is_none());
    }

    #[test]
    fn detail_blob_without_name_falls_through_to_dom() {
        // Blob parses but is missing a name; DOM has one.
        let html = r#"
          <html><head><script>
            window.__FORMATION_DATA__ = {"id": "x9"};
          </script></head>
          <body data-formation-id="x9"><h1>Recovered</h1></body></html>
        "#;
        let f = parse_detail_page(html, "s").unwrap();
        assert_eq!(f.name, "Recovered");
    }

    #[test]
    fn balanced_json_object_slices_exactly() {
        let text = r#" = {"a": {"b": 1}, "c": "}"} ; trailing"#;
        let json = balanced_json_object(text).unwrap();
        assert_eq!(json, r#"{"a": {"b": 1}, "c": "}"}"#);
    }
}
