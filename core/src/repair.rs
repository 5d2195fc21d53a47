//! Recovery of complete slide objects from a truncated `[ … ` array.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

use slide_protocol::SlideDraft;

use crate::normalize::{has_slide_identity, slide_from_value};

#[allow(clippy::expect_used)]
static TRAILING_COMMA_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",\s*\]\s*$").expect("invalid trailing comma regex"));

/// Best-effort parse of a slide array that may stop at any byte. `text` starts
/// at the `[`. Never fails; an unrecoverable prefix yields an empty list.
pub fn parse_partial_slides(text: &str) -> Vec<SlideDraft> {
    let Some(last) = text.rfind('}') else {
        return Vec::new();
    };

    let mut candidate = text[..=last].to_string();
    if !candidate.trim_end().ends_with(']') {
        candidate.push(']');
    }
    let candidate = TRAILING_COMMA_RE.replace(&candidate, "]");

    match serde_json::from_str::<Vec<Value>>(&candidate) {
        Ok(values) => values.iter().filter_map(slide_from_value).collect(),
        Err(err) => {
            debug!("slide array repair failed ({err}), scanning for objects");
            scan_objects(text)
                .iter()
                .filter(|object| has_slide_identity(object))
                .filter_map(|object| slide_from_value(&Value::Object(object.clone())))
                .collect()
        }
    }
}

/// Every complete top-level `{…}` object in `text` that parses as JSON.
/// Braces inside string literals are ignored.
pub fn scan_objects(text: &str) -> Vec<Map<String, Value>> {
    let mut objects = Vec::new();
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' if depth > 0 => in_string = true,
            '{' => {
                if depth == 0 {
                    start = Some(idx);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(begin) = start.take() {
                        if let Ok(Value::Object(object)) =
                            serde_json::from_str::<Value>(&text[begin..=idx])
                        {
                            objects.push(object);
                        }
                    }
                }
            }
            _ => {}
        }
    }
    objects
}
