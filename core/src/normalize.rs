//! One normalization pass from the model's mixed short/long key spellings to
//! the canonical records. Nothing past this module sees a short key.

use serde_json::{Map, Value};
use tracing::debug;

use slide_protocol::{Action, BatchOp, BatchOpKind, Layout, ResponseDelta, SlideDraft};

/// Slide record keys: (canonical, aliases).
const SLIDE_KEYS: &[(&str, &[&str])] = &[
    ("slide_number", &["i", "id", "number"]),
    ("title", &["t"]),
    ("content", &["c"]),
    ("visual_needs_image", &["v"]),
    ("visual_description", &["d"]),
    ("layout_suggestion", &["l", "layout"]),
    ("speaker_notes", &["n", "notes"]),
    ("estimated_duration", &["duration"]),
];

/// Header keys: (canonical, aliases).
const HEADER_KEYS: &[(&str, &[&str])] = &[
    ("action", &["a"]),
    ("question", &["q"]),
    ("options", &["o", "opts"]),
    ("allowCustom", &["cu", "allow_custom"]),
    ("content", &["m", "message"]),
    ("slide_numbers", &["ids", "slide_ids"]),
    ("operations", &["ops"]),
    ("new_order", &["ord", "order"]),
    ("slides", &[]),
];

const STRING_FIELDS: &[&str] = &[
    "title",
    "content",
    "visual_description",
    "speaker_notes",
    "estimated_duration",
];

/// Rewrites `object` into canonical keys. A canonical spelling wins over an
/// alias when both are present.
fn canonicalize(object: &Map<String, Value>, table: &[(&str, &[&str])]) -> Map<String, Value> {
    let mut out = Map::new();
    for (canonical, aliases) in table {
        let value = object
            .get(*canonical)
            .or_else(|| aliases.iter().find_map(|alias| object.get(*alias)));
        if let Some(value) = value {
            out.insert((*canonical).to_string(), value.clone());
        }
    }
    out
}

/// Maps one slide record to a draft. `None` when the value is not an object
/// or carries none of the identifying fields.
pub fn slide_from_value(value: &Value) -> Option<SlideDraft> {
    let object = value.as_object()?;
    let mut fields = canonicalize(object, SLIDE_KEYS);

    match fields.get("slide_number").and_then(slide_ref) {
        Some(number) => {
            fields.insert("slide_number".into(), Value::from(number));
        }
        None => {
            fields.remove("slide_number");
        }
    }

    match fields.get("layout_suggestion").and_then(Value::as_str).and_then(Layout::from_token) {
        Some(layout) => {
            fields.insert("layout_suggestion".into(), Value::from(layout.as_str()));
        }
        None => {
            fields.remove("layout_suggestion");
        }
    }

    match fields.get("visual_needs_image").and_then(loose_bool) {
        Some(flag) => {
            fields.insert("visual_needs_image".into(), Value::Bool(flag));
        }
        None => {
            fields.remove("visual_needs_image");
        }
    }

    for key in STRING_FIELDS {
        match fields.get(*key).and_then(loose_string) {
            Some(text) => {
                fields.insert((*key).to_string(), Value::String(text));
            }
            None => {
                fields.remove(*key);
            }
        }
    }

    if !(fields.contains_key("slide_number")
        || fields.contains_key("title")
        || fields.contains_key("content"))
    {
        return None;
    }

    match serde_json::from_value::<SlideDraft>(Value::Object(fields)) {
        Ok(draft) => Some(draft),
        Err(err) => {
            debug!("dropping slide record: {err}");
            None
        }
    }
}

/// Whether an object looks like a slide record by its keys alone.
pub fn has_slide_identity(object: &Map<String, Value>) -> bool {
    ["i", "slide_number", "t", "title"]
        .iter()
        .any(|key| object.contains_key(*key))
}

/// The action token in a header, if the header has one at all.
pub fn header_action(object: &Map<String, Value>) -> Option<&str> {
    object
        .get("action")
        .or_else(|| object.get("a"))
        .and_then(Value::as_str)
}

/// Builds a delta from a header object (line-delimited first line, or a
/// whole legacy object).
pub fn delta_from_header(object: &Map<String, Value>) -> ResponseDelta {
    let fields = canonicalize(object, HEADER_KEYS);
    let mut delta = ResponseDelta {
        action: fields
            .get("action")
            .and_then(Value::as_str)
            .and_then(Action::from_token),
        ..ResponseDelta::default()
    };

    delta.question = fields.get("question").and_then(loose_string);
    delta.content = fields.get("content").and_then(loose_string);
    delta.allow_custom = fields.get("allowCustom").and_then(loose_bool);
    if let Some(options) = fields.get("options").and_then(Value::as_array) {
        delta.options = options.iter().filter_map(loose_string).collect();
    }
    if let Some(numbers) = fields.get("slide_numbers").and_then(Value::as_array) {
        delta.slide_numbers = numbers.iter().filter_map(slide_ref).collect();
    }
    if let Some(order) = fields.get("new_order").and_then(Value::as_array) {
        delta.new_order = Some(order.iter().filter_map(slide_ref).collect());
    }
    if let Some(operations) = fields.get("operations").and_then(Value::as_array) {
        delta.operations = operations.iter().filter_map(batch_op_from_value).collect();
    }
    if let Some(slides) = fields.get("slides").and_then(Value::as_array) {
        delta.slides = slides.iter().filter_map(slide_from_value).collect();
    }
    delta
}

/// Maps one batch operation. Slide fields may sit beside `type`/`slide_number`
/// or be nested under `slide`, `fields` or `changes`.
pub fn batch_op_from_value(value: &Value) -> Option<BatchOp> {
    let object = value.as_object()?;
    let kind = match object
        .get("type")
        .or_else(|| object.get("op"))
        .and_then(Value::as_str)
        .and_then(Action::from_token)?
    {
        Action::Update => BatchOpKind::Update,
        Action::Delete => BatchOpKind::Delete,
        other => {
            debug!("ignoring batch op with action {other}");
            return None;
        }
    };

    let mut merged = object.clone();
    for nested in ["slide", "fields", "changes"] {
        if let Some(Value::Object(inner)) = object.get(nested) {
            for (key, value) in inner {
                merged.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }
    }

    let slide_number = canonicalize(&merged, SLIDE_KEYS)
        .get("slide_number")
        .and_then(slide_ref)?;
    let mut fields = slide_from_value(&Value::Object(merged)).unwrap_or_default();
    fields.slide_number = None;
    Some(BatchOp {
        kind,
        slide_number,
        fields,
    })
}

/// Slide references arrive as numbers, numeric strings, or legacy ids such as
/// `"slide-3"`.
pub fn slide_ref(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()).filter(|n| *n > 0),
        Value::String(s) => {
            let digits: String = s
                .trim()
                .chars()
                .rev()
                .take_while(char::is_ascii_digit)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            digits.parse::<u32>().ok().filter(|n| *n > 0)
        }
        _ => None,
    }
}

fn loose_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn loose_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
