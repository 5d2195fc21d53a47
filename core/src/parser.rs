//! Partial Response Parser: the visible text of one model turn, possibly cut
//! at any byte, to a [`ResponseDelta`].
//!
//! Two wire shapes are accepted. The compact one is line-delimited: a header
//! object carrying the action, then one slide object per line. The legacy one
//! is a single `{action, slides, …}` object. Attempts run in order and the
//! first success wins:
//!
//! 1. strip code fences,
//! 2. line-delimited header plus slide lines,
//! 3. a complete legacy object,
//! 4. regex extraction from a truncated object with slide-array repair.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use slide_common::strip_code_fence;
use slide_protocol::{Action, ResponseDelta};

use crate::normalize::{delta_from_header, header_action, slide_from_value, slide_ref};
use crate::repair::parse_partial_slides;

#[allow(clippy::expect_used)]
static ACTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""(?:action|a)"\s*:\s*"([A-Za-z_]+)""#).expect("invalid action regex")
});

#[allow(clippy::expect_used)]
static QUESTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""(?:question|q)"\s*:\s*"((?:[^"\\]|\\.)*)""#).expect("invalid question regex")
});

#[allow(clippy::expect_used)]
static NUMBERS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""(?:slide_numbers|slide_ids|ids)"\s*:\s*\[([^\]]*)\]"#)
        .expect("invalid slide numbers regex")
});

#[allow(clippy::expect_used)]
static ORDER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""(?:new_order|ord)"\s*:\s*\[([^\]]*)\]"#).expect("invalid order regex")
});

#[allow(clippy::expect_used)]
static SLIDES_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""slides"\s*:\s*\["#).expect("invalid slides regex"));

/// Which attempt produced a delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    LineDelimited,
    Legacy,
    Partial,
}

pub fn parse_response(text: &str) -> ResponseDelta {
    parse_with_format(text).0
}

pub fn parse_with_format(text: &str) -> (ResponseDelta, WireFormat) {
    let body = strip_code_fence(text);

    if let Some(delta) = parse_line_delimited(body) {
        return (delta, WireFormat::LineDelimited);
    }
    if let Some(delta) = parse_legacy(body) {
        return (delta, WireFormat::Legacy);
    }
    (parse_fragments(body), WireFormat::Partial)
}

fn parse_line_delimited(body: &str) -> Option<ResponseDelta> {
    let mut lines = body.lines().map(str::trim).filter(|line| !line.is_empty());
    let header = serde_json::from_str::<Value>(lines.next()?).ok()?;
    let object = header.as_object()?;
    header_action(object)?;

    let mut delta = delta_from_header(object);
    for line in lines {
        let line = line.trim_end_matches(',');
        if line.starts_with('[') {
            // Some models put the slides on one line as an array.
            delta.slides.extend(parse_partial_slides(line));
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(value) => match slide_from_value(&value) {
                Some(slide) => delta.slides.push(slide),
                None => debug!("skipping non-slide line"),
            },
            // Usually the slide still streaming in.
            Err(_) => continue,
        }
    }
    Some(delta)
}

fn parse_legacy(body: &str) -> Option<ResponseDelta> {
    let (value, _) = first_json_value(body)?;
    let object = value.as_object()?;
    let has_slides = object.get("slides").is_some_and(Value::is_array);
    let conversational = matches!(
        header_action(object).and_then(Action::from_token),
        Some(Action::Ask | Action::Response | Action::Batch)
    );
    if has_slides || conversational {
        Some(delta_from_header(object))
    } else {
        None
    }
}

/// Regex extraction for a legacy object that has not finished arriving.
fn parse_fragments(body: &str) -> ResponseDelta {
    let mut delta = ResponseDelta {
        action: ACTION_RE
            .captures(body)
            .and_then(|caps| caps.get(1))
            .and_then(|m| Action::from_token(m.as_str())),
        ..ResponseDelta::default()
    };

    delta.question = QUESTION_RE
        .captures(body)
        .and_then(|caps| caps.get(1))
        .and_then(|m| serde_json::from_str::<String>(&format!("\"{}\"", m.as_str())).ok());

    if let Some(list) = NUMBERS_RE.captures(body).and_then(|caps| caps.get(1)) {
        delta.slide_numbers = number_list(list.as_str());
    }
    if let Some(list) = ORDER_RE.captures(body).and_then(|caps| caps.get(1)) {
        delta.new_order = Some(number_list(list.as_str()));
    }
    if let Some(opener) = SLIDES_RE.find(body) {
        delta.slides = parse_partial_slides(&body[opener.end() - 1..]);
    }
    delta
}

fn number_list(list: &str) -> Vec<u32> {
    list.split(',')
        .filter_map(|item| {
            let item = item.trim().trim_matches('"');
            slide_ref(&Value::String(item.to_string()))
        })
        .collect()
}

/// The first complete JSON value starting at the first `{`, and the byte
/// offset in `body` just past it. Trailing text is allowed.
pub(crate) fn first_json_value(body: &str) -> Option<(Value, usize)> {
    let start = body.find('{')?;
    let mut stream = serde_json::Deserializer::from_str(&body[start..]).into_iter::<Value>();
    match stream.next()? {
        Ok(value) => Some((value, start + stream.byte_offset())),
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slide_protocol::{BatchOpKind, Layout};

    #[test]
    fn line_delimited_header_and_slides() {
        let text = "{\"a\":\"create\"}\n{\"i\":1,\"t\":\"Intro\",\"l\":\"center\"}\n{\"i\":2,\"t\":\"Plan\",\"c\":\"- a\"}";
        let (delta, format) = parse_with_format(text);
        assert_eq!(format, WireFormat::LineDelimited);
        assert_eq!(delta.action, Some(Action::Create));
        assert_eq!(delta.slides.len(), 2);
        assert_eq!(delta.slides[0].layout_suggestion, Some(Layout::Centered));
    }

    #[test]
    fn line_delimited_drops_the_slide_still_streaming() {
        let text = "```json\n{\"a\":\"append\"}\n{\"i\":4,\"t\":\"Next\"}\n{\"i\":5,\"t\":\"Hal";
        let delta = parse_response(text);
        assert_eq!(delta.action, Some(Action::Append));
        assert_eq!(delta.slides.len(), 1);
    }

    #[test]
    fn line_delimited_accepts_a_slide_array_line() {
        let text = "{\"a\":\"append\"}\n[{\"i\":4,\"t\":\"Four\"},{\"i\":5,\"t\":\"Five\"}]";
        let (delta, format) = parse_with_format(text);
        assert_eq!(format, WireFormat::LineDelimited);
        assert_eq!(delta.action, Some(Action::Append));
        let titles: Vec<_> = delta.slides.iter().filter_map(|s| s.title.as_deref()).collect();
        assert_eq!(titles, vec!["Four", "Five"]);
    }

    #[test]
    fn line_delimited_keeps_complete_slides_of_a_streaming_array_line() {
        let delta = parse_response("{\"a\":\"create\"}\n[{\"i\":1,\"t\":\"One\"},{\"i\":2,\"t\":\"Tw");
        assert_eq!(delta.slides.len(), 1);
    }

    #[test]
    fn legacy_object_with_trailing_prose() {
        let text = "{\n  \"action\": \"response\",\n  \"content\": \"Sure thing\"\n}\nHope that helps!";
        let (delta, format) = parse_with_format(text);
        assert_eq!(format, WireFormat::Legacy);
        assert_eq!(delta.action, Some(Action::Response));
        assert_eq!(delta.content.as_deref(), Some("Sure thing"));
    }

    #[test]
    fn legacy_batch_is_accepted_without_slides() {
        let text = "{\n\"action\":\"batch\",\"operations\":[{\"type\":\"delete\",\"slide_number\":2},{\"type\":\"update\",\"slide_number\":3,\"title\":\"New\"}]}";
        let delta = parse_response(text);
        assert_eq!(delta.operations.len(), 2);
        assert_eq!(delta.operations[1].kind, BatchOpKind::Update);
    }

    #[test]
    fn truncated_legacy_object_uses_fragments() {
        let text = "{\n\"action\": \"create\",\n\"slides\": [\n{\"slide_number\":1,\"title\":\"A\",\"content\":\"x\"},\n{\"slide_number\":2,\"title\":\"B";
        let (delta, format) = parse_with_format(text);
        assert_eq!(format, WireFormat::Partial);
        assert_eq!(delta.action, Some(Action::Create));
        assert_eq!(delta.slides.len(), 1);
    }

    #[test]
    fn question_previews_while_streaming() {
        let text = "{\n\"action\":\"ask\",\"question\":\"Who is the \\\"audience\\\"?\",\"options\":[\"Ex";
        let delta = parse_response(text);
        assert_eq!(delta.action, Some(Action::Ask));
        assert_eq!(delta.question.as_deref(), Some("Who is the \"audience\"?"));
    }

    #[test]
    fn multiline_info_and_sort_fall_through_to_fragments() {
        let delta = parse_response("{\n\"action\":\"info\",\n\"slide_numbers\":[2, \"3\"]\n}");
        assert_eq!(delta.action, Some(Action::Info));
        assert_eq!(delta.slide_numbers, vec![2, 3]);

        let delta = parse_response("{\n\"action\":\"sort\",\n\"new_order\":[3,1,2]\n}");
        assert_eq!(delta.new_order, Some(vec![3, 1, 2]));
    }

    #[test]
    fn prose_only_is_empty() {
        let delta = parse_response("I'm not sure what you mean.");
        assert!(delta.is_empty());
    }

    #[test]
    fn first_value_reports_end_offset() {
        let (_, end) = first_json_value("x {\"a\":1} tail").unwrap();
        assert_eq!(&"x {\"a\":1} tail"[end..], " tail");
    }
}
