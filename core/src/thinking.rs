//! Separates `<think>…</think>` reasoning from user-visible text.
//!
//! Always call with the full accumulated text. The split is a pure function of
//! its input, so re-running it on a longer buffer never duplicates reasoning
//! extracted earlier.

const OPEN_TAG: &str = "<think>";
const CLOSE_TAG: &str = "</think>";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThinkingSplit {
    pub thinking: String,
    pub content: String,
}

pub fn split_thinking(text: &str) -> ThinkingSplit {
    let mut spans: Vec<&str> = Vec::new();
    let mut content = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find(OPEN_TAG) {
        content.push_str(&rest[..start]);
        let inner = &rest[start + OPEN_TAG.len()..];
        match inner.find(CLOSE_TAG) {
            Some(end) => {
                spans.push(inner[..end].trim());
                rest = &inner[end + CLOSE_TAG.len()..];
            }
            None => {
                // Still reasoning: everything after the open tag is thinking.
                let cut = partial_suffix(inner, CLOSE_TAG, 1).unwrap_or(inner.len());
                spans.push(inner[..cut].trim());
                rest = "";
            }
        }
    }
    content.push_str(rest);

    if let Some(cut) = partial_suffix(&content, OPEN_TAG, 2) {
        content.truncate(cut);
    }

    ThinkingSplit {
        thinking: spans
            .into_iter()
            .filter(|span| !span.is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
        content: content.trim().to_string(),
    }
}

/// Concatenates decoder reasoning and tag reasoning for display.
pub fn combine_thinking(reasoning: &str, tagged: &str) -> String {
    match (reasoning.trim().is_empty(), tagged.is_empty()) {
        (true, _) => tagged.to_string(),
        (false, true) => reasoning.trim().to_string(),
        (false, false) => format!("{}\n\n{tagged}", reasoning.trim()),
    }
}

/// Start of a trailing proper prefix of `tag` at least `min_len` long.
fn partial_suffix(text: &str, tag: &str, min_len: usize) -> Option<usize> {
    (min_len..tag.len())
        .rev()
        .find(|len| text.ends_with(&tag[..*len]))
        .map(|len| text.len() - len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_closed_spans_in_order() {
        let split = split_thinking("<think>first</think>{\"a\":\"create\"}<think>second</think>\n{\"i\":1}");
        assert_eq!(split.thinking, "first\nsecond");
        assert_eq!(split.content, "{\"a\":\"create\"}\n{\"i\":1}");
    }

    #[test]
    fn unclosed_span_is_all_thinking() {
        let split = split_thinking("{\"a\":\"ask\"}\n<think>still going");
        assert_eq!(split.thinking, "still going");
        assert_eq!(split.content, "{\"a\":\"ask\"}");
    }

    #[test]
    fn holds_back_partial_open_tag() {
        let split = split_thinking("hello <thi");
        assert_eq!(split.content, "hello");
        assert!(split.thinking.is_empty());
    }

    #[test]
    fn growing_buffer_never_duplicates_thinking() {
        let full = "<think>plan the deck</think>{\"a\":\"create\"}\n{\"i\":1,\"t\":\"Intro\"}";
        let mut previous = ThinkingSplit::default();
        for end in (1..=full.len()).filter(|i| full.is_char_boundary(*i)) {
            let split = split_thinking(&full[..end]);
            assert!(
                split.thinking.starts_with(&previous.thinking) || previous.thinking.is_empty(),
                "thinking regressed at {end}: {:?} -> {:?}",
                previous.thinking,
                split.thinking
            );
            assert!(split.thinking.len() <= "plan the deck".len());
            previous = split;
        }
        assert_eq!(previous.thinking, "plan the deck");
        assert_eq!(split_thinking(full), split_thinking(full));
    }

    #[test]
    fn combines_both_reasoning_sources() {
        assert_eq!(combine_thinking("r", "t"), "r\n\nt");
        assert_eq!(combine_thinking("", "t"), "t");
        assert_eq!(combine_thinking("r", ""), "r");
    }
}
