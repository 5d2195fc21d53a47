/// Removes a leading ```` ```lang ```` line and a trailing ```` ``` ```` marker.
/// Text without fences is returned trimmed.
pub fn strip_code_fence(text: &str) -> &str {
    let mut body = text.trim();
    if let Some(rest) = body.strip_prefix("```") {
        body = match rest.find('\n') {
            Some(newline) => &rest[newline + 1..],
            // Only the opening marker (and maybe a language tag) has arrived.
            None => "",
        };
    }
    let trimmed = body.trim_end();
    if let Some(rest) = trimmed.strip_suffix("```") {
        body = rest;
    }
    body.trim()
}

/// Prose that follows the last closing brace, with any fence markers removed.
pub fn text_after_last_brace(text: &str) -> Option<&str> {
    let last = text.rfind('}')?;
    let tail = text[last + 1..].trim();
    let tail = tail.trim_start_matches("```").trim();
    let tail = tail.trim_start_matches(']').trim();
    if tail.is_empty() {
        None
    } else {
        Some(tail)
    }
}

/// Shortens `s` to at most `max` characters by cutting the middle.
pub fn truncate_middle(s: &str, max: usize) -> String {
    let count = s.chars().count();
    if count <= max {
        return s.into();
    }
    let keep = max.saturating_sub(3) / 2;
    let head: String = s.chars().take(keep).collect();
    let tail: String = s.chars().skip(count - keep).collect();
    format!("{head}...{tail}")
}
