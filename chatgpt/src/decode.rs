//! Turns raw backend response text into uniform content/thinking/finish-reason
//! increments.
//!
//! The streaming decoder is a pure function of `(buffer, cursor)`: it only looks
//! at lines that are complete (newline-terminated) past the cursor and reports the
//! cursor to resume from. The unterminated tail is left alone so it can be decoded
//! once it has grown into a full line.

use serde_json::Value;
use tracing::debug;

use slide_protocol::{ChunkResult, FinishReason};

/// Decodes every complete line in `buffer[cursor..]`.
pub fn decode_chunk(buffer: &str, cursor: usize) -> ChunkResult {
    let Some(pending) = buffer.get(cursor..) else {
        return ChunkResult::at(cursor);
    };
    let Some(last_newline) = memchr::memrchr(b'\n', pending.as_bytes()) else {
        return ChunkResult::at(cursor);
    };

    let mut result = ChunkResult::at(cursor + last_newline + 1);
    for line in pending[..last_newline].split('\n') {
        decode_line(line, &mut result);
    }
    result
}

/// Like [`decode_chunk`], but also decodes the unterminated tail. Call once the
/// stream has ended.
pub fn decode_final(buffer: &str, cursor: usize) -> ChunkResult {
    let mut result = decode_chunk(buffer, cursor);
    if let Some(tail) = buffer.get(result.cursor..) {
        decode_line(tail, &mut result);
    }
    result.cursor = buffer.len();
    result
}

/// One-shot decoding of a complete, non-streamed response body.
pub fn decode_full(body: &str) -> ChunkResult {
    let mut result = ChunkResult::at(body.len());
    match serde_json::from_str::<Value>(body.trim()) {
        Ok(Value::Array(items)) => {
            for item in &items {
                apply_record(item, &mut result);
            }
        }
        Ok(value) => apply_record(&value, &mut result),
        Err(err) => {
            debug!("full body is not a single JSON document ({err}); decoding line by line");
            return decode_final(body, 0);
        }
    }
    result
}

fn decode_line(line: &str, result: &mut ChunkResult) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }

    if let Some(payload) = line.strip_prefix("data:") {
        let payload = payload.trim();
        if payload == "[DONE]" {
            return;
        }
        match serde_json::from_str::<Value>(payload) {
            Ok(value) => apply_record(&value, result),
            Err(_) => debug!("skipping undecodable SSE payload"),
        }
        return;
    }

    // Bare JSON per line, possibly one element of a streamed JSON array.
    let mut record = line;
    record = record.strip_prefix('[').unwrap_or(record).trim_start();
    record = record.strip_prefix(',').unwrap_or(record).trim_start();
    record = record.strip_suffix(']').unwrap_or(record).trim_end();
    record = record.strip_suffix(',').unwrap_or(record).trim_end();
    if record.is_empty() {
        return;
    }
    if let Ok(value) = serde_json::from_str::<Value>(record) {
        apply_record(&value, result);
    }
}

/// Applies every field lookup the three backends use to one decoded record.
fn apply_record(value: &Value, result: &mut ChunkResult) {
    // OpenAI-style chat completion chunk.
    if let Some(choice) = value.pointer("/choices/0") {
        if let Some(text) = choice.pointer("/delta/content").and_then(Value::as_str) {
            result.content.push_str(text);
        }
        if let Some(text) = choice.pointer("/delta/reasoning_content").and_then(Value::as_str) {
            result.thinking.push_str(text);
        }
        if let Some(text) = choice.pointer("/message/content").and_then(Value::as_str) {
            result.content.push_str(text);
        }
        if let Some(reason) = choice.get("finish_reason").and_then(Value::as_str) {
            record_reason(reason, result);
        }
    }

    // Gemini candidate.
    if let Some(candidate) = value.pointer("/candidates/0") {
        if let Some(parts) = candidate.pointer("/content/parts").and_then(Value::as_array) {
            for part in parts {
                let Some(text) = part.get("text").and_then(Value::as_str) else {
                    continue;
                };
                if part.get("thought").and_then(Value::as_bool).unwrap_or(false) {
                    result.thinking.push_str(text);
                } else {
                    result.content.push_str(text);
                }
            }
        }
        if let Some(reason) = candidate.get("finishReason").and_then(Value::as_str) {
            record_reason(reason, result);
        }
    }

    // Local completion server: chat (`message`) and generate (`response`) shapes.
    if let Some(message) = value.get("message") {
        if let Some(text) = message.get("content").and_then(Value::as_str) {
            result.content.push_str(text);
        }
        if let Some(text) = message.get("thinking").and_then(Value::as_str) {
            result.thinking.push_str(text);
        }
    }
    if let Some(text) = value.get("response").and_then(Value::as_str) {
        result.content.push_str(text);
    }
    if value.get("done").and_then(Value::as_bool) == Some(true) {
        match value.get("done_reason").and_then(Value::as_str) {
            Some(reason) => record_reason(reason, result),
            None => result.record_finish(FinishReason::Stop),
        }
    }
}

fn record_reason(raw: &str, result: &mut ChunkResult) {
    if let Some(reason) = FinishReason::parse(raw) {
        if reason.is_error() {
            debug!(raw, "backend reported non-stop finish reason");
        }
        result.record_finish(reason);
    }
}
