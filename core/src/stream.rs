//! Per-round accumulation: raw transport text in, visible text, reasoning and
//! delta snapshots out.

use slide_chatgpt::{decode_chunk, decode_final, decode_full};
use slide_protocol::{ChunkResult, FinishReason, ResponseDelta};
use tracing::debug;

use crate::parser::parse_response;
use crate::thinking::{combine_thinking, split_thinking};

/// What changed since the previous call. `None` fields are unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Progress {
    pub text: Option<String>,
    pub thinking: Option<String>,
    pub delta: Option<ResponseDelta>,
}

impl Progress {
    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.thinking.is_none() && self.delta.is_none()
    }
}

#[derive(Debug, Default)]
pub struct StreamAccumulator {
    streaming: bool,
    buffer: String,
    cursor: usize,
    /// Decoded content, tags included.
    content: String,
    /// Decoder-side reasoning (`reasoning_content`, thought parts).
    reasoning: String,
    finish_reason: Option<FinishReason>,
    text: String,
    thinking: String,
    delta: ResponseDelta,
}

impl StreamAccumulator {
    /// `streaming` is false for backends that answer with one body.
    pub fn new(streaming: bool) -> Self {
        Self {
            streaming,
            ..Self::default()
        }
    }

    /// Feeds newly received raw text.
    pub fn push(&mut self, raw: &str) -> Progress {
        self.buffer.push_str(raw);
        if !self.streaming {
            return Progress::default();
        }
        let result = decode_chunk(&self.buffer, self.cursor);
        self.absorb(result)
    }

    /// Decodes whatever is left once the transport is done.
    pub fn finish(&mut self) -> Progress {
        let result = if self.streaming {
            decode_final(&self.buffer, self.cursor)
        } else {
            decode_full(&self.buffer)
        };
        self.absorb(result)
    }

    fn absorb(&mut self, result: ChunkResult) -> Progress {
        self.cursor = result.cursor;
        if let Some(reason) = result.finish_reason {
            self.record_finish(reason);
        }
        if result.content.is_empty() && result.thinking.is_empty() {
            return Progress::default();
        }
        self.content.push_str(&result.content);
        self.reasoning.push_str(&result.thinking);

        let split = split_thinking(&self.content);
        let thinking = combine_thinking(&self.reasoning, &split.thinking);
        let delta = parse_response(&split.content);

        let mut progress = Progress::default();
        if split.content != self.text {
            self.text = split.content;
            progress.text = Some(self.text.clone());
        }
        if thinking != self.thinking {
            self.thinking = thinking;
            progress.thinking = Some(self.thinking.clone());
        }
        let grew = delta.slides.len() > self.delta.slides.len();
        let new_action = delta.action.is_some() && delta.action != self.delta.action;
        if grew || new_action {
            debug!(
                "delta now {:?} with {} slide(s)",
                delta.action,
                delta.slides.len()
            );
            progress.delta = Some(delta.clone());
        }
        self.delta = delta;
        progress
    }

    fn record_finish(&mut self, reason: FinishReason) {
        match self.finish_reason {
            Some(existing) if existing.is_error() && !reason.is_error() => {}
            _ => self.finish_reason = Some(reason),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn thinking(&self) -> &str {
        &self.thinking
    }

    pub fn delta(&self) -> &ResponseDelta {
        &self.delta
    }

    pub fn finish_reason(&self) -> Option<FinishReason> {
        self.finish_reason
    }
}
