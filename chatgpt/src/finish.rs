use serde::{Deserialize, Serialize};

use slide_protocol::FinishReason;

/// Which feature issued the request. The same finish reason reads differently
/// to the user depending on what they asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationContext {
    Generate,
    Enhance,
    Suggestion,
    Compact,
}

use FinishReason::{MaxTokens, Other, Recitation, Safety};
use GenerationContext::{Compact, Enhance, Generate, Suggestion};

const FINISH_MESSAGES: &[(GenerationContext, FinishReason, &str)] = &[
    (Generate, MaxTokens, "Response truncated: Max output tokens reached. Try asking for fewer slides at a time."),
    (Generate, Safety, "Response blocked by the provider's safety filters."),
    (Generate, Recitation, "Response stopped: the output resembled existing copyrighted material."),
    (Generate, Other, "Response stopped unexpectedly by the provider."),
    (Enhance, MaxTokens, "Enhancement truncated: Max output tokens reached."),
    (Enhance, Safety, "Enhancement blocked by safety filters."),
    (Enhance, Recitation, "Enhancement stopped: recitation detected."),
    (Enhance, Other, "Enhancement stopped unexpectedly."),
    (Suggestion, MaxTokens, "Suggestions truncated: Max output tokens reached."),
    (Suggestion, Safety, "Suggestions blocked by safety filters."),
    (Suggestion, Recitation, "Suggestions stopped: recitation detected."),
    (Suggestion, Other, "Suggestions stopped unexpectedly."),
    (Compact, MaxTokens, "Summary truncated: Max output tokens reached."),
    (Compact, Safety, "Summary blocked by safety filters."),
    (Compact, Recitation, "Summary stopped: recitation detected."),
    (Compact, Other, "Summary stopped unexpectedly."),
];

/// The user-facing message for a finish reason, or `None` when the reason
/// means a normal stop.
pub fn finish_reason_message(context: GenerationContext, reason: FinishReason) -> Option<&'static str> {
    FINISH_MESSAGES
        .iter()
        .find(|(ctx, r, _)| *ctx == context && *r == reason)
        .map(|(_, _, message)| *message)
}
