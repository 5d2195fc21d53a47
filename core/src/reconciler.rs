//! Action Reconciler: folds one completed model turn into the session.
//!
//! The reconciler owns no state. It takes the current deck and history and
//! returns the new history plus the intents the caller must apply, so every
//! branch of the action state machine can be tested without a queue.

use serde_json::Value;
use tracing::{info, warn};

use slide_common::strip_code_fence;
use slide_protocol::{Action, ChatMessage, Clarification, ResponseDelta, Slide};

use crate::deck;
use crate::error::{EngineError, Result};
use crate::normalize::{has_slide_identity, slide_from_value};
use crate::parser::{first_json_value, parse_with_format, WireFormat};
use crate::repair::{parse_partial_slides, scan_objects};

/// Side effects requested by a reconciled turn, applied in order by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    ReplaceDeck(Vec<Slide>),
    EmitMessage(String),
    Clarify(Clarification),
    /// Run another round with `prompt` already appended to the history.
    FollowUp { slide_numbers: Vec<u32>, prompt: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub history: Vec<ChatMessage>,
    pub intents: Vec<Intent>,
}

/// One finished round of model output.
#[derive(Debug, Clone)]
pub struct CompletedTurn<'a> {
    /// What the user originally asked for, carried into retrieval follow-ups.
    pub instruction: &'a str,
    /// Visible text of the round, recorded in history as the assistant turn.
    pub raw_text: &'a str,
    pub delta: ResponseDelta,
}

/// Final parse of a round's visible text, with salvage applied.
pub fn finalize_delta(text: &str) -> ResponseDelta {
    let (mut delta, format) = parse_with_format(text);
    let recovered = match format {
        // Slide lines under a header that takes none are the same mistake.
        WireFormat::LineDelimited => !delta.slides.is_empty(),
        WireFormat::Legacy | WireFormat::Partial => salvage(text, &mut delta),
    };
    if recovered {
        coerce_to_append(&mut delta);
    }
    delta
}

/// Recovers slide objects a non-compliant model wrote after its JSON payload.
/// Returns whether anything was recovered.
pub fn salvage(text: &str, delta: &mut ResponseDelta) -> bool {
    let body = strip_code_fence(text);
    let Some((_, end)) = first_json_value(body) else {
        return false;
    };
    let tail = body[end..].trim().trim_start_matches("```").trim();
    let Some(start) = tail.find(['[', '{']) else {
        return false;
    };
    let tail = &tail[start..];

    let recovered: Vec<_> = if tail.starts_with('[') {
        parse_partial_slides(tail)
    } else {
        scan_objects(tail)
            .into_iter()
            .filter(has_slide_identity)
            .filter_map(|object| slide_from_value(&Value::Object(object)))
            .collect()
    };
    if recovered.is_empty() {
        return false;
    }

    warn!("salvaged {} slide(s) from text after the payload", recovered.len());
    delta.slides.extend(recovered);
    coerce_to_append(delta);
    true
}

/// Recovered slides win over an action that would otherwise ignore them.
fn coerce_to_append(delta: &mut ResponseDelta) {
    if matches!(delta.action, None | Some(Action::Info | Action::Ask)) {
        warn!("coercing action {:?} to append after salvage", delta.action);
        delta.action = Some(Action::Append);
    }
}

pub fn reconcile(
    deck: &[Slide],
    history: &[ChatMessage],
    turn: &CompletedTurn<'_>,
    remaining_retrieval_rounds: u32,
) -> Result<Reconciliation> {
    let delta = &turn.delta;
    let mut history = history.to_vec();
    history.push(ChatMessage::assistant(turn.raw_text));

    let action = match delta.action {
        Some(action) => action,
        None if !delta.slides.is_empty() => {
            warn!("no action with {} slide(s); appending", delta.slides.len());
            Action::Append
        }
        None => return Err(EngineError::Unparseable),
    };

    let intents = match action {
        Action::Create => {
            require(action, !delta.slides.is_empty(), "slides")?;
            vec![Intent::ReplaceDeck(deck::create(&delta.slides))]
        }
        Action::Append => {
            require(action, !delta.slides.is_empty(), "slides")?;
            vec![Intent::ReplaceDeck(deck::append(deck, &delta.slides))]
        }
        Action::Update => {
            require(action, !delta.slides.is_empty(), "slides")?;
            vec![Intent::ReplaceDeck(deck::update(deck, &delta.slides))]
        }
        Action::Delete => {
            let numbers: Vec<u32> = if delta.slide_numbers.is_empty() {
                delta.slides.iter().filter_map(|s| s.slide_number).collect()
            } else {
                delta.slide_numbers.clone()
            };
            require(action, !numbers.is_empty(), "slide numbers")?;
            vec![Intent::ReplaceDeck(deck::delete(deck, &numbers))]
        }
        Action::Ask => {
            let question = delta.question.as_deref().map(str::trim).unwrap_or_default();
            require(action, !question.is_empty(), "a question")?;
            vec![Intent::Clarify(Clarification {
                question: question.to_string(),
                options: delta.options.clone(),
                allow_custom: delta.allow_custom.unwrap_or(true),
            })]
        }
        Action::Response => {
            let content = delta.content.as_deref().map(str::trim).unwrap_or_default();
            require(action, !content.is_empty(), "content")?;
            vec![Intent::EmitMessage(content.to_string())]
        }
        Action::Batch => {
            require(action, !delta.operations.is_empty(), "operations")?;
            vec![Intent::ReplaceDeck(deck::batch(deck, &delta.operations))]
        }
        Action::Sort => {
            let order = delta.new_order.as_deref().unwrap_or_default();
            require(action, !order.is_empty(), "a new order")?;
            vec![Intent::ReplaceDeck(deck::sort(deck, order))]
        }
        Action::Info => {
            return retrieval(deck, history, turn, remaining_retrieval_rounds);
        }
    };

    Ok(Reconciliation { history, intents })
}

fn require(action: Action, present: bool, field: &'static str) -> Result<()> {
    if present {
        Ok(())
    } else {
        Err(EngineError::MissingField { action, field })
    }
}

/// The `info` branch: answer with full slide bodies in a synthetic user turn,
/// or fail once the retrieval budget is spent.
fn retrieval(
    deck: &[Slide],
    mut history: Vec<ChatMessage>,
    turn: &CompletedTurn<'_>,
    remaining_retrieval_rounds: u32,
) -> Result<Reconciliation> {
    let delta = &turn.delta;
    if remaining_retrieval_rounds == 0 || deck.is_empty() {
        if delta.slides.is_empty() {
            return Err(EngineError::RetrievalFailed);
        }
        warn!("info reply carried slides with no retrieval possible; appending");
        return Ok(Reconciliation {
            history,
            intents: vec![Intent::ReplaceDeck(deck::append(deck, &delta.slides))],
        });
    }

    let mut targets: Vec<&Slide> = delta
        .slide_numbers
        .iter()
        .filter_map(|n| deck.iter().find(|slide| slide.slide_number == *n))
        .collect();
    if targets.is_empty() {
        // No usable numbers: send the whole deck.
        targets = deck.iter().collect();
    }

    let slide_numbers: Vec<u32> = targets.iter().map(|s| s.slide_number).collect();
    let prompt = retrieval_prompt(&targets, turn.instruction)?;
    info!("retrieval round for slides {slide_numbers:?}");
    history.push(ChatMessage::user(prompt.clone()));

    Ok(Reconciliation {
        history,
        intents: vec![Intent::FollowUp {
            slide_numbers,
            prompt,
        }],
    })
}

fn retrieval_prompt(slides: &[&Slide], instruction: &str) -> Result<String> {
    let body = serde_json::to_string_pretty(slides)
        .map_err(|err| EngineError::Generation(err.to_string()))?;
    Ok(format!(
        "Here is the full content of the requested slides:\n```json\n{body}\n```\n\n\
         Original request: {instruction}\n\n\
         Complete the original request now. Do not reply with \"info\" again."
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use slide_protocol::SlideDraft;

    fn deck_of(n: u32) -> Vec<Slide> {
        deck::create(
            &(1..=n)
                .map(|i| SlideDraft {
                    title: Some(format!("Slide {i}")),
                    content: Some(format!("Body {i}")),
                    ..SlideDraft::default()
                })
                .collect::<Vec<_>>(),
        )
    }

    fn turn(delta: ResponseDelta) -> CompletedTurn<'static> {
        CompletedTurn {
            instruction: "tighten slide 2",
            raw_text: "{}",
            delta,
        }
    }

    fn with_action(action: Action) -> ResponseDelta {
        ResponseDelta {
            action: Some(action),
            ..ResponseDelta::default()
        }
    }

    #[test]
    fn info_with_no_numbers_targets_all_slides() {
        let deck = deck_of(5);
        let history = vec![ChatMessage::user("tighten slide 2")];
        let out = reconcile(&deck, &history, &turn(with_action(Action::Info)), 1).unwrap();

        let [Intent::FollowUp { slide_numbers, prompt }] = out.intents.as_slice() else {
            panic!("expected a follow-up, got {:?}", out.intents);
        };
        assert_eq!(slide_numbers, &vec![1, 2, 3, 4, 5]);
        for i in 1..=5 {
            assert!(prompt.contains(&format!("Body {i}")));
        }
        assert!(prompt.contains("tighten slide 2"));
        assert_eq!(out.history.len(), 3);
        assert_eq!(out.history[2].content, *prompt);
    }

    #[test]
    fn info_with_numbers_targets_only_those() {
        let mut delta = with_action(Action::Info);
        delta.slide_numbers = vec![2, 42];
        let out = reconcile(&deck_of(3), &[], &turn(delta), 1).unwrap();
        let [Intent::FollowUp { slide_numbers, prompt }] = out.intents.as_slice() else {
            panic!("expected a follow-up");
        };
        assert_eq!(slide_numbers, &vec![2]);
        assert!(!prompt.contains("Body 1"));
    }

    #[test]
    fn info_without_budget_fails() {
        let err = reconcile(&deck_of(3), &[], &turn(with_action(Action::Info)), 0).unwrap_err();
        assert!(matches!(err, EngineError::RetrievalFailed));
        let err = reconcile(&[], &[], &turn(with_action(Action::Info)), 1).unwrap_err();
        assert!(matches!(err, EngineError::RetrievalFailed));
    }

    #[test]
    fn missing_action_with_slides_appends() {
        let delta = ResponseDelta {
            slides: vec![SlideDraft {
                title: Some("Extra".into()),
                ..SlideDraft::default()
            }],
            ..ResponseDelta::default()
        };
        let out = reconcile(&deck_of(2), &[], &turn(delta), 1).unwrap();
        let [Intent::ReplaceDeck(slides)] = out.intents.as_slice() else {
            panic!("expected a deck replacement");
        };
        assert_eq!(slides.len(), 3);
        assert_eq!(slides[2].title, "Extra");
    }

    #[test]
    fn ask_and_response_do_not_touch_the_deck() {
        let mut ask = with_action(Action::Ask);
        ask.question = Some("Which tone?".into());
        ask.options = vec!["Formal".into(), "Casual".into()];
        let out = reconcile(&deck_of(1), &[], &turn(ask), 1).unwrap();
        assert_eq!(
            out.intents,
            vec![Intent::Clarify(Clarification {
                question: "Which tone?".into(),
                options: vec!["Formal".into(), "Casual".into()],
                allow_custom: true,
            })]
        );

        let mut chat = with_action(Action::Response);
        chat.content = Some("Done.".into());
        let out = reconcile(&deck_of(1), &[], &turn(chat), 1).unwrap();
        assert_eq!(out.intents, vec![Intent::EmitMessage("Done.".into())]);
    }

    #[test]
    fn required_payload_is_enforced() {
        let err = reconcile(&deck_of(1), &[], &turn(with_action(Action::Ask)), 1).unwrap_err();
        assert!(matches!(err, EngineError::MissingField { action: Action::Ask, .. }));
        let err = reconcile(&deck_of(1), &[], &turn(with_action(Action::Sort)), 1).unwrap_err();
        assert!(matches!(err, EngineError::MissingField { action: Action::Sort, .. }));
        let err = reconcile(&deck_of(1), &[], &turn(ResponseDelta::default()), 1).unwrap_err();
        assert!(matches!(err, EngineError::Unparseable));
    }

    #[test]
    fn salvage_recovers_slides_after_payload() {
        let text = "{\n\"action\":\"info\",\n\"slide_numbers\":[1]\n}\nOops, here they are:\n[{\"slide_number\":1,\"title\":\"Recovered\"}]";
        let delta = finalize_delta(text);
        assert_eq!(delta.action, Some(Action::Append));
        assert_eq!(delta.slides.len(), 1);
        assert_eq!(delta.slides[0].title.as_deref(), Some("Recovered"));
    }

    #[test]
    fn salvage_scans_loose_objects() {
        let text = "{\n\"action\":\"ask\",\"question\":\"x\"\n}\n{\"t\":\"Loose\",\"c\":\"y\"} {\"note\":1}";
        let delta = finalize_delta(text);
        assert_eq!(delta.action, Some(Action::Append));
        assert_eq!(delta.slides.len(), 1);
    }

    fn deck_size_after(text: &str) -> usize {
        let out = reconcile(&deck_of(3), &[], &turn(finalize_delta(text)), 1).unwrap();
        match out.intents.as_slice() {
            [Intent::ReplaceDeck(slides)] => slides.len(),
            other => panic!("expected a deck replacement, got {other:?}"),
        }
    }

    #[test]
    fn slide_lines_under_an_info_header_are_appended() {
        let text = "{\"a\":\"info\",\"ids\":[2]}\n{\"i\":2,\"t\":\"Rewritten\"}";
        let delta = finalize_delta(text);
        assert_eq!(delta.action, Some(Action::Append));
        assert_eq!(delta.slides.len(), 1);
        assert_eq!(deck_size_after(text), 4);
    }

    #[test]
    fn slide_array_after_a_one_line_info_object_is_appended() {
        let text = "{\"action\":\"info\",\"slide_numbers\":[2]}\n[{\"slide_number\":2,\"title\":\"Rewritten\"}]";
        let delta = finalize_delta(text);
        assert_eq!(delta.action, Some(Action::Append));
        assert_eq!(delta.slides[0].title.as_deref(), Some("Rewritten"));
        assert_eq!(deck_size_after(text), 4);
    }

    #[test]
    fn slide_array_line_under_an_append_header_is_kept() {
        let text = "{\"a\":\"append\"}\n[{\"i\":4,\"t\":\"Four\"},{\"i\":5,\"t\":\"Five\"}]";
        let delta = finalize_delta(text);
        assert_eq!(delta.action, Some(Action::Append));
        assert_eq!(delta.slides.len(), 2);
        assert_eq!(deck_size_after(text), 5);
    }

    #[test]
    fn slide_lines_under_an_ask_header_are_appended() {
        let text = "{\"a\":\"ask\",\"q\":\"Tone?\"}\n{\"i\":1,\"t\":\"Opening\"}";
        assert_eq!(finalize_delta(text).action, Some(Action::Append));
        assert_eq!(deck_size_after(text), 4);
    }

    #[test]
    fn update_lines_are_not_coerced() {
        let delta = finalize_delta("{\"a\":\"update\"}\n{\"i\":2,\"t\":\"New\"}");
        assert_eq!(delta.action, Some(Action::Update));
    }

    #[test]
    fn salvage_leaves_clean_output_alone() {
        let mut delta = with_action(Action::Response);
        assert!(!salvage("{\"action\":\"response\",\"content\":\"hi\"}\nThanks!", &mut delta));
        assert_eq!(delta.action, Some(Action::Response));
    }
}
