//! One queue item from first request to terminal event: stream, parse,
//! reconcile, and at most `retrieval_rounds` follow-up rounds.

use tracing::{debug, info, warn};

use slide_chatgpt::{
    build_request, finish_reason_message, skeleton_context, GenerationContext, Prompt,
};
use slide_common::{text_after_last_brace, CancelHandle};
use slide_protocol::{ChatMessage, Event, FinishReason, ItemId, QueueStatus, Slide};

use crate::conversation_history::ConversationHistory;
use crate::error::{EngineError, ErrorReporter, Result};
use crate::queue::GenerationQueue;
use crate::reconciler::{finalize_delta, reconcile, CompletedTurn, Intent};
use crate::session::Session;
use crate::stream::{Progress, StreamAccumulator};
use crate::thinking::combine_thinking;

/// Output of one request/response round.
struct Round {
    text: String,
    thinking: String,
    finish_reason: Option<FinishReason>,
}

/// What a successful item reports in its terminal event.
struct Outcome {
    text: String,
    slides: Vec<Slide>,
    thinking: String,
    completion_message: Option<String>,
    warning: Option<String>,
}

impl GenerationQueue {
    pub(crate) async fn run_item(&self, item_id: ItemId, cancel: CancelHandle) {
        let Some((project_id, prompt, images)) = self
            .update_item(item_id, |item| {
                item.status = QueueStatus::Processing;
                (item.project_id.clone(), item.prompt.clone(), item.images.clone())
            })
            .await
        else {
            return;
        };
        info!("processing {item_id} for project {project_id}");
        self.emit(Event::StatusChanged {
            item_id,
            status: QueueStatus::Processing,
        });

        match self
            .generate(item_id, &project_id, &prompt, images, &cancel)
            .await
        {
            Ok(outcome) => {
                info!("{item_id} done with {} slide(s)", outcome.slides.len());
                self.update_item(item_id, |item| item.status = QueueStatus::Done)
                    .await;
                self.emit(Event::StatusChanged {
                    item_id,
                    status: QueueStatus::Done,
                });
                self.emit(Event::Completed {
                    item_id,
                    text: outcome.text,
                    slides: outcome.slides,
                    thinking: outcome.thinking,
                    completion_message: outcome.completion_message,
                    warning: outcome.warning,
                });
            }
            Err(err) => {
                if err.is_cancelled() {
                    info!("{item_id} cancelled");
                } else {
                    warn!(
                        "{item_id} failed ({}): {err}",
                        ErrorReporter::get_severity(&err)
                    );
                }
                self.fail(item_id, err).await;
            }
        }
    }

    async fn generate(
        &self,
        item_id: ItemId,
        project_id: &str,
        prompt: &str,
        images: Vec<String>,
        cancel: &CancelHandle,
    ) -> Result<Outcome> {
        let session = self
            .inner
            .store
            .load(project_id)
            .await
            .map_err(|err| EngineError::Storage(err.to_string()))?;
        let mut deck = session.deck;
        let mut history = session.history;
        history.add_item(ChatMessage::user(prompt).with_images(images));

        let mut remaining_rounds = self.inner.config.retrieval_rounds;
        let mut thinking = String::new();

        loop {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            let round = self.run_round(item_id, &deck, &history, cancel).await?;
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            thinking = combine_thinking(&thinking, &round.thinking);

            let warning = round
                .finish_reason
                .and_then(|reason| finish_reason_message(GenerationContext::Generate, reason))
                .map(str::to_string);
            if let Some(warning) = &warning {
                warn!("{item_id}: {warning}");
            }

            let turn = CompletedTurn {
                instruction: prompt,
                raw_text: &round.text,
                delta: finalize_delta(&round.text),
            };
            let final_delta = turn.delta.clone();
            let reconciled = match reconcile(&deck, &history.contents(), &turn, remaining_rounds) {
                Ok(reconciled) => reconciled,
                Err(EngineError::Unparseable) if warning.is_some() => {
                    return Err(EngineError::Generation(warning.unwrap_or_default()));
                }
                Err(err) => return Err(err),
            };
            history.replace(reconciled.history);
            self.update_item(item_id, |item| item.delta = final_delta)
                .await;

            let mut follow_up = None;
            for intent in reconciled.intents {
                match intent {
                    Intent::ReplaceDeck(slides) => {
                        deck = slides;
                        self.emit(Event::DeckChanged {
                            project_id: project_id.to_string(),
                            deck: deck.clone(),
                        });
                    }
                    Intent::EmitMessage(content) => {
                        self.emit(Event::ChatMessage { item_id, content });
                    }
                    Intent::Clarify(clarification) => {
                        self.emit(Event::Clarification {
                            item_id,
                            clarification,
                        });
                    }
                    Intent::FollowUp { slide_numbers, .. } => follow_up = Some(slide_numbers),
                }
            }

            if let Some(slide_numbers) = follow_up {
                remaining_rounds = remaining_rounds.saturating_sub(1);
                let targets = slide_numbers.clone();
                self.update_item(item_id, |item| {
                    item.retrieval_targets = targets;
                    item.retrieval_rounds_used += 1;
                })
                .await;
                self.emit(Event::RetrievalStarted {
                    item_id,
                    slide_numbers,
                });
                continue;
            }

            self.inner
                .store
                .save(
                    project_id,
                    Session {
                        deck: deck.clone(),
                        history,
                    },
                )
                .await
                .map_err(|err| EngineError::Storage(err.to_string()))?;

            return Ok(Outcome {
                completion_message: text_after_last_brace(&round.text).map(str::to_string),
                text: round.text,
                slides: deck,
                thinking,
                warning,
            });
        }
    }

    async fn run_round(
        &self,
        item_id: ItemId,
        deck: &[Slide],
        history: &ConversationHistory,
        cancel: &CancelHandle,
    ) -> Result<Round> {
        let config = &self.inner.config;
        let deck_context = if config.skeleton_context {
            skeleton_context(deck)
        } else {
            full_context(deck)?
        };
        let request = build_request(
            &config.backend_settings(),
            Prompt {
                system_prompt: &config.system_prompt,
                messages: history.window(config.history_window),
                deck_context: Some(&deck_context),
            },
        );
        let mut accumulator = StreamAccumulator::new(request.streaming);

        let mut stream = tokio::select! {
            _ = cancel.cancelled() => return Err(EngineError::Cancelled),
            opened = self.inner.transport.open(request, cancel.clone()) => opened?,
        };

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return Err(EngineError::Cancelled),
                next = stream.recv() => next,
            };
            match next {
                Some(Ok(raw)) => {
                    let progress = accumulator.push(&raw);
                    self.publish(item_id, progress, cancel).await?;
                }
                Some(Err(err)) => return Err(err.into()),
                None => break,
            }
        }
        let progress = accumulator.finish();
        self.publish(item_id, progress, cancel).await?;
        debug!(
            "{item_id}: round finished with {:?}, {} chars",
            accumulator.finish_reason(),
            accumulator.text().len()
        );

        Ok(Round {
            text: accumulator.text().to_string(),
            thinking: accumulator.thinking().to_string(),
            finish_reason: accumulator.finish_reason(),
        })
    }

    /// Records progress on the item and forwards it as events. Nothing is
    /// forwarded once the item is cancelled.
    async fn publish(&self, item_id: ItemId, progress: Progress, cancel: &CancelHandle) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        if progress.is_empty() {
            return Ok(());
        }
        let Progress {
            text,
            thinking,
            delta,
        } = progress;

        self.update_item(item_id, |item| {
            if let Some(text) = &text {
                item.text = text.clone();
            }
            if let Some(thinking) = &thinking {
                item.thinking = thinking.clone();
            }
            if let Some(delta) = &delta {
                item.action_seen |= delta.action.is_some();
                item.delta = delta.clone();
            }
        })
        .await;

        if let Some(text) = text {
            self.emit(Event::ContentUpdated { item_id, text });
        }
        if let Some(thinking) = thinking {
            self.emit(Event::ThinkingUpdated { item_id, thinking });
        }
        if let Some(delta) = delta {
            self.emit(Event::DeltaUpdated { item_id, delta });
        }
        Ok(())
    }
}

/// Full slide bodies as deck context, for configurations that skip the
/// skeleton view.
fn full_context(deck: &[Slide]) -> Result<String> {
    if deck.is_empty() {
        return Ok(skeleton_context(deck));
    }
    let body = serde_json::to_string_pretty(deck)
        .map_err(|err| EngineError::Generation(err.to_string()))?;
    Ok(format!("Current presentation:\n```json\n{body}\n```"))
}

