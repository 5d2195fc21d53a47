//! Events the generation engine emits to the UI/session layer, and the queue
//! records it keeps per user turn.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Clarification, ResponseDelta, Slide};

/// Identifies one queued user turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(Uuid);

impl ItemId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Queued,
    Processing,
    Done,
    Error,
}

/// Processing record for one user turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: ItemId,
    pub project_id: String,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
    pub status: QueueStatus,
    /// Visible text accumulated in the current round.
    pub text: String,
    /// Combined reasoning of the current round.
    pub thinking: String,
    pub delta: ResponseDelta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Slides requested by an `info` reply, once a retrieval round started.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub retrieval_targets: Vec<u32>,
    pub retrieval_rounds_used: u32,
    /// Whether any chunk so far carried a recognizable action.
    pub action_seen: bool,
}

impl QueueItem {
    pub fn new(project_id: impl Into<String>, prompt: impl Into<String>, images: Vec<String>) -> Self {
        Self {
            id: ItemId::new(),
            project_id: project_id.into(),
            prompt: prompt.into(),
            images,
            status: QueueStatus::Queued,
            text: String::new(),
            thinking: String::new(),
            delta: ResponseDelta::default(),
            error: None,
            retrieval_targets: Vec::new(),
            retrieval_rounds_used: 0,
            action_seen: false,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.status, QueueStatus::Done | QueueStatus::Error)
    }
}

/// Engine output, in the order it happens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    StatusChanged {
        item_id: ItemId,
        status: QueueStatus,
    },
    /// Visible text of the current round, re-split from the full buffer.
    ContentUpdated {
        item_id: ItemId,
        text: String,
    },
    ThinkingUpdated {
        item_id: ItemId,
        thinking: String,
    },
    /// Sent whenever the delta gains slides or a recognized action.
    DeltaUpdated {
        item_id: ItemId,
        delta: ResponseDelta,
    },
    RetrievalStarted {
        item_id: ItemId,
        slide_numbers: Vec<u32>,
    },
    DeckChanged {
        project_id: String,
        deck: Vec<Slide>,
    },
    ChatMessage {
        item_id: ItemId,
        content: String,
    },
    Clarification {
        item_id: ItemId,
        clarification: Clarification,
    },
    Completed {
        item_id: ItemId,
        text: String,
        slides: Vec<Slide>,
        thinking: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        completion_message: Option<String>,
        /// Backend-reported problem (truncation, filtering) that did not stop decoding.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        warning: Option<String>,
    },
    Failed {
        item_id: ItemId,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<u16>,
    },
}

impl Event {
    pub fn item_id(&self) -> Option<ItemId> {
        match self {
            Self::StatusChanged { item_id, .. }
            | Self::ContentUpdated { item_id, .. }
            | Self::ThinkingUpdated { item_id, .. }
            | Self::DeltaUpdated { item_id, .. }
            | Self::RetrievalStarted { item_id, .. }
            | Self::ChatMessage { item_id, .. }
            | Self::Clarification { item_id, .. }
            | Self::Completed { item_id, .. }
            | Self::Failed { item_id, .. } => Some(*item_id),
            Self::DeckChanged { .. } => None,
        }
    }

    /// Terminal for the item it belongs to.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }
}
