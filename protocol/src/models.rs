use serde::{Deserialize, Serialize};

/// Layout hint the model attaches to each slide.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Layout {
    Intro,
    SplitLeft,
    SplitRight,
    #[default]
    Centered,
    Quote,
    FullImage,
}

impl Layout {
    /// Accepts canonical names and the short codes used by the compact wire format.
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "intro" => Some(Self::Intro),
            "split-left" | "left" => Some(Self::SplitLeft),
            "split-right" | "right" => Some(Self::SplitRight),
            "centered" | "center" => Some(Self::Centered),
            "quote" => Some(Self::Quote),
            "full-image" => Some(Self::FullImage),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Intro => "intro",
            Self::SplitLeft => "split-left",
            Self::SplitRight => "split-right",
            Self::Centered => "centered",
            Self::Quote => "quote",
            Self::FullImage => "full-image",
        }
    }
}

/// One finalized slide in a deck. `slide_number` is dense and starts at 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slide {
    pub slide_number: u32,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub visual_needs_image: bool,
    #[serde(default)]
    pub visual_description: String,
    #[serde(default)]
    pub layout_suggestion: Layout,
    #[serde(default)]
    pub speaker_notes: String,
    #[serde(default)]
    pub estimated_duration: String,
}

impl Slide {
    /// Overwrites every field the draft carries. The slide number is left alone;
    /// numbering belongs to the deck.
    pub fn merge(&mut self, draft: &SlideDraft) {
        if let Some(title) = &draft.title {
            self.title = title.clone();
        }
        if let Some(content) = &draft.content {
            self.content = content.clone();
        }
        if let Some(needs_image) = draft.visual_needs_image {
            self.visual_needs_image = needs_image;
        }
        if let Some(description) = &draft.visual_description {
            self.visual_description = description.clone();
        }
        if let Some(layout) = draft.layout_suggestion {
            self.layout_suggestion = layout;
        }
        if let Some(notes) = &draft.speaker_notes {
            self.speaker_notes = notes.clone();
        }
        if let Some(duration) = &draft.estimated_duration {
            self.estimated_duration = duration.clone();
        }
    }
}

/// A slide record as recovered from model output: every field optional,
/// always in canonical (long) key names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlideDraft {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slide_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visual_needs_image: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visual_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout_suggestion: Option<Layout>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker_notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_duration: Option<String>,
}

impl SlideDraft {
    pub fn into_slide(self, slide_number: u32) -> Slide {
        Slide {
            slide_number,
            title: self.title.unwrap_or_default(),
            content: self.content.unwrap_or_default(),
            visual_needs_image: self.visual_needs_image.unwrap_or(false),
            visual_description: self.visual_description.unwrap_or_default(),
            layout_suggestion: self.layout_suggestion.unwrap_or_default(),
            speaker_notes: self.speaker_notes.unwrap_or_default(),
            estimated_duration: self.estimated_duration.unwrap_or_default(),
        }
    }
}

impl From<&Slide> for SlideDraft {
    fn from(slide: &Slide) -> Self {
        Self {
            slide_number: Some(slide.slide_number),
            title: Some(slide.title.clone()),
            content: Some(slide.content.clone()),
            visual_needs_image: Some(slide.visual_needs_image),
            visual_description: Some(slide.visual_description.clone()),
            layout_suggestion: Some(slide.layout_suggestion),
            speaker_notes: Some(slide.speaker_notes.clone()),
            estimated_duration: Some(slide.estimated_duration.clone()),
        }
    }
}

/// What the model wants done with its turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Create,
    Append,
    Update,
    Delete,
    Ask,
    Response,
    Info,
    Batch,
    Sort,
}

impl Action {
    /// Maps both the compact tokens (`del`, `chat`) and the canonical names.
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "create" => Some(Self::Create),
            "append" => Some(Self::Append),
            "update" => Some(Self::Update),
            "del" | "delete" => Some(Self::Delete),
            "ask" => Some(Self::Ask),
            "chat" | "response" => Some(Self::Response),
            "info" => Some(Self::Info),
            "batch" => Some(Self::Batch),
            "sort" => Some(Self::Sort),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Append => "append",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Ask => "ask",
            Self::Response => "response",
            Self::Info => "info",
            Self::Batch => "batch",
            Self::Sort => "sort",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchOpKind {
    Update,
    Delete,
}

/// One step of a `batch` action. `slide_number` refers to the deck as it was
/// before the batch started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOp {
    #[serde(rename = "type")]
    pub kind: BatchOpKind,
    pub slide_number: u32,
    #[serde(default, flatten)]
    pub fields: SlideDraft,
}

/// The parsed-so-far shape of one model turn. Rebuilt from the full visible
/// text on every chunk, never patched in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    #[serde(default)]
    pub slides: Vec<SlideDraft>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_custom: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub slide_numbers: Vec<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub operations: Vec<BatchOp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_order: Option<Vec<u32>>,
}

impl ResponseDelta {
    /// True when nothing usable has been recovered yet.
    pub fn is_empty(&self) -> bool {
        self.action.is_none() && self.slides.is_empty()
    }
}

/// Why the backend stopped generating, normalized across providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    MaxTokens,
    Safety,
    Recitation,
    Other,
}

impl FinishReason {
    /// `None` for a missing or `null` reason. Unrecognized values collapse to `Other`.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_uppercase();
        match normalized.as_str() {
            "" | "NULL" => None,
            "STOP" => Some(Self::Stop),
            "MAX_TOKENS" | "LENGTH" => Some(Self::MaxTokens),
            "SAFETY" | "CONTENT_FILTER" | "PROHIBITED_CONTENT" | "BLOCKLIST" | "SPII" => {
                Some(Self::Safety)
            }
            "RECITATION" => Some(Self::Recitation),
            _ => Some(Self::Other),
        }
    }

    pub fn is_error(&self) -> bool {
        !matches!(self, Self::Stop)
    }
}

/// A decode increment plus the cursor to hand back on the next call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkResult {
    pub content: String,
    pub thinking: String,
    pub finish_reason: Option<FinishReason>,
    pub cursor: usize,
}

impl ChunkResult {
    pub fn at(cursor: usize) -> Self {
        Self {
            cursor,
            ..Self::default()
        }
    }

    /// An error reason is never downgraded by a later plain `stop`.
    pub fn record_finish(&mut self, reason: FinishReason) {
        match self.finish_reason {
            Some(existing) if existing.is_error() && !reason.is_error() => {}
            _ => self.finish_reason = Some(reason),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty() && self.thinking.is_empty() && self.finish_reason.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One conversation turn as sent to a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    /// Base64 payloads or `data:` URLs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            images: Vec::new(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            images: Vec::new(),
        }
    }

    pub fn with_images(mut self, images: Vec<String>) -> Self {
        self.images = images;
        self
    }
}

/// An interactive question the model raised with `ask`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clarification {
    pub question: String,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub allow_custom: bool,
}

/// The user's reply to a [`Clarification`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum ClarificationAnswer {
    Selected(String),
    Custom(String),
    Skipped,
}

impl ClarificationAnswer {
    /// Renders the answer as the next user turn.
    pub fn to_prompt(&self, clarification: &Clarification) -> String {
        match self {
            Self::Selected(choice) | Self::Custom(choice) => {
                format!("{}\nAnswer: {choice}", clarification.question)
            }
            Self::Skipped => format!(
                "{}\nThe user skipped this question. Proceed using your best judgment.",
                clarification.question
            ),
        }
    }
}
