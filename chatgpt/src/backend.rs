use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The three backend families the engine knows how to talk to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// OpenAI-style `/chat/completions`, streamed as SSE.
    #[default]
    OpenAi,
    /// Local completion server (`/api/chat`), streamed as one JSON object per line.
    Local,
    /// Gemini `generateContent`, read as one full response.
    Gemini,
}

impl BackendKind {
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Local => "http://localhost:11434",
            Self::Gemini => "https://generativelanguage.googleapis.com/v1beta",
        }
    }

    /// Whether responses arrive incrementally and go through the chunk decoder.
    pub fn is_streaming(&self) -> bool {
        !matches!(self, Self::Gemini)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Local => "local",
            Self::Gemini => "gemini",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" | "open_ai" => Ok(Self::OpenAi),
            "local" | "ollama" => Ok(Self::Local),
            "gemini" => Ok(Self::Gemini),
            other => Err(format!("unknown backend '{other}' (expected openai, local or gemini)")),
        }
    }
}
