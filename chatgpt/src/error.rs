use serde_json::Value;
use thiserror::Error;

use slide_common::truncate_middle;

/// Transport-level failures. `Display` is the user-facing message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Cancelled")]
    Cancelled,

    #[error("Authentication failed (401). Check your API key.")]
    Unauthorized,

    #[error("Access denied (403). Your API key may not have access to this model.")]
    Forbidden,

    #[error("Model or endpoint not found (404). Check the model name and base URL.")]
    NotFound,

    #[error("{}", rate_limit_message(.retry_after_secs))]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("The model server returned an error ({status}). Try again later.")]
    Server { status: u16 },

    #[error("Network error: could not reach the model server ({0}).")]
    Network(String),

    #[error("Request failed ({status}): {body}")]
    Http { status: u16, body: String },

    #[error("{0}")]
    Other(String),
}

fn rate_limit_message(retry_after_secs: &Option<u64>) -> String {
    match retry_after_secs {
        Some(secs) => format!("Rate limit exceeded (429). Retry in {secs} seconds."),
        None => "Rate limit exceeded (429). Please wait and try again.".to_string(),
    }
}

impl TransportError {
    /// Maps a non-success HTTP response. `retry_after` is the raw header value.
    pub fn from_status(status: u16, retry_after: Option<&str>, body: &str) -> Self {
        match status {
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            429 => Self::RateLimited {
                retry_after_secs: retry_after
                    .and_then(parse_retry_after_header)
                    .or_else(|| retry_delay_from_body(body)),
            },
            500..=599 => Self::Server { status },
            _ => Self::Http {
                status,
                body: truncate_middle(body.trim(), 300),
            },
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized => Some(401),
            Self::Forbidden => Some(403),
            Self::NotFound => Some(404),
            Self::RateLimited { .. } => Some(429),
            Self::Server { status } | Self::Http { status, .. } => Some(*status),
            Self::Cancelled | Self::Network(_) | Self::Other(_) => None,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() || err.is_request() {
            Self::Network(err.to_string())
        } else if let Some(status) = err.status() {
            Self::from_status(status.as_u16(), None, "")
        } else {
            Self::Other(err.to_string())
        }
    }
}

fn parse_retry_after_header(value: &str) -> Option<u64> {
    let value = value.trim();
    value
        .parse::<u64>()
        .ok()
        .or_else(|| value.parse::<f64>().ok().map(|secs| secs.ceil() as u64))
}

/// Gemini reports the delay inside `error.details[].retryDelay`, e.g. `"37s"`.
fn retry_delay_from_body(body: &str) -> Option<u64> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .pointer("/error/details")?
        .as_array()?
        .iter()
        .filter_map(|detail| detail.get("retryDelay")?.as_str())
        .find_map(|delay| parse_retry_after_header(delay.trim_end_matches('s')))
}
