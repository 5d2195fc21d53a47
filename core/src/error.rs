use std::fmt;

use slide_chatgpt::TransportError;
use slide_protocol::Action;
use thiserror::Error;

use crate::config::ConfigError;

/// Every way a generation can end without a reconciled result. `Display` is
/// the message shown to the user.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Cancelled")]
    Cancelled,

    #[error(transparent)]
    Transport(TransportError),

    /// The model asked for slide content that cannot be supplied, or kept
    /// asking after the retrieval round was used up.
    #[error("Could not retrieve the requested slide information.")]
    RetrievalFailed,

    #[error("Could not understand the model response. Please try again.")]
    Unparseable,

    /// The finish reason explains why nothing usable arrived.
    #[error("{0}")]
    Generation(String),

    #[error("The model replied with \"{action}\" but without {field}.")]
    MissingField { action: Action, field: &'static str },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Session storage error: {0}")]
    Storage(String),
}

impl From<TransportError> for EngineError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Cancelled => Self::Cancelled,
            other => Self::Transport(other),
        }
    }
}

impl EngineError {
    /// HTTP status for transport failures.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport(err) => err.status(),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, EngineError>;

/// Error reporting utilities
pub struct ErrorReporter;

impl ErrorReporter {
    /// Format error for terminal display, with a hint where one helps.
    pub fn format_user_error(error: &EngineError) -> String {
        match error {
            EngineError::Transport(TransportError::Unauthorized) => {
                format!("🔐 {error}\n💡 Set the environment variable named by api_key_env_var in your config")
            }
            EngineError::Transport(TransportError::RateLimited { .. }) => format!("⏳ {error}"),
            EngineError::Transport(TransportError::Network(_)) => {
                format!("🌐 {error}\n💡 Check base_url and that the server is running")
            }
            EngineError::Transport(_) => format!("❌ {error}"),
            EngineError::Unparseable | EngineError::MissingField { .. } => {
                format!("🧩 {error}\n💡 Rephrase the request or try a different model")
            }
            EngineError::Config(_) => format!("⚙️  {error}"),
            _ => error.to_string(),
        }
    }

    /// Get error severity level
    pub fn get_severity(error: &EngineError) -> ErrorSeverity {
        match error {
            EngineError::Cancelled => ErrorSeverity::Info,
            EngineError::Transport(TransportError::RateLimited { .. }) => ErrorSeverity::Warning,
            EngineError::Generation(_) => ErrorSeverity::Warning,
            EngineError::Config(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::Error,
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSeverity::Info => write!(f, "ℹ️  INFO"),
            ErrorSeverity::Warning => write!(f, "⚠️  WARNING"),
            ErrorSeverity::Error => write!(f, "❌ ERROR"),
            ErrorSeverity::Critical => write!(f, "🚨 CRITICAL"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_cancel_becomes_engine_cancel() {
        let err = EngineError::from(TransportError::Cancelled);
        assert!(err.is_cancelled());
        assert_eq!(err.to_string(), "Cancelled");
    }

    #[test]
    fn transport_status_is_exposed() {
        let err = EngineError::from(TransportError::Server { status: 502 });
        assert_eq!(err.status(), Some(502));
        assert_eq!(ErrorReporter::get_severity(&err), ErrorSeverity::Error);
    }

    #[test]
    fn user_errors_carry_a_hint_where_one_helps() {
        let unauthorized = ErrorReporter::format_user_error(&TransportError::Unauthorized.into());
        assert!(unauthorized.contains("api_key_env_var"));

        let config = EngineError::from(ConfigError::UnknownProfile { name: "fast".into() });
        let shown = ErrorReporter::format_user_error(&config);
        assert!(shown.contains("Configuration error: Unknown profile: fast"));
        assert_eq!(ErrorReporter::get_severity(&config), ErrorSeverity::Critical);

        assert_eq!(ErrorReporter::format_user_error(&EngineError::Cancelled), "Cancelled");
        assert_eq!(
            ErrorReporter::format_user_error(&EngineError::RetrievalFailed),
            "Could not retrieve the requested slide information."
        );
    }

    #[test]
    fn missing_field_names_action() {
        let err = EngineError::MissingField { action: Action::Ask, field: "a question" };
        assert_eq!(err.to_string(), "The model replied with \"ask\" but without a question.");
    }
}
