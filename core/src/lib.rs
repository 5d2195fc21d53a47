//! Streaming delta engine: splits reasoning from visible text, parses the
//! partially received model payload, reconciles it with the deck and drives
//! the per-project generation queue.

pub mod config;
pub mod conversation_history;
pub mod deck;
pub mod error;
mod generation;
pub mod normalize;
pub mod parser;
pub mod queue;
pub mod reconciler;
pub mod repair;
pub mod session;
pub mod stream;
pub mod thinking;

pub use config::{Config, ConfigError};
pub use conversation_history::ConversationHistory;
pub use error::{EngineError, ErrorReporter};
pub use parser::{parse_response, parse_with_format, WireFormat};
pub use queue::GenerationQueue;
pub use reconciler::{finalize_delta, reconcile, CompletedTurn, Intent, Reconciliation};
pub use repair::parse_partial_slides;
pub use session::{InMemorySessionStore, Session, SessionStore};
pub use stream::StreamAccumulator;
pub use thinking::split_thinking;
