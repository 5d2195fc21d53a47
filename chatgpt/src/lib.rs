//! Backend plumbing: request shaping, HTTP transport and response decoding for
//! the OpenAI-style, local and Gemini backends.

pub mod backend;
pub mod client;
pub mod decode;
pub mod error;
pub mod finish;
pub mod request;

pub use backend::BackendKind;
pub use client::{ByteStream, HttpTransport, Transport};
pub use decode::{decode_chunk, decode_final, decode_full};
pub use error::TransportError;
pub use finish::{finish_reason_message, GenerationContext};
pub use request::{build_request, skeleton_context, BackendSettings, HttpRequest, Prompt};
