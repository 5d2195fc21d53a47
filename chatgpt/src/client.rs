use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use slide_common::{truncate_middle, CancelHandle};

use crate::error::TransportError;
use crate::request::HttpRequest;

/// Raw response text as it arrives. Each item extends the buffer; the stream
/// ends when the sender is dropped.
pub type ByteStream = mpsc::Receiver<Result<String, TransportError>>;

/// Sends a prepared request and delivers the response body incrementally.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, request: HttpRequest, cancel: CancelHandle) -> Result<ByteStream, TransportError>;
}

/// reqwest-backed transport used for every backend.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open(&self, request: HttpRequest, cancel: CancelHandle) -> Result<ByteStream, TransportError> {
        debug!(url = %request.url, streaming = request.streaming, "sending model request");

        let mut req = self.client.post(&request.url);
        for (name, value) in &request.headers {
            req = req.header(name.as_str(), value.as_str());
        }
        if let Ok(project) = std::env::var("OPENAI_PROJECT") {
            if !project.is_empty() && request.headers.iter().any(|(n, _)| n == "Authorization") {
                req = req.header("OpenAI-Project", project);
            }
        }

        let send = req.json(&request.body).send();
        let resp = tokio::select! {
            _ = cancel.cancelled() => return Err(TransportError::Cancelled),
            resp = send => resp?,
        };

        let status = resp.status();
        if !status.is_success() {
            let retry_after = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let text = resp.text().await.unwrap_or_default();
            warn!("model http {}: {}", status, truncate_middle(&text, 500));
            return Err(TransportError::from_status(status.as_u16(), retry_after.as_deref(), &text));
        }

        let stream = resp.bytes_stream();
        let (tx, rx) = mpsc::channel::<Result<String, TransportError>>(64);
        tokio::spawn(async move {
            let mut stream = Box::pin(stream);
            let mut pending: Vec<u8> = Vec::new();
            loop {
                let chunk = tokio::select! {
                    _ = cancel.cancelled() => {
                        let _ = tx.send(Err(TransportError::Cancelled)).await;
                        return;
                    }
                    chunk = stream.next() => chunk,
                };
                match chunk {
                    Some(Ok(bytes)) => {
                        debug!("received chunk ({} bytes)", bytes.len());
                        pending.extend_from_slice(&bytes);
                        let text = take_utf8_prefix(&mut pending);
                        if !text.is_empty() && tx.send(Ok(text)).await.is_err() {
                            return;
                        }
                    }
                    Some(Err(err)) => {
                        warn!("stream chunk error: {err}");
                        let _ = tx.send(Err(TransportError::from(err))).await;
                        return;
                    }
                    None => break,
                }
            }
            if !pending.is_empty() {
                let _ = tx.send(Ok(String::from_utf8_lossy(&pending).into_owned())).await;
            }
            debug!("stream finished");
        });
        Ok(rx)
    }
}

/// Drains the longest valid UTF-8 prefix from `pending`, keeping a trailing
/// incomplete code point for the next chunk.
fn take_utf8_prefix(pending: &mut Vec<u8>) -> String {
    match std::str::from_utf8(pending) {
        Ok(text) => {
            let text = text.to_string();
            pending.clear();
            text
        }
        Err(err) if err.error_len().is_none() => {
            let valid = err.valid_up_to();
            let rest = pending.split_off(valid);
            let text = String::from_utf8_lossy(pending).into_owned();
            *pending = rest;
            text
        }
        Err(_) => {
            let text = String::from_utf8_lossy(pending).into_owned();
            pending.clear();
            text
        }
    }
}
