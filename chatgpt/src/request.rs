//! Shapes an outgoing request for each backend. The engine never looks inside
//! the body; it only hands the result to a [`crate::Transport`].

use serde_json::{json, Value};

use slide_protocol::{ChatMessage, Role, Slide};

use crate::backend::BackendKind;

/// Resolved backend settings for one request.
#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub kind: BackendKind,
    pub model: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub max_output_tokens: u32,
    pub temperature: Option<f32>,
}

impl BackendSettings {
    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.kind.default_base_url())
            .trim_end_matches('/')
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Value,
    /// Whether the body arrives incrementally (chunk decoder) or all at once.
    pub streaming: bool,
}

/// Everything a request carries besides the backend settings.
#[derive(Debug, Clone, Copy)]
pub struct Prompt<'a> {
    pub system_prompt: &'a str,
    /// Full conversation including the current user turn, oldest first.
    pub messages: &'a [ChatMessage],
    pub deck_context: Option<&'a str>,
}

pub fn build_request(settings: &BackendSettings, prompt: Prompt<'_>) -> HttpRequest {
    let system = match prompt.deck_context {
        Some(context) if !context.is_empty() => format!("{}\n\n{context}", prompt.system_prompt),
        _ => prompt.system_prompt.to_string(),
    };
    let messages = prompt
        .messages
        .iter()
        .filter(|m| m.role != Role::System && !(m.content.is_empty() && m.images.is_empty()));

    match settings.kind {
        BackendKind::OpenAi => openai_request(settings, &system, messages),
        BackendKind::Local => local_request(settings, &system, messages),
        BackendKind::Gemini => gemini_request(settings, &system, messages),
    }
}

/// Token-saving view of a deck: slide number and title only.
pub fn skeleton_context(deck: &[Slide]) -> String {
    if deck.is_empty() {
        return "The presentation is currently empty.".to_string();
    }
    let mut out = String::from(
        "Current presentation outline (slide number: title). Use the \"info\" action to request full slide content.\n",
    );
    for slide in deck {
        out.push_str(&format!("{}: {}\n", slide.slide_number, slide.title));
    }
    out
}

fn openai_request<'a>(
    settings: &BackendSettings,
    system: &str,
    messages: impl Iterator<Item = &'a ChatMessage>,
) -> HttpRequest {
    let mut wire = vec![json!({"role": "system", "content": system})];
    for message in messages {
        let content = if message.images.is_empty() {
            Value::String(message.content.clone())
        } else {
            let mut parts = vec![json!({"type": "text", "text": message.content})];
            for image in &message.images {
                parts.push(json!({
                    "type": "image_url",
                    "image_url": {"url": as_data_url(image)},
                }));
            }
            Value::Array(parts)
        };
        wire.push(json!({"role": role_name(message.role), "content": content}));
    }

    let mut body = json!({
        "model": settings.model,
        "messages": wire,
        "stream": true,
        "max_tokens": settings.max_output_tokens,
    });
    if let Some(temperature) = settings.temperature {
        body["temperature"] = json!(temperature);
    }

    let mut headers = vec![("Content-Type".to_string(), "application/json".to_string())];
    if let Some(key) = settings.api_key.as_deref().filter(|k| !k.is_empty()) {
        headers.push(("Authorization".to_string(), format!("Bearer {key}")));
    }
    HttpRequest {
        url: format!("{}/chat/completions", settings.base_url()),
        headers,
        body,
        streaming: true,
    }
}

fn local_request<'a>(
    settings: &BackendSettings,
    system: &str,
    messages: impl Iterator<Item = &'a ChatMessage>,
) -> HttpRequest {
    let mut wire = vec![json!({"role": "system", "content": system})];
    for message in messages {
        let mut entry = json!({"role": role_name(message.role), "content": message.content});
        if !message.images.is_empty() {
            let images: Vec<&str> = message.images.iter().map(|i| split_data_url(i).1).collect();
            entry["images"] = json!(images);
        }
        wire.push(entry);
    }

    let mut options = json!({"num_predict": settings.max_output_tokens});
    if let Some(temperature) = settings.temperature {
        options["temperature"] = json!(temperature);
    }
    HttpRequest {
        url: format!("{}/api/chat", settings.base_url()),
        headers: vec![("Content-Type".to_string(), "application/json".to_string())],
        body: json!({
            "model": settings.model,
            "messages": wire,
            "stream": true,
            "options": options,
        }),
        streaming: true,
    }
}

fn gemini_request<'a>(
    settings: &BackendSettings,
    system: &str,
    messages: impl Iterator<Item = &'a ChatMessage>,
) -> HttpRequest {
    let mut contents = Vec::new();
    for message in messages {
        let mut parts = Vec::new();
        if !message.content.is_empty() {
            parts.push(json!({"text": message.content}));
        }
        for image in &message.images {
            let (mime_type, data) = split_data_url(image);
            parts.push(json!({"inline_data": {"mime_type": mime_type, "data": data}}));
        }
        let role = match message.role {
            Role::Assistant => "model",
            Role::User | Role::System => "user",
        };
        contents.push(json!({"role": role, "parts": parts}));
    }

    let mut generation_config = json!({"maxOutputTokens": settings.max_output_tokens});
    if let Some(temperature) = settings.temperature {
        generation_config["temperature"] = json!(temperature);
    }

    let mut headers = vec![("Content-Type".to_string(), "application/json".to_string())];
    if let Some(key) = settings.api_key.as_deref().filter(|k| !k.is_empty()) {
        headers.push(("x-goog-api-key".to_string(), key.to_string()));
    }
    HttpRequest {
        url: format!("{}/models/{}:generateContent", settings.base_url(), settings.model),
        headers,
        body: json!({
            "systemInstruction": {"parts": [{"text": system}]},
            "contents": contents,
            "generationConfig": generation_config,
        }),
        streaming: false,
    }
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

fn as_data_url(image: &str) -> String {
    if image.starts_with("data:") {
        image.to_string()
    } else {
        format!("data:image/jpeg;base64,{image}")
    }
}

/// Returns `(mime_type, base64_payload)`; bare payloads are assumed to be JPEG.
fn split_data_url(image: &str) -> (&str, &str) {
    image
        .strip_prefix("data:")
        .and_then(|rest| rest.split_once(";base64,"))
        .unwrap_or(("image/jpeg", image))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(kind: BackendKind) -> BackendSettings {
        BackendSettings {
            kind,
            model: "test-model".into(),
            base_url: None,
            api_key: Some("sk-test".into()),
            max_output_tokens: 4096,
            temperature: None,
        }
    }

    fn conversation() -> Vec<ChatMessage> {
        vec![
            ChatMessage::user("make a deck"),
            ChatMessage::assistant("{\"a\":\"ask\"}"),
            ChatMessage::user("about rust").with_images(vec!["data:image/png;base64,AAAA".into()]),
        ]
    }

    #[test]
    fn openai_request_streams_with_bearer_auth() {
        let messages = conversation();
        let req = build_request(
            &settings(BackendKind::OpenAi),
            Prompt { system_prompt: "sys", messages: &messages, deck_context: Some("outline") },
        );
        assert_eq!(req.url, "https://api.openai.com/v1/chat/completions");
        assert!(req.streaming);
        assert!(req.headers.contains(&("Authorization".into(), "Bearer sk-test".into())));
        assert_eq!(req.body["messages"][0]["content"], "sys\n\noutline");
        assert_eq!(req.body["messages"][3]["content"][1]["image_url"]["url"], "data:image/png;base64,AAAA");
    }

    #[test]
    fn local_request_uses_raw_image_payloads() {
        let messages = conversation();
        let req = build_request(
            &settings(BackendKind::Local),
            Prompt { system_prompt: "sys", messages: &messages, deck_context: None },
        );
        assert_eq!(req.url, "http://localhost:11434/api/chat");
        assert_eq!(req.body["messages"][3]["images"][0], "AAAA");
        assert_eq!(req.body["options"]["num_predict"], 4096);
    }

    #[test]
    fn gemini_request_is_not_streamed() {
        let messages = conversation();
        let req = build_request(
            &settings(BackendKind::Gemini),
            Prompt { system_prompt: "sys", messages: &messages, deck_context: None },
        );
        assert!(!req.streaming);
        assert_eq!(
            req.url,
            "https://generativelanguage.googleapis.com/v1beta/models/test-model:generateContent"
        );
        assert_eq!(req.body["contents"][1]["role"], "model");
        assert_eq!(req.body["contents"][2]["parts"][1]["inline_data"]["mime_type"], "image/png");
    }

    #[test]
    fn empty_user_turns_are_not_sent() {
        let messages = vec![ChatMessage::user("hi"), ChatMessage::user("")];
        let req = build_request(
            &settings(BackendKind::OpenAi),
            Prompt { system_prompt: "sys", messages: &messages, deck_context: None },
        );
        assert_eq!(req.body["messages"].as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn skeleton_lists_numbers_and_titles() {
        let deck = vec![
            slide_protocol::SlideDraft { title: Some("Intro".into()), ..Default::default() }.into_slide(1),
            slide_protocol::SlideDraft { title: Some("Why".into()), ..Default::default() }.into_slide(2),
        ];
        let outline = skeleton_context(&deck);
        assert!(outline.contains("1: Intro\n2: Why\n"));
    }
}
