// Copyright 2026 The Causeway Project
// SPDX-License-Identifier: Apache-2.0

// Buffered (non-streaming) request/response translation.
//
// Shares the block and signature vocabulary with the streaming path.
// Failure policy: the request side falls back to forwarding the
// original request unmodified; the response side returns a minimal
// well-formed error message. Neither side ever raises.

mod directives;

pub use directives::{DirectiveConfig, Effort};

use crate::bridge::signature::sign_block;
use crate::events::map_finish_reason;
use serde_json::{json, Map, Value};

/// Request fields copied through to the upstream verbatim.
const PASSTHROUGH_FIELDS: [&str; 5] = ["model", "max_tokens", "stream", "temperature", "top_p"];

/// Translate a downstream-style request into the upstream shape.
///
/// Scans plain-string user content for inline directives (last match
/// wins), strips the tags, filters structured content to text, and
/// injects reasoning parameters from the extracted config. On any
/// failure the original request is forwarded unmodified with
/// thinking recorded as disabled.
pub fn transform_request(req: &Value, default_thinking: bool) -> (Value, DirectiveConfig) {
    match try_transform_request(req, default_thinking) {
        Some(result) => result,
        None => {
            tracing::warn!("request translation failed, forwarding unmodified");
            (req.clone(), DirectiveConfig::disabled())
        }
    }
}

fn try_transform_request(
    req: &Value,
    default_thinking: bool,
) -> Option<(Value, DirectiveConfig)> {
    let obj = req.as_object()?;
    let messages = obj.get("messages")?.as_array()?;

    let mut directive: Option<DirectiveConfig> = None;
    let mut translated_messages = Vec::with_capacity(messages.len());

    for message in messages {
        let role = message.get("role").and_then(Value::as_str).unwrap_or("");
        let mut out = message.as_object()?.clone();

        match message.get("content") {
            // Only plain string content is scanned for directives, and
            // only in user messages.
            Some(Value::String(text)) if role == "user" => {
                let (found, stripped) = directives::scan(text);
                if found.is_some() {
                    directive = found;
                }
                out.insert("content".to_string(), Value::String(stripped));
            }
            Some(Value::Array(parts)) => {
                out.insert("content".to_string(), collapse_content(parts));
            }
            _ => {}
        }
        translated_messages.push(Value::Object(out));
    }

    let config = DirectiveConfig {
        thinking: directive.map(|d| d.thinking).unwrap_or(default_thinking),
        effort: directive.and_then(|d| d.effort),
    };

    let mut translated = Map::new();
    for field in PASSTHROUGH_FIELDS {
        if let Some(value) = obj.get(field) {
            translated.insert(field.to_string(), value.clone());
        }
    }
    translated.insert("messages".to_string(), Value::Array(translated_messages));
    if config.thinking {
        translated.insert(
            "reasoning_effort".to_string(),
            Value::String(config.effort.unwrap_or(Effort::Medium).as_str().to_string()),
        );
    }

    Some((Value::Object(translated), config))
}

/// Filter structured content to its text segments.
///
/// A single remaining segment collapses to a bare string; an empty
/// result becomes an empty string, never an empty array.
fn collapse_content(parts: &[Value]) -> Value {
    let mut texts: Vec<&str> = Vec::new();
    for part in parts {
        if part.get("type").and_then(Value::as_str) == Some("text") {
            if let Some(text) = part.get("text").and_then(Value::as_str) {
                texts.push(text);
            }
        }
    }
    match texts.as_slice() {
        [] => Value::String(String::new()),
        [only] => Value::String((*only).to_string()),
        many => Value::Array(
            many.iter()
                .map(|t| json!({"type": "text", "text": t}))
                .collect(),
        ),
    }
}

/// Translate a buffered upstream response into the downstream shape.
///
/// Reasoning text becomes a leading signed thinking block, answer text
/// a text block, and tool invocations tool_use blocks. Any failure —
/// including one unparseable tool-call argument string — produces a
/// minimal well-formed single-text-block error response instead.
pub fn transform_response(resp: &Value, config: &DirectiveConfig, model: &str) -> Value {
    match try_transform_response(resp, config, model) {
        Ok(translated) => translated,
        Err(reason) => {
            tracing::warn!(reason, "response translation failed, returning error message");
            error_response(model, &reason)
        }
    }
}

fn try_transform_response(
    resp: &Value,
    config: &DirectiveConfig,
    model: &str,
) -> Result<Value, String> {
    let choice = resp
        .get("choices")
        .and_then(|c| c.get(0))
        .ok_or_else(|| "upstream response has no choices".to_string())?;
    let message = choice
        .get("message")
        .ok_or_else(|| "upstream choice has no message".to_string())?;

    let mut content = Vec::new();

    if config.thinking {
        if let Some(reasoning) = message.get("reasoning_content").and_then(Value::as_str) {
            if !reasoning.is_empty() {
                let sig = sign_block(reasoning);
                content.push(json!({
                    "type": "thinking",
                    "thinking": reasoning,
                    "signature": {
                        "type": "provenance",
                        "hash": sig.hash,
                        "length": sig.length,
                        "timestamp": sig.timestamp
                    }
                }));
            }
        }
    }

    if let Some(text) = message.get("content").and_then(Value::as_str) {
        if !text.is_empty() {
            content.push(json!({"type": "text", "text": text}));
        }
    }

    if let Some(calls) = message.get("tool_calls").and_then(Value::as_array) {
        for call in calls {
            let id = call.get("id").and_then(Value::as_str).unwrap_or("");
            let function = call.get("function");
            let name = function
                .and_then(|f| f.get("name"))
                .and_then(Value::as_str)
                .unwrap_or("");
            let arguments = function
                .and_then(|f| f.get("arguments"))
                .and_then(Value::as_str)
                .unwrap_or("{}");

            let input: Value = if arguments.is_empty() {
                json!({})
            } else {
                serde_json::from_str(arguments).map_err(|err| {
                    format!("tool call '{name}' has unparseable arguments: {err}")
                })?
            };
            content.push(json!({
                "type": "tool_use",
                "id": id,
                "name": name,
                "input": input
            }));
        }
    }

    let finish_reason = choice.get("finish_reason").and_then(Value::as_str);
    let usage = read_usage(resp.get("usage"));
    let id = resp
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("msg_{}", uuid::Uuid::new_v4().simple()));
    let model = resp.get("model").and_then(Value::as_str).unwrap_or(model);

    Ok(json!({
        "id": id,
        "type": "message",
        "role": "assistant",
        "content": content,
        "model": model,
        "stop_reason": map_finish_reason(finish_reason),
        "usage": usage
    }))
}

/// Usage passthrough, defaulting to zero counts when absent.
fn read_usage(usage: Option<&Value>) -> Value {
    let read = |keys: [&str; 2]| {
        usage
            .and_then(|u| keys.iter().find_map(|k| u.get(k).and_then(Value::as_u64)))
            .unwrap_or(0)
    };
    json!({
        "input_tokens": read(["prompt_tokens", "input_tokens"]),
        "output_tokens": read(["completion_tokens", "output_tokens"])
    })
}

/// The minimal well-formed response used when translation fails.
fn error_response(model: &str, reason: &str) -> Value {
    json!({
        "id": format!("msg_{}", uuid::Uuid::new_v4().simple()),
        "type": "message",
        "role": "assistant",
        "content": [{"type": "text", "text": format!("Upstream response could not be translated: {reason}")}],
        "model": model,
        "stop_reason": "end_turn",
        "usage": {"input_tokens": 0, "output_tokens": 0}
    })
}
