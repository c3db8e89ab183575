//! Provider JSON → domain events.
//!
//! Understands the OpenAI-compatible chat-completion chunk shape, including
//! the OpenRouter extensions (`provider`, inline `delta.images`, `usage.cost`)
//! and the images-API `data[]` array. Unknown shapes are ignored.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use serde::Deserialize;
use serde_json::Value;
use sluice_core::types::{DomainEvent, ImagePointer, StreamMeta, Usage};
use tracing::{debug, trace};

#[derive(Debug, Default)]
pub struct DomainEventNormalizer {
    meta_sent: bool,
    delta_seq: u64,
    next_image_index: usize,
    /// Index handed to each distinct image payload, keyed by content hash.
    image_indices: HashMap<u64, usize>,
    /// Open tool calls as (provider index, call id), in start order.
    open_calls: Vec<(usize, String)>,
    ended: bool,
}

impl DomainEventNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map one parsed chunk to zero or more domain events.
    pub fn normalize(&mut self, value: Value, emit: &mut impl FnMut(DomainEvent)) {
        let chunk: StreamChunk = match serde_json::from_value(value) {
            Ok(c) => c,
            Err(e) => {
                debug!(error = %e, "unrecognized chunk shape ignored");
                return;
            }
        };

        if !self.meta_sent && chunk.has_meta() {
            self.meta_sent = true;
            emit(DomainEvent::Meta(StreamMeta {
                id: chunk.id.clone(),
                provider: chunk.provider.clone(),
                model: chunk.model.clone(),
                created: chunk.created,
                fingerprint: chunk.system_fingerprint.clone(),
            }));
        }

        let choices = chunk.choices.unwrap_or_default();

        if let Some(content) = choices.first().and_then(|c| c.delta.content.as_deref()) {
            if !content.is_empty() {
                trace!(seq = self.delta_seq, len = content.len(), "text delta");
                emit(DomainEvent::Delta {
                    seq: self.delta_seq,
                    content: content.to_string(),
                });
                self.delta_seq += 1;
            }
        }

        for choice in &choices {
            for image in choice.delta.images.iter().flatten() {
                let url = image.image_url.as_ref().map(|u| u.url.as_str()).unwrap_or("");
                let pointer = self.image_pointer(image.index, url);
                emit(DomainEvent::Image(pointer));
            }
        }
        for datum in chunk.data.iter().flatten() {
            let pointer = match &datum.b64_json {
                Some(b64) => ImagePointer {
                    index: self.claim_image_index(None, b64),
                    b64: Some(b64.clone()),
                    ..Default::default()
                },
                None => self.image_pointer(None, datum.url.as_deref().unwrap_or("")),
            };
            emit(DomainEvent::Image(pointer));
        }

        if let Some(choice) = choices.first() {
            for call in choice.delta.tool_calls.iter().flatten() {
                self.tool_call_delta(call, emit);
            }
        }

        // Parsed on its own so a malformed usage object cannot cost the delta.
        if let Some(raw) = chunk.usage {
            match serde_json::from_value::<Usage>(raw) {
                Ok(usage) => emit(DomainEvent::Usage(usage)),
                Err(e) => debug!(error = %e, "unrecognized usage object ignored"),
            }
        }

        let finish_reason = choices
            .first()
            .and_then(|c| c.finish_reason.as_deref())
            .filter(|r| !r.is_empty());
        if let Some(reason) = finish_reason {
            self.complete_open_calls(emit);
            emit(DomainEvent::Done {
                finish_reason: reason.to_string(),
            });
        }
    }

    /// End of stream: close any tool call still open, then raise `StreamEnd`.
    /// Only the first call has an effect.
    pub fn finish(&mut self, emit: &mut impl FnMut(DomainEvent)) {
        if self.ended {
            return;
        }
        self.ended = true;
        self.complete_open_calls(emit);
        emit(DomainEvent::StreamEnd);
    }

    fn tool_call_delta(&mut self, call: &ToolCallDelta, emit: &mut impl FnMut(DomainEvent)) {
        let open = self
            .open_calls
            .iter()
            .find(|(index, _)| *index == call.index)
            .map(|(_, id)| id.clone());

        let call_id = match (open, &call.id) {
            (Some(open_id), Some(id)) if open_id != *id => {
                // Same slot, new id: the provider moved on to the next call.
                self.complete_call(call.index, emit);
                self.start_call(call.index, id.clone(), call, emit)
            }
            (Some(open_id), _) => open_id,
            (None, Some(id)) => self.start_call(call.index, id.clone(), call, emit),
            (None, None) => {
                let id = format!("call_{}", call.index);
                self.start_call(call.index, id, call, emit)
            }
        };

        if let Some(args) = call.function.as_ref().and_then(|f| f.arguments.as_deref()) {
            if !args.is_empty() {
                emit(DomainEvent::ToolCallArguments {
                    call_id,
                    fragment: args.to_string(),
                });
            }
        }
    }

    fn start_call(
        &mut self,
        index: usize,
        call_id: String,
        call: &ToolCallDelta,
        emit: &mut impl FnMut(DomainEvent),
    ) -> String {
        let name = call.function.as_ref().and_then(|f| f.name.clone());
        debug!(call_id = %call_id, index, name = ?name, "tool call started");
        self.open_calls.push((index, call_id.clone()));
        emit(DomainEvent::ToolCallStart {
            call_id: call_id.clone(),
            name,
        });
        call_id
    }

    fn complete_call(&mut self, index: usize, emit: &mut impl FnMut(DomainEvent)) {
        if let Some(pos) = self.open_calls.iter().position(|(i, _)| *i == index) {
            let (_, call_id) = self.open_calls.remove(pos);
            emit(DomainEvent::ToolCallComplete { call_id });
        }
    }

    fn complete_open_calls(&mut self, emit: &mut impl FnMut(DomainEvent)) {
        for (_, call_id) in self.open_calls.drain(..) {
            emit(DomainEvent::ToolCallComplete { call_id });
        }
    }

    /// Providers repeat images (e.g. on the terminal usage chunk), often
    /// without an index; a repeated payload gets the index it had before.
    fn claim_image_index(&mut self, explicit: Option<usize>, payload: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        payload.hash(&mut hasher);
        let key = hasher.finish();

        let index = match (explicit, self.image_indices.get(&key)) {
            (Some(index), _) => index,
            (None, Some(&seen)) => seen,
            (None, None) => self.next_image_index,
        };
        if !payload.is_empty() {
            self.image_indices.entry(key).or_insert(index);
        }
        self.next_image_index = self.next_image_index.max(index + 1);
        index
    }

    fn image_pointer(&mut self, explicit: Option<usize>, url: &str) -> ImagePointer {
        let payload = split_data_url(url).map_or(url, |(_, b64)| b64);
        let index = self.claim_image_index(explicit, payload);
        match split_data_url(url) {
            Some((mime, b64)) => ImagePointer {
                index,
                b64: Some(b64.to_string()),
                url: None,
                mime: Some(mime.to_string()),
            },
            None if url.is_empty() => ImagePointer {
                index,
                ..Default::default()
            },
            None => ImagePointer {
                index,
                url: Some(url.to_string()),
                ..Default::default()
            },
        }
    }
}

/// Split `data:<mime>;base64,<payload>` into its MIME type and payload.
pub fn split_data_url(url: &str) -> Option<(&str, &str)> {
    let rest = url.strip_prefix("data:")?;
    let (mime, payload) = rest.split_once(";base64,")?;
    Some((mime, payload))
}

// OpenAI-compatible streaming chunk (private, deserialization only)

#[derive(Deserialize)]
struct StreamChunk {
    id: Option<String>,
    provider: Option<String>,
    model: Option<String>,
    created: Option<i64>,
    system_fingerprint: Option<String>,
    choices: Option<Vec<StreamChoice>>,
    usage: Option<Value>,
    /// Images-API shape: `[{b64_json}|{url}]`.
    data: Option<Vec<ImageDatum>>,
}

impl StreamChunk {
    fn has_meta(&self) -> bool {
        self.id.is_some()
            || self.provider.is_some()
            || self.model.is_some()
            || self.created.is_some()
            || self.system_fingerprint.is_some()
    }
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    content: Option<String>,
    images: Option<Vec<DeltaImage>>,
    tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Deserialize)]
struct DeltaImage {
    index: Option<usize>,
    image_url: Option<ImageUrl>,
}

#[derive(Deserialize)]
struct ImageUrl {
    url: String,
}

#[derive(Deserialize)]
struct ImageDatum {
    b64_json: Option<String>,
    url: Option<String>,
}

#[derive(Deserialize)]
struct ToolCallDelta {
    #[serde(default)]
    index: usize,
    id: Option<String>,
    function: Option<FunctionDelta>,
}

#[derive(Deserialize)]
struct FunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(normalizer: &mut DomainEventNormalizer, value: Value) -> Vec<DomainEvent> {
        let mut out = Vec::new();
        normalizer.normalize(value, &mut |ev| out.push(ev));
        out
    }

    #[test]
    fn first_chunk_carries_meta_once() {
        let mut n = DomainEventNormalizer::new();
        let chunk = json!({
            "id": "gen-1",
            "provider": "OpenAI",
            "model": "openai/gpt-4o",
            "created": 1_700_000_000,
            "system_fingerprint": "fp_1",
            "choices": [{"index": 0, "delta": {"role": "assistant", "content": "Hi"}}]
        });
        let out = run(&mut n, chunk.clone());
        assert_eq!(
            out[0],
            DomainEvent::Meta(StreamMeta {
                id: Some("gen-1".into()),
                provider: Some("OpenAI".into()),
                model: Some("openai/gpt-4o".into()),
                created: Some(1_700_000_000),
                fingerprint: Some("fp_1".into()),
            })
        );
        assert_eq!(
            out[1],
            DomainEvent::Delta {
                seq: 0,
                content: "Hi".into()
            }
        );

        let out = run(&mut n, chunk);
        assert_eq!(
            out,
            vec![DomainEvent::Delta {
                seq: 1,
                content: "Hi".into()
            }]
        );
    }

    #[test]
    fn empty_and_null_content_emit_nothing() {
        let mut n = DomainEventNormalizer::new();
        assert!(run(&mut n, json!({"choices": [{"delta": {"content": ""}}]})).is_empty());
        assert!(run(&mut n, json!({"choices": [{"delta": {"content": null}}]})).is_empty());
        assert!(run(&mut n, json!({"choices": []})).is_empty());
    }

    #[test]
    fn usage_then_done() {
        let mut n = DomainEventNormalizer::new();
        let out = run(
            &mut n,
            json!({
                "choices": [{"delta": {}, "finish_reason": "stop"}],
                "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15, "cost": 0.002}
            }),
        );
        assert_eq!(
            out,
            vec![
                DomainEvent::Usage(Usage {
                    prompt_tokens: 10,
                    completion_tokens: 5,
                    total_tokens: 15,
                    cost: Some(0.002),
                }),
                DomainEvent::Done {
                    finish_reason: "stop".into()
                },
            ]
        );
    }

    #[test]
    fn inline_data_url_images_are_split() {
        let mut n = DomainEventNormalizer::new();
        let out = run(
            &mut n,
            json!({"choices": [{"delta": {"images": [
                {"type": "image_url", "image_url": {"url": "data:image/png;base64,iVBORw0KGgo="}},
                {"type": "image_url", "image_url": {"url": "https://cdn.example/cat.png"}}
            ]}}]}),
        );
        assert_eq!(
            out,
            vec![
                DomainEvent::Image(ImagePointer {
                    index: 0,
                    b64: Some("iVBORw0KGgo=".into()),
                    url: None,
                    mime: Some("image/png".into()),
                }),
                DomainEvent::Image(ImagePointer {
                    index: 1,
                    b64: None,
                    url: Some("https://cdn.example/cat.png".into()),
                    mime: None,
                }),
            ]
        );
    }

    #[test]
    fn images_api_data_array_is_normalized() {
        let mut n = DomainEventNormalizer::new();
        let out = run(
            &mut n,
            json!({"data": [{"b64_json": "QUJD"}, {"url": "https://x/y.png"}]}),
        );
        assert_eq!(
            out,
            vec![
                DomainEvent::Image(ImagePointer {
                    index: 0,
                    b64: Some("QUJD".into()),
                    ..Default::default()
                }),
                DomainEvent::Image(ImagePointer {
                    index: 1,
                    url: Some("https://x/y.png".into()),
                    ..Default::default()
                }),
            ]
        );
    }

    #[test]
    fn repeated_images_without_index_keep_their_index() {
        let mut n = DomainEventNormalizer::new();
        let image = |url: &str| {
            json!({"choices": [{"delta": {"images": [
                {"type": "image_url", "image_url": {"url": url}}
            ]}}]})
        };
        let indices: Vec<usize> = [
            image("data:image/png;base64,AAAA"),
            image("data:image/png;base64,AAAA"),
            image("data:image/png;base64,BBBB"),
        ]
        .into_iter()
        .flat_map(|chunk| run(&mut n, chunk))
        .filter_map(|ev| match ev {
            DomainEvent::Image(p) => Some(p.index),
            _ => None,
        })
        .collect();
        assert_eq!(indices, vec![0, 0, 1]);

        let out = run(&mut n, json!({"data": [{"b64_json": "AAAA"}, {"b64_json": "CCCC"}]}));
        let indices: Vec<usize> = out
            .iter()
            .filter_map(|ev| match ev {
                DomainEvent::Image(p) => Some(p.index),
                _ => None,
            })
            .collect();
        // Same payload as the first data URL, then a new one.
        assert_eq!(indices, vec![0, 2]);
    }

    #[test]
    fn null_usage_counter_keeps_delta_and_finish() {
        let mut n = DomainEventNormalizer::new();
        let out = run(
            &mut n,
            json!({
                "choices": [{"delta": {"content": "bye"}, "finish_reason": "stop"}],
                "usage": {"prompt_tokens": 4, "completion_tokens": null, "total_tokens": 4}
            }),
        );
        assert_eq!(
            out,
            vec![
                DomainEvent::Delta {
                    seq: 0,
                    content: "bye".into()
                },
                DomainEvent::Usage(Usage {
                    prompt_tokens: 4,
                    completion_tokens: 0,
                    total_tokens: 4,
                    cost: None,
                }),
                DomainEvent::Done {
                    finish_reason: "stop".into()
                },
            ]
        );
    }

    #[test]
    fn malformed_usage_is_skipped_alone() {
        let mut n = DomainEventNormalizer::new();
        let out = run(
            &mut n,
            json!({
                "choices": [{"delta": {"content": "ok"}, "finish_reason": "stop"}],
                "usage": {"prompt_tokens": "many"}
            }),
        );
        let names: Vec<&str> = out.iter().map(DomainEvent::name).collect();
        assert_eq!(names, vec!["delta", "done"]);
    }

    #[test]
    fn tool_call_lifecycle() {
        let mut n = DomainEventNormalizer::new();
        let mut out = run(
            &mut n,
            json!({"choices": [{"delta": {"tool_calls": [
                {"index": 0, "id": "call_a", "type": "function",
                 "function": {"name": "get_weather", "arguments": ""}}
            ]}}]}),
        );
        out.extend(run(
            &mut n,
            json!({"choices": [{"delta": {"tool_calls": [
                {"index": 0, "function": {"arguments": "{\"city\":"}}
            ]}}]}),
        ));
        out.extend(run(
            &mut n,
            json!({"choices": [{"delta": {}, "finish_reason": "tool_calls"}]}),
        ));

        assert_eq!(
            out,
            vec![
                DomainEvent::ToolCallStart {
                    call_id: "call_a".into(),
                    name: Some("get_weather".into()),
                },
                DomainEvent::ToolCallArguments {
                    call_id: "call_a".into(),
                    fragment: "{\"city\":".into(),
                },
                DomainEvent::ToolCallComplete {
                    call_id: "call_a".into()
                },
                DomainEvent::Done {
                    finish_reason: "tool_calls".into()
                },
            ]
        );
    }

    #[test]
    fn new_id_in_same_slot_completes_previous_call() {
        let mut n = DomainEventNormalizer::new();
        run(
            &mut n,
            json!({"choices": [{"delta": {"tool_calls": [{"index": 0, "id": "a"}]}}]}),
        );
        let out = run(
            &mut n,
            json!({"choices": [{"delta": {"tool_calls": [{"index": 0, "id": "b"}]}}]}),
        );
        assert_eq!(
            out,
            vec![
                DomainEvent::ToolCallComplete { call_id: "a".into() },
                DomainEvent::ToolCallStart {
                    call_id: "b".into(),
                    name: None
                },
            ]
        );
    }

    #[test]
    fn missing_id_gets_synthetic_one() {
        let mut n = DomainEventNormalizer::new();
        let out = run(
            &mut n,
            json!({"choices": [{"delta": {"tool_calls": [
                {"index": 2, "function": {"name": "f", "arguments": "{}"}}
            ]}}]}),
        );
        assert_eq!(
            out[0],
            DomainEvent::ToolCallStart {
                call_id: "call_2".into(),
                name: Some("f".into())
            }
        );
    }

    #[test]
    fn finish_closes_open_calls_then_ends_once() {
        let mut n = DomainEventNormalizer::new();
        run(
            &mut n,
            json!({"choices": [{"delta": {"tool_calls": [{"index": 0, "id": "a"}]}}]}),
        );
        let mut out = Vec::new();
        n.finish(&mut |ev| out.push(ev));
        n.finish(&mut |ev| out.push(ev));
        assert_eq!(
            out,
            vec![
                DomainEvent::ToolCallComplete { call_id: "a".into() },
                DomainEvent::StreamEnd,
            ]
        );
    }

    #[test]
    fn unrecognized_shapes_are_ignored() {
        let mut n = DomainEventNormalizer::new();
        assert!(run(&mut n, json!([1, 2, 3])).is_empty());
        assert!(run(&mut n, json!({"choices": "nope"})).is_empty());
        assert!(run(&mut n, json!({"error": {"message": "overloaded"}})).is_empty());
    }

    #[test]
    fn data_url_split() {
        assert_eq!(
            split_data_url("data:image/webp;base64,AAAA"),
            Some(("image/webp", "AAAA"))
        );
        assert_eq!(split_data_url("data:text/plain,hello"), None);
        assert_eq!(split_data_url("https://x"), None);
    }
}
