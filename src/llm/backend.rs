use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::llm::media::ImageData;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modality {
    Text,
    Image,
}

impl Modality {
    pub fn as_str(self) -> &'static str {
        match self {
            Modality::Text => "TEXT",
            Modality::Image => "IMAGE",
        }
    }
}

/// Text-to-image request (face synthesis).
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRequest {
    pub model: String,
    pub prompt: String,
    pub image_count: u32,
    pub output_mime_type: String,
    pub aspect_ratio: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageResponse {
    pub images: Vec<ImageData>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestPart {
    Text(String),
    Image(ImageData),
}

/// Multimodal content request (compositing, suggestions, sanitization).
#[derive(Debug, Clone, PartialEq)]
pub struct ContentRequest {
    pub model: String,
    pub parts: Vec<RequestPart>,
    pub system_instruction: Option<String>,
    pub response_schema: Option<Value>,
    pub response_modalities: Vec<Modality>,
}

impl ContentRequest {
    /// Text-in, JSON-out request constrained by `schema`.
    pub fn structured(model: &str, prompt: String, schema: Value) -> Self {
        Self {
            model: model.to_string(),
            parts: vec![RequestPart::Text(prompt)],
            system_instruction: None,
            response_schema: Some(schema),
            response_modalities: Vec::new(),
        }
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponsePart {
    pub text: Option<String>,
    pub image: Option<ImageData>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentResponse {
    pub parts: Vec<ResponsePart>,
}

impl ContentResponse {
    pub fn first_image(&self) -> Option<&ImageData> {
        self.parts.iter().find_map(|part| part.image.as_ref())
    }

    pub fn first_text(&self) -> Option<&str> {
        self.parts
            .iter()
            .filter_map(|part| part.text.as_deref())
            .find(|text| !text.trim().is_empty())
    }

    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| part.text.as_deref())
            .collect::<Vec<_>>()
            .join("")
    }
}

/// The external generative service. One call is one request/response
/// exchange; implementations do not retry.
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    async fn generate_images(&self, request: ImageRequest) -> Result<ImageResponse>;

    async fn generate_content(&self, request: ContentRequest) -> Result<ContentResponse>;
}

#[cfg(test)]
pub mod scripted {
    //! In-memory backend that replays queued responses and records requests.

    use std::collections::VecDeque;
    use std::sync::Arc;

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tokio::sync::Notify;

    use super::*;

    #[derive(Default)]
    struct Queues {
        images: VecDeque<Result<ImageResponse>>,
        contents: VecDeque<Result<ContentResponse>>,
        image_requests: Vec<ImageRequest>,
        content_requests: Vec<ContentRequest>,
    }

    #[derive(Clone, Default)]
    pub struct ScriptedBackend {
        queues: Arc<Mutex<Queues>>,
        gate: Option<Arc<Notify>>,
    }

    impl ScriptedBackend {
        pub fn new() -> Self {
            Self::default()
        }

        /// Every call waits for `release()` before answering.
        pub fn gated() -> (Self, Arc<Notify>) {
            let gate = Arc::new(Notify::new());
            let backend = Self {
                queues: Arc::default(),
                gate: Some(gate.clone()),
            };
            (backend, gate)
        }

        pub fn push_images(&self, response: Result<ImageResponse>) -> &Self {
            self.queues.lock().images.push_back(response);
            self
        }

        pub fn push_content(&self, response: Result<ContentResponse>) -> &Self {
            self.queues.lock().contents.push_back(response);
            self
        }

        pub fn push_text(&self, text: &str) -> &Self {
            self.push_content(Ok(ContentResponse {
                parts: vec![ResponsePart {
                    text: Some(text.to_string()),
                    image: None,
                }],
            }))
        }

        pub fn push_image_part(&self, image: ImageData) -> &Self {
            self.push_content(Ok(ContentResponse {
                parts: vec![ResponsePart {
                    text: None,
                    image: Some(image),
                }],
            }))
        }

        pub fn image_requests(&self) -> Vec<ImageRequest> {
            self.queues.lock().image_requests.clone()
        }

        pub fn content_requests(&self) -> Vec<ContentRequest> {
            self.queues.lock().content_requests.clone()
        }

        pub fn call_count(&self) -> usize {
            let queues = self.queues.lock();
            queues.image_requests.len() + queues.content_requests.len()
        }

        async fn wait_gate(&self) {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
        }
    }

    #[async_trait]
    impl GenerativeBackend for ScriptedBackend {
        async fn generate_images(&self, request: ImageRequest) -> Result<ImageResponse> {
            let next = {
                let mut queues = self.queues.lock();
                queues.image_requests.push(request);
                queues.images.pop_front()
            };
            self.wait_gate().await;
            next.unwrap_or_else(|| Err(anyhow!("no scripted image response")))
        }

        async fn generate_content(&self, request: ContentRequest) -> Result<ContentResponse> {
            let next = {
                let mut queues = self.queues.lock();
                queues.content_requests.push(request);
                queues.contents.pop_front()
            };
            self.wait_gate().await;
            next.unwrap_or_else(|| Err(anyhow!("no scripted content response")))
        }
    }
}
