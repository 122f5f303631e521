use std::sync::Arc;

use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::llm::backend::{ContentRequest, GenerativeBackend};
use crate::llm::gateway::strip_json_fence;

pub const SANITIZE_SYSTEM_INSTRUCTION: &str = "You edit scene descriptions for a photo compositing tool that places an existing person into a new scene. \
Remove every description of the person's face or identity: facial features, facial hair, eye color, skin tone, ethnicity, age, makeup, hair color and hairstyle. \
Keep everything else unchanged: the setting, activity, clothing, props, pets, food, pose, lighting, camera and mood. \
Do not add new content. If nothing needs to be removed, return the text exactly as given. \
Respond with JSON containing the edited text in the `cleanedPrompt` field.";

static SANITIZE_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "type": "OBJECT",
        "properties": {
            "cleanedPrompt": {
                "type": "STRING",
                "description": "The scene description with all facial and identity descriptors removed."
            }
        },
        "required": ["cleanedPrompt"]
    })
});

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SanitizedPayload {
    cleaned_prompt: Option<String>,
}

/// Strips face and identity language from scene text before compositing,
/// so the scene prompt cannot override the supplied face.
#[derive(Clone)]
pub struct SuggestionSanitizer {
    backend: Arc<dyn GenerativeBackend>,
    model: String,
}

impl SuggestionSanitizer {
    pub fn new(backend: Arc<dyn GenerativeBackend>, model: impl Into<String>) -> Self {
        Self {
            backend,
            model: model.into(),
        }
    }

    /// Best effort: any failure yields the original prompt untouched.
    pub async fn sanitize(&self, scene_prompt: &str) -> String {
        let request = ContentRequest::structured(
            &self.model,
            scene_prompt.to_string(),
            SANITIZE_SCHEMA.clone(),
        )
        .with_system_instruction(SANITIZE_SYSTEM_INSTRUCTION);

        let response = match self.backend.generate_content(request).await {
            Ok(response) => response,
            Err(err) => {
                warn!("Scene prompt sanitization failed, using original text: {}", err);
                return scene_prompt.to_string();
            }
        };

        let text = response.text();
        let payload = match serde_json::from_str::<SanitizedPayload>(strip_json_fence(&text)) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(
                    "Scene prompt sanitization returned malformed JSON, using original text: {}",
                    err
                );
                return scene_prompt.to_string();
            }
        };

        match payload.cleaned_prompt.map(|value| value.trim().to_string()) {
            Some(cleaned) if !cleaned.is_empty() => {
                if cleaned != scene_prompt.trim() {
                    debug!("Sanitized scene prompt: {:?} -> {:?}", scene_prompt, cleaned);
                }
                cleaned
            }
            _ => {
                warn!("Scene prompt sanitization returned no text, using original text");
                scene_prompt.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::backend::scripted::ScriptedBackend;
    use anyhow::anyhow;

    const ORIGINAL: &str = "a red-haired woman with freckles reading in a cafe";

    fn sanitizer(backend: &ScriptedBackend) -> SuggestionSanitizer {
        SuggestionSanitizer::new(Arc::new(backend.clone()), "text-model")
    }

    #[tokio::test]
    async fn returns_cleaned_prompt() {
        let backend = ScriptedBackend::new();
        backend.push_text(r#"{"cleanedPrompt":" a person reading in a cafe "}"#);

        let cleaned = sanitizer(&backend).sanitize(ORIGINAL).await;
        assert_eq!(cleaned, "a person reading in a cafe");

        let request = &backend.content_requests()[0];
        assert_eq!(
            request.system_instruction.as_deref(),
            Some(SANITIZE_SYSTEM_INSTRUCTION)
        );
        assert_eq!(request.model, "text-model");
    }

    #[tokio::test]
    async fn falls_back_when_call_fails() {
        let backend = ScriptedBackend::new();
        backend.push_content(Err(anyhow!("quota exceeded")));
        assert_eq!(sanitizer(&backend).sanitize(ORIGINAL).await, ORIGINAL);
    }

    #[tokio::test]
    async fn falls_back_on_non_conforming_json() {
        let backend = ScriptedBackend::new();
        backend.push_text("not json at all");
        backend.push_text(r#"{"prompt":"something else"}"#);
        backend.push_text(r#"{"cleanedPrompt":"   "}"#);
        backend.push_text("");

        let sanitizer = sanitizer(&backend);
        for _ in 0..4 {
            assert_eq!(sanitizer.sanitize(ORIGINAL).await, ORIGINAL);
        }
    }
}
