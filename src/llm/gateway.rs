use std::sync::Arc;

use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::config::Config;
use crate::errors::{WorkflowError, WorkflowResult};
use crate::llm::backend::{
    ContentRequest, GenerativeBackend, ImageRequest, Modality, RequestPart,
};
use crate::llm::media::ImageData;

pub const SUGGESTION_COUNT: usize = 3;

static SUGGESTIONS_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "type": "OBJECT",
        "properties": {
            "suggestions": {
                "type": "ARRAY",
                "items": {
                    "type": "STRING",
                    "description": "A single, detailed lifestyle photo suggestion incorporating activity, lighting, and mood."
                },
                "description": "A list of 3 detailed lifestyle photo suggestions."
            }
        },
        "required": ["suggestions"]
    })
});

#[derive(Debug, Deserialize)]
struct SuggestionsPayload {
    suggestions: Vec<String>,
}

/// Model names used per operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSet {
    pub face: String,
    pub scene: String,
    pub text: String,
    pub face_output_mime_type: String,
    pub face_aspect_ratio: String,
}

impl From<&Config> for ModelSet {
    fn from(config: &Config) -> Self {
        Self {
            face: config.gemini_face_model.clone(),
            scene: config.gemini_scene_model.clone(),
            text: config.gemini_text_model.clone(),
            face_output_mime_type: config.face_output_mime_type.clone(),
            face_aspect_ratio: config.face_aspect_ratio.clone(),
        }
    }
}

/// Structured responses sometimes arrive wrapped in a markdown fence even
/// when JSON output was requested.
pub fn strip_json_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

pub fn parse_suggestions(text: &str) -> WorkflowResult<Vec<String>> {
    let payload: SuggestionsPayload = serde_json::from_str(strip_json_fence(text)).map_err(|err| {
        warn!(
            "Failed to parse lifestyle suggestions JSON: {} (received: {:?})",
            err, text
        );
        WorkflowError::SuggestionParse("Could not understand the suggestions from the AI.".to_string())
    })?;

    Ok(payload
        .suggestions
        .into_iter()
        .map(|suggestion| suggestion.trim().to_string())
        .filter(|suggestion| !suggestion.is_empty())
        .take(SUGGESTION_COUNT)
        .collect())
}

/// The three generation operations, each one exchange with the backend
/// plus response unwrapping. Nothing here retries.
#[derive(Clone)]
pub struct GenerationGateway {
    backend: Arc<dyn GenerativeBackend>,
    models: ModelSet,
}

impl GenerationGateway {
    pub fn new(backend: Arc<dyn GenerativeBackend>, models: ModelSet) -> Self {
        Self { backend, models }
    }

    pub async fn generate_face(&self, prompt: &str) -> WorkflowResult<ImageData> {
        let request = ImageRequest {
            model: self.models.face.clone(),
            prompt: prompt.to_string(),
            image_count: 1,
            output_mime_type: self.models.face_output_mime_type.clone(),
            aspect_ratio: self.models.face_aspect_ratio.clone(),
        };

        let response = self
            .backend
            .generate_images(request)
            .await
            .map_err(|err| WorkflowError::generation(format!("Image generation failed. {err}")))?;

        let image = response.images.into_iter().next().ok_or_else(|| {
            WorkflowError::generation("Image generation failed. No images were returned.")
        })?;
        info!(
            "Face generated (model={}, mime={}, bytes~{})",
            self.models.face,
            image.mime_type,
            image.approx_bytes()
        );
        Ok(image)
    }

    pub async fn composite_scene(
        &self,
        face: &ImageData,
        prompt: &str,
    ) -> WorkflowResult<ImageData> {
        let request = ContentRequest {
            model: self.models.scene.clone(),
            parts: vec![
                RequestPart::Image(face.clone()),
                RequestPart::Text(prompt.to_string()),
            ],
            system_instruction: None,
            response_schema: None,
            response_modalities: vec![Modality::Image, Modality::Text],
        };

        let response = self
            .backend
            .generate_content(request)
            .await
            .map_err(|err| WorkflowError::generation(format!("Image generation failed. {err}")))?;

        if let Some(image) = response.first_image() {
            info!(
                "Scene composited (model={}, mime={}, bytes~{})",
                self.models.scene,
                image.mime_type,
                image.approx_bytes()
            );
            return Ok(image.clone());
        }

        match response.first_text() {
            Some(text) => Err(WorkflowError::generation(format!(
                "Image generation failed. The model responded with: {}",
                text.trim()
            ))),
            None => Err(WorkflowError::generation(
                "Image generation failed. The model did not return an image.",
            )),
        }
    }

    pub async fn fetch_suggestions(&self, prompt: &str) -> WorkflowResult<Vec<String>> {
        let request = ContentRequest::structured(
            &self.models.text,
            prompt.to_string(),
            SUGGESTIONS_SCHEMA.clone(),
        );

        let response = self
            .backend
            .generate_content(request)
            .await
            .map_err(|err| {
                WorkflowError::generation(format!("Could not load suggestions. {err}"))
            })?;

        parse_suggestions(&response.text())
    }
}

#[cfg(test)]
pub fn test_models() -> ModelSet {
    ModelSet {
        face: "face-model".to_string(),
        scene: "scene-model".to_string(),
        text: "text-model".to_string(),
        face_output_mime_type: "image/jpeg".to_string(),
        face_aspect_ratio: "1:1".to_string(),
    }
}
