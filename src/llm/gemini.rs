use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::IgnoredAny;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};
use url::Url;

use crate::config::Config;
use crate::llm::backend::{
    ContentRequest, ContentResponse, GenerativeBackend, ImageRequest, ImageResponse, RequestPart,
    ResponsePart,
};
use crate::llm::media::ImageData;
use crate::utils::timing::log_llm_timing;

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    parts: Option<Vec<GeminiPart>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GeminiPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: GeminiInlineData,
    },
    Other(IgnoredAny),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct ImagenResponse {
    predictions: Option<Vec<ImagenPrediction>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImagenPrediction {
    bytes_base64_encoded: Option<String>,
    mime_type: Option<String>,
    rai_filtered_reason: Option<String>,
}

/// reqwest client for the Generative Language REST API.
pub struct GeminiClient {
    http: Client,
    base_url: Url,
    api_key: String,
    safety_settings: String,
    person_generation: String,
}

fn truncate_for_log(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let truncated: String = value.chars().take(limit).collect();
    format!("{truncated}... (truncated)")
}

fn build_safety_settings(profile: &str) -> Vec<Value> {
    let threshold = match profile {
        "standard" => "BLOCK_MEDIUM_AND_ABOVE",
        _ => "OFF",
    };

    vec![
        json!({ "category": "HARM_CATEGORY_HARASSMENT", "threshold": threshold }),
        json!({ "category": "HARM_CATEGORY_HATE_SPEECH", "threshold": threshold }),
        json!({ "category": "HARM_CATEGORY_SEXUALLY_EXPLICIT", "threshold": threshold }),
        json!({ "category": "HARM_CATEGORY_DANGEROUS_CONTENT", "threshold": threshold }),
    ]
}

fn summarize_gemini_parts(parts: &[Value]) -> Vec<Value> {
    parts
        .iter()
        .map(|part| {
            if let Some(text) = part.get("text").and_then(|value| value.as_str()) {
                json!({ "text": truncate_for_log(text, 200) })
            } else if let Some(inline_data) = part.get("inlineData") {
                let mime_type = inline_data
                    .get("mimeType")
                    .and_then(|value| value.as_str())
                    .unwrap_or("unknown");
                let data_len = inline_data
                    .get("data")
                    .and_then(|value| value.as_str())
                    .map(|value| value.len())
                    .unwrap_or(0);
                json!({ "inlineData": { "mimeType": mime_type, "dataLen": data_len } })
            } else {
                json!({ "unknownPart": true })
            }
        })
        .collect()
}

fn summarize_gemini_payload(payload: &Value) -> Value {
    let mut summary = Map::new();

    if let Some(instruction) = payload
        .pointer("/systemInstruction/parts/0/text")
        .and_then(|value| value.as_str())
    {
        summary.insert(
            "systemInstruction".to_string(),
            json!(truncate_for_log(instruction, 120)),
        );
    }

    if let Some(contents) = payload.get("contents").and_then(|value| value.as_array()) {
        let summarized_contents = contents
            .iter()
            .map(|content| {
                let parts = content
                    .get("parts")
                    .and_then(|value| value.as_array())
                    .map(|parts| summarize_gemini_parts(parts))
                    .unwrap_or_default();
                json!({ "parts": parts })
            })
            .collect::<Vec<_>>();
        summary.insert("contents".to_string(), Value::Array(summarized_contents));
    }

    if let Some(config) = payload.get("generationConfig") {
        let mut config = config.clone();
        if let Some(object) = config.as_object_mut() {
            if object.remove("responseSchema").is_some() {
                object.insert("responseSchema".to_string(), json!("<schema>"));
            }
        }
        summary.insert("generationConfig".to_string(), config);
    }

    if let Some(instances) = payload.get("instances").and_then(|value| value.as_array()) {
        let prompts = instances
            .iter()
            .filter_map(|instance| instance.get("prompt").and_then(|value| value.as_str()))
            .map(|prompt| json!(truncate_for_log(prompt, 200)))
            .collect::<Vec<_>>();
        summary.insert("prompts".to_string(), Value::Array(prompts));
    }

    if let Some(parameters) = payload.get("parameters") {
        summary.insert("parameters".to_string(), parameters.clone());
    }

    Value::Object(summary)
}

fn summarize_content_response(response: &ContentResponse) -> Value {
    let image_parts = response.parts.iter().filter(|part| part.image.is_some()).count();
    let text_parts = response.parts.iter().filter(|part| part.text.is_some()).count();
    json!({
        "textParts": text_parts,
        "imageParts": image_parts,
        "textPreview": response.first_text().map(|text| truncate_for_log(text, 200)),
    })
}

fn summarize_error_body(body: &str) -> (Option<String>, String) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return (None, "empty response body".to_string());
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        let message = value
            .pointer("/error/message")
            .and_then(|v| v.as_str())
            .map(|v| v.to_string())
            .or_else(|| {
                value
                    .get("message")
                    .and_then(|v| v.as_str())
                    .map(|v| v.to_string())
            });
        return (message, truncate_for_log(&value.to_string(), 2000));
    }

    (None, truncate_for_log(trimmed, 2000))
}

fn build_content_parts(parts: &[RequestPart]) -> Vec<Value> {
    parts
        .iter()
        .map(|part| match part {
            RequestPart::Text(text) => json!({ "text": text }),
            RequestPart::Image(image) => json!({
                "inlineData": {
                    "mimeType": image.mime_type,
                    "data": image.data
                }
            }),
        })
        .collect()
}

fn build_content_payload(request: &ContentRequest, safety_profile: &str) -> Value {
    let mut generation_config = Map::new();
    if !request.response_modalities.is_empty() {
        let modalities = request
            .response_modalities
            .iter()
            .map(|modality| json!(modality.as_str()))
            .collect::<Vec<_>>();
        generation_config.insert("responseModalities".to_string(), Value::Array(modalities));
    }
    if let Some(schema) = &request.response_schema {
        generation_config.insert("responseMimeType".to_string(), json!("application/json"));
        generation_config.insert("responseSchema".to_string(), schema.clone());
    }

    let mut payload = json!({
        "contents": [{ "role": "user", "parts": build_content_parts(&request.parts) }],
        "safetySettings": build_safety_settings(safety_profile),
    });
    if let Some(object) = payload.as_object_mut() {
        if !generation_config.is_empty() {
            object.insert(
                "generationConfig".to_string(),
                Value::Object(generation_config),
            );
        }
        if let Some(instruction) = &request.system_instruction {
            object.insert(
                "systemInstruction".to_string(),
                json!({ "parts": [{ "text": instruction }] }),
            );
        }
    }
    payload
}

fn build_image_payload(request: &ImageRequest, person_generation: &str) -> Value {
    json!({
        "instances": [{ "prompt": request.prompt }],
        "parameters": {
            "sampleCount": request.image_count,
            "outputMimeType": request.output_mime_type,
            "aspectRatio": request.aspect_ratio,
            "personGeneration": person_generation,
        }
    })
}

fn convert_content_response(response: GeminiResponse) -> ContentResponse {
    let parts = response
        .candidates
        .unwrap_or_default()
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .and_then(|content| content.parts)
        .unwrap_or_default();

    let parts = parts
        .into_iter()
        .filter_map(|part| match part {
            GeminiPart::Text { text } => Some(ResponsePart {
                text: Some(text),
                image: None,
            }),
            GeminiPart::InlineData { inline_data } => {
                if inline_data.mime_type.starts_with("image/") && !inline_data.data.is_empty() {
                    Some(ResponsePart {
                        text: None,
                        image: Some(ImageData::new(inline_data.mime_type, inline_data.data)),
                    })
                } else {
                    None
                }
            }
            GeminiPart::Other(_) => None,
        })
        .collect();

    ContentResponse { parts }
}

fn convert_image_response(response: ImagenResponse, fallback_mime: &str) -> ImageResponse {
    let mut images = Vec::new();
    for prediction in response.predictions.unwrap_or_default() {
        match prediction.bytes_base64_encoded {
            Some(data) if !data.is_empty() => {
                let mime_type = prediction
                    .mime_type
                    .unwrap_or_else(|| fallback_mime.to_string());
                images.push(ImageData::new(mime_type, data));
            }
            _ => {
                if let Some(reason) = prediction.rai_filtered_reason {
                    warn!("Imagen filtered a prediction: {}", reason);
                }
            }
        }
    }
    ImageResponse { images }
}

impl GeminiClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.gemini_request_timeout_seconds))
            .build()
            .map_err(|err| anyhow!("Failed to build HTTP client: {err}"))?;

        Ok(Self {
            http,
            base_url: config.gemini_base_url.clone(),
            api_key: config.gemini_api_key.clone(),
            safety_settings: config.gemini_safety_settings.clone(),
            person_generation: config.gemini_person_generation.clone(),
        })
    }

    fn redact(&self, text: &str) -> String {
        let key = self.api_key.trim();
        if key.is_empty() {
            return text.to_string();
        }
        text.replace(key, "[redacted]")
    }

    fn endpoint(&self, model: &str, method: &str) -> Result<Url> {
        self.base_url
            .join(&format!("v1beta/models/{}:{}", model.trim(), method))
            .map_err(|err| anyhow!("Invalid endpoint for model {model}: {err}"))
    }

    async fn post_json(&self, model: &str, method: &str, payload: &Value) -> Result<String> {
        let url = self.endpoint(model, method)?;

        if tracing::enabled!(tracing::Level::DEBUG) {
            let payload_summary = summarize_gemini_payload(payload);
            debug!(target: "llm.gemini", model = model, method = method, payload = %payload_summary);
        }

        let response = match self
            .http
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(payload)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                let err_text = self.redact(&err.to_string());
                warn!(
                    "Gemini request failed to send: {} (timeout={}, connect={})",
                    err_text,
                    err.is_timeout(),
                    err.is_connect()
                );
                return Err(anyhow!("Gemini request failed: {}", err_text));
            }
        };

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| anyhow!("Failed to read Gemini response: {}", self.redact(&err.to_string())))?;

        if !status.is_success() {
            let (message, body_summary) = summarize_error_body(&body);
            warn!(
                "Gemini API error: status={}, body={}",
                status,
                self.redact(&body_summary)
            );
            let detail = message.unwrap_or(body_summary);
            return Err(anyhow!(
                "Gemini request failed with status {}: {}",
                status,
                self.redact(&detail)
            ));
        }

        Ok(body)
    }
}

#[async_trait]
impl GenerativeBackend for GeminiClient {
    async fn generate_images(&self, request: ImageRequest) -> Result<ImageResponse> {
        let payload = build_image_payload(&request, &self.person_generation);
        log_llm_timing("imagen", &request.model, "generate_images", None, || async {
            let body = self.post_json(&request.model, "predict", &payload).await?;
            let parsed: ImagenResponse = serde_json::from_str(&body)
                .map_err(|err| anyhow!("Malformed Imagen response: {err}"))?;
            let response = convert_image_response(parsed, &request.output_mime_type);
            debug!(target: "llm.gemini", model = %request.model, images = response.images.len());
            Ok(response)
        })
        .await
    }

    async fn generate_content(&self, request: ContentRequest) -> Result<ContentResponse> {
        let payload = build_content_payload(&request, &self.safety_settings);
        let metadata = json!({
            "structured": request.response_schema.is_some(),
            "imageInputs": request
                .parts
                .iter()
                .filter(|part| matches!(part, RequestPart::Image(_)))
                .count(),
        });
        log_llm_timing(
            "gemini",
            &request.model,
            "generate_content",
            Some(metadata),
            || async {
                let body = self
                    .post_json(&request.model, "generateContent", &payload)
                    .await?;
                let parsed: GeminiResponse = serde_json::from_str(&body)
                    .map_err(|err| anyhow!("Malformed Gemini response: {err}"))?;
                let response = convert_content_response(parsed);
                if tracing::enabled!(tracing::Level::DEBUG) {
                    let summary = summarize_content_response(&response);
                    debug!(target: "llm.gemini", model = %request.model, response = %summary);
                }
                Ok(response)
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::backend::Modality;
    use mockito::Matcher;

    fn client_for(server: &mockito::ServerGuard) -> GeminiClient {
        GeminiClient::new(&Config::for_tests(&server.url())).unwrap()
    }

    #[test]
    fn content_payload_puts_image_before_text() {
        let request = ContentRequest {
            model: "scene".to_string(),
            parts: vec![
                RequestPart::Image(ImageData::new("image/jpeg", "QUJD")),
                RequestPart::Text("put them on a boat".to_string()),
            ],
            system_instruction: None,
            response_schema: None,
            response_modalities: vec![Modality::Image, Modality::Text],
        };
        let payload = build_content_payload(&request, "permissive");
        assert_eq!(
            payload.pointer("/contents/0/parts/0/inlineData/mimeType"),
            Some(&json!("image/jpeg"))
        );
        assert_eq!(
            payload.pointer("/contents/0/parts/1/text"),
            Some(&json!("put them on a boat"))
        );
        assert_eq!(
            payload.pointer("/generationConfig/responseModalities"),
            Some(&json!(["IMAGE", "TEXT"]))
        );
        assert!(payload.get("systemInstruction").is_none());
        assert_eq!(payload.pointer("/safetySettings/0/threshold"), Some(&json!("OFF")));
    }

    #[test]
    fn structured_payload_requests_json() {
        let request = ContentRequest::structured("text", "hi".to_string(), json!({"type": "OBJECT"}))
            .with_system_instruction("be brief");
        let payload = build_content_payload(&request, "standard");
        assert_eq!(
            payload.pointer("/generationConfig/responseMimeType"),
            Some(&json!("application/json"))
        );
        assert_eq!(
            payload.pointer("/systemInstruction/parts/0/text"),
            Some(&json!("be brief"))
        );
        assert_eq!(
            payload.pointer("/safetySettings/0/threshold"),
            Some(&json!("BLOCK_MEDIUM_AND_ABOVE"))
        );
        let summary = summarize_gemini_payload(&payload);
        assert_eq!(
            summary.pointer("/generationConfig/responseSchema"),
            Some(&json!("<schema>"))
        );
    }

    #[test]
    fn error_body_prefers_api_message() {
        let (message, _) =
            summarize_error_body(r#"{"error":{"code":400,"message":"API key not valid"}}"#);
        assert_eq!(message.as_deref(), Some("API key not valid"));
        let (message, summary) = summarize_error_body("   ");
        assert!(message.is_none());
        assert_eq!(summary, "empty response body");
    }

    #[test]
    fn unknown_parts_are_ignored() {
        let parsed: GeminiResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": { "parts": [
                    { "functionCall": { "name": "noop" } },
                    { "inlineData": { "mimeType": "image/png", "data": "AAAA" } },
                    { "text": "done" }
                ]}
            }, {
                "content": { "parts": [{ "text": "second candidate" }] }
            }]
        }))
        .unwrap();
        let response = convert_content_response(parsed);
        assert_eq!(response.parts.len(), 2);
        assert_eq!(response.first_image().unwrap().data, "AAAA");
        assert_eq!(response.text(), "done");
    }

    #[tokio::test]
    async fn generate_images_reads_predictions() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1beta/models/imagen-test:predict")
            .match_header("x-goog-api-key", "test-key")
            .match_body(Matcher::PartialJson(json!({
                "parameters": { "sampleCount": 1, "outputMimeType": "image/jpeg" }
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"predictions":[{"raiFilteredReason":"blocked"},{"bytesBase64Encoded":"QUJD","mimeType":"image/jpeg"}]}"#,
            )
            .create_async()
            .await;

        let client = client_for(&server);
        let response = client
            .generate_images(ImageRequest {
                model: "imagen-test".to_string(),
                prompt: "a face".to_string(),
                image_count: 1,
                output_mime_type: "image/jpeg".to_string(),
                aspect_ratio: "1:1".to_string(),
            })
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response.images, vec![ImageData::new("image/jpeg", "QUJD")]);
    }

    #[tokio::test]
    async fn generate_images_tolerates_missing_predictions() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1beta/models/imagen-test:predict")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let client = client_for(&server);
        let response = client
            .generate_images(ImageRequest {
                model: "imagen-test".to_string(),
                prompt: "a face".to_string(),
                image_count: 1,
                output_mime_type: "image/jpeg".to_string(),
                aspect_ratio: "1:1".to_string(),
            })
            .await
            .unwrap();
        assert!(response.images.is_empty());
    }

    #[tokio::test]
    async fn http_errors_surface_api_message_once() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1beta/models/text-test:generateContent")
            .with_status(503)
            .with_body(r#"{"error":{"message":"The model is overloaded"}}"#)
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client
            .generate_content(ContentRequest::structured(
                "text-test",
                "ideas".to_string(),
                json!({}),
            ))
            .await
            .unwrap_err();

        mock.assert_async().await;
        let message = err.to_string();
        assert!(message.contains("503"));
        assert!(message.contains("The model is overloaded"));
    }

    #[tokio::test]
    async fn api_key_is_redacted_from_errors() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1beta/models/text-test:generateContent")
            .with_status(400)
            .with_body(r#"{"error":{"message":"bad key test-key"}}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client
            .generate_content(ContentRequest::structured(
                "text-test",
                "ideas".to_string(),
                json!({}),
            ))
            .await
            .unwrap_err();
        assert!(!err.to_string().contains("test-key"));
        assert!(err.to_string().contains("[redacted]"));
    }
}
