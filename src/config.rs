use std::env;
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use tracing::warn;
use url::Url;

const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/";

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub logs_dir: PathBuf,
    pub output_dir: PathBuf,
    pub gemini_api_key: String,
    pub gemini_base_url: Url,
    pub gemini_face_model: String,
    pub gemini_scene_model: String,
    pub gemini_text_model: String,
    pub gemini_safety_settings: String,
    pub gemini_person_generation: String,
    pub gemini_request_timeout_seconds: u64,
    pub face_aspect_ratio: String,
    pub face_output_mime_type: String,
}

fn env_string(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_path(name: &str, default: &str) -> PathBuf {
    PathBuf::from(env_string(name, default))
}

pub fn normalize_gemini_safety_settings(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return "permissive".to_string();
    }

    let lowered = trimmed.to_lowercase();
    match lowered.as_str() {
        "permissive" | "off" | "none" => "permissive".to_string(),
        "standard" => "standard".to_string(),
        _ => {
            warn!(
                "Unknown GEMINI_SAFETY_SETTINGS value '{}'; defaulting to permissive.",
                value
            );
            "permissive".to_string()
        }
    }
}

/// Parses the API root and forces a trailing slash so `Url::join` appends
/// instead of replacing the last path segment.
pub fn normalize_base_url(value: &str) -> Result<Url> {
    let trimmed = value.trim();
    let with_slash = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    };
    Url::parse(&with_slash).map_err(|err| anyhow!("Invalid GEMINI_BASE_URL '{trimmed}': {err}"))
}

/// Logging destination and level, readable before the rest of `Config` so
/// warnings raised while loading it reach a subscriber.
pub fn log_settings() -> (PathBuf, String) {
    (
        env_path("LOGS_DIR", "logs"),
        env_string("LOG_LEVEL", "info").to_lowercase(),
    )
}

impl Config {
    pub fn load() -> Result<Self> {
        let gemini_api_key = env::var("GEMINI_API_KEY")
            .or_else(|_| env::var("API_KEY"))
            .unwrap_or_default();
        if gemini_api_key.trim().is_empty() {
            return Err(anyhow!("GEMINI_API_KEY (or API_KEY) is required"));
        }

        let (logs_dir, log_level) = log_settings();
        Ok(Config {
            log_level,
            logs_dir,
            output_dir: env_path("OUTPUT_DIR", "downloads"),
            gemini_api_key: gemini_api_key.trim().to_string(),
            gemini_base_url: normalize_base_url(&env_string(
                "GEMINI_BASE_URL",
                DEFAULT_GEMINI_BASE_URL,
            ))?,
            gemini_face_model: env_string("GEMINI_FACE_MODEL", "imagen-4.0-generate-001"),
            gemini_scene_model: env_string(
                "GEMINI_SCENE_MODEL",
                "gemini-2.5-flash-image-preview",
            ),
            gemini_text_model: env_string("GEMINI_TEXT_MODEL", "gemini-2.5-flash"),
            gemini_safety_settings: normalize_gemini_safety_settings(&env_string(
                "GEMINI_SAFETY_SETTINGS",
                "permissive",
            )),
            gemini_person_generation: env_string("GEMINI_PERSON_GENERATION", "allow_adult"),
            gemini_request_timeout_seconds: env_u64("GEMINI_REQUEST_TIMEOUT_SECONDS", 120).max(1),
            face_aspect_ratio: env_string("FACE_ASPECT_RATIO", "1:1"),
            face_output_mime_type: env_string("FACE_OUTPUT_MIME_TYPE", "image/jpeg"),
        })
    }
}

#[cfg(test)]
impl Config {
    pub fn for_tests(base_url: &str) -> Self {
        Config {
            log_level: "debug".to_string(),
            logs_dir: PathBuf::from("logs"),
            output_dir: PathBuf::from("downloads"),
            gemini_api_key: "test-key".to_string(),
            gemini_base_url: normalize_base_url(base_url).expect("valid test url"),
            gemini_face_model: "imagen-test".to_string(),
            gemini_scene_model: "scene-test".to_string(),
            gemini_text_model: "text-test".to_string(),
            gemini_safety_settings: "standard".to_string(),
            gemini_person_generation: "allow_adult".to_string(),
            gemini_request_timeout_seconds: 5,
            face_aspect_ratio: "1:1".to_string(),
            face_output_mime_type: "image/jpeg".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safety_settings_aliases_collapse_to_known_profiles() {
        assert_eq!(normalize_gemini_safety_settings("OFF"), "permissive");
        assert_eq!(normalize_gemini_safety_settings(" Standard "), "standard");
        assert_eq!(normalize_gemini_safety_settings(""), "permissive");
        assert_eq!(normalize_gemini_safety_settings("strict"), "permissive");
    }

    #[test]
    fn base_url_gains_trailing_slash() {
        let url = normalize_base_url("http://127.0.0.1:8080/proxy").unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8080/proxy/");
        let joined = url.join("v1beta/models/m:predict").unwrap();
        assert_eq!(joined.as_str(), "http://127.0.0.1:8080/proxy/v1beta/models/m:predict");
    }

    #[test]
    fn log_settings_do_not_need_the_api_key() {
        env::set_var("LOGS_DIR", "target/facecast-test-logs");
        env::set_var("LOG_LEVEL", "DEBUG");
        let (logs_dir, log_level) = log_settings();
        env::remove_var("LOGS_DIR");
        env::remove_var("LOG_LEVEL");

        assert_eq!(logs_dir, PathBuf::from("target/facecast-test-logs"));
        assert_eq!(log_level, "debug");
    }

    #[test]
    fn base_url_rejects_garbage() {
        assert!(normalize_base_url("not a url").is_err());
    }
}
