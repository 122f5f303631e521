use base64::{engine::general_purpose, Engine as _};

use crate::errors::{WorkflowError, WorkflowResult};

pub const UPLOAD_MIME_TYPES: &[&str] = &["image/jpeg", "image/png"];

/// An image as the API exchanges it: a MIME type plus base64 payload.
/// Two handles are the same image exactly when both fields match, which
/// is also what history de-duplication keys on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageData {
    pub mime_type: String,
    pub data: String,
}

impl ImageData {
    pub fn new(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    pub fn from_bytes(mime_type: &str, bytes: &[u8]) -> Self {
        Self::new(mime_type, general_purpose::STANDARD.encode(bytes))
    }

    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        general_purpose::STANDARD.decode(self.data.as_bytes())
    }

    /// Rough decoded size, good enough for status output.
    pub fn approx_bytes(&self) -> usize {
        self.data.len() / 4 * 3
    }
}

pub fn detect_mime_type(data: &[u8]) -> Option<String> {
    infer::get(data).map(|kind| kind.mime_type().to_string())
}

pub fn normalize_mime_type(mime_type: &str) -> String {
    let lowered = mime_type.trim().to_ascii_lowercase();
    match lowered.as_str() {
        "image/jpg" | "image/pjpeg" => "image/jpeg".to_string(),
        "image/x-png" => "image/png".to_string(),
        _ => lowered,
    }
}

pub fn extension_for_mime(mime_type: &str) -> &'static str {
    match normalize_mime_type(mime_type).as_str() {
        "image/jpeg" => "jpeg",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "bin",
    }
}

/// A face image handed in by the user instead of being synthesized.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl UploadedImage {
    /// Reads the declared type from the content itself; unknown content is
    /// left with an empty type and rejected by validation.
    pub fn sniffed(bytes: Vec<u8>) -> Self {
        let mime_type = detect_mime_type(&bytes).unwrap_or_default();
        Self { bytes, mime_type }
    }

    pub fn into_image(self) -> WorkflowResult<ImageData> {
        let mime_type = normalize_mime_type(&self.mime_type);
        if !UPLOAD_MIME_TYPES.contains(&mime_type.as_str()) {
            return Err(WorkflowError::validation(
                "Please upload a valid image file (JPEG or PNG).",
            ));
        }
        if self.bytes.is_empty() {
            return Err(WorkflowError::validation("The uploaded file is empty."));
        }
        Ok(ImageData::from_bytes(&mime_type, &self.bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_HEADER: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
    const JPEG_HEADER: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10, b'J', b'F', b'I', b'F'];

    #[test]
    fn sniffs_png_and_jpeg() {
        assert_eq!(detect_mime_type(PNG_HEADER).as_deref(), Some("image/png"));
        assert_eq!(detect_mime_type(JPEG_HEADER).as_deref(), Some("image/jpeg"));
        assert_eq!(detect_mime_type(b"hello world"), None);
    }

    #[test]
    fn upload_accepts_jpeg_alias() {
        let upload = UploadedImage {
            bytes: JPEG_HEADER.to_vec(),
            mime_type: "image/JPG".to_string(),
        };
        let image = upload.into_image().unwrap();
        assert_eq!(image.mime_type, "image/jpeg");
        assert_eq!(image.decode().unwrap(), JPEG_HEADER);
    }

    #[test]
    fn upload_rejects_other_types() {
        let upload = UploadedImage {
            bytes: b"GIF89a".to_vec(),
            mime_type: "image/gif".to_string(),
        };
        let err = upload.into_image().unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));

        let unknown = UploadedImage::sniffed(b"plain text".to_vec());
        assert!(unknown.into_image().is_err());
    }

    #[test]
    fn extension_follows_mime() {
        assert_eq!(extension_for_mime("image/jpg"), "jpeg");
        assert_eq!(extension_for_mime("image/png"), "png");
        assert_eq!(extension_for_mime("application/octet-stream"), "bin");
    }
}
