//! Gemini: image generation (secondary slot) and prompt rewriting.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::config::ProviderCredentials;
use crate::dispatch::{AttemptOutcome, HttpClient, ImageProvider};
use crate::error::WonderlandError;
use crate::prompt;
use crate::rewrite::PromptRewriter;
use crate::storage::{ImageKind, ImageStore};

pub const PROVIDER: &str = "gemini";
pub const IMAGE_MODEL: &str = "gemini-2.5-flash-image-preview";
pub const TEXT_MODEL: &str = "gemini-2.5-flash-lite";

fn endpoint(base_url: &str, model: &str) -> String {
    format!(
        "{}/v1beta/models/{model}:generateContent",
        base_url.trim_end_matches('/')
    )
}

/// Best-effort MIME sniffing for the inline source image.
fn mime_for(bytes: &[u8]) -> &'static str {
    match bytes {
        [0x89, b'P', b'N', b'G', ..] => "image/png",
        [b'G', b'I', b'F', ..] => "image/gif",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => "image/webp",
        _ => "image/jpeg",
    }
}

pub fn build_image_body(instruction: &str, image_bytes: &[u8]) -> serde_json::Value {
    serde_json::json!({
        "contents": [{
            "role": "user",
            "parts": [
                {"inline_data": {
                    "mime_type": mime_for(image_bytes),
                    "data": STANDARD.encode(image_bytes)
                }},
                {"text": instruction}
            ]
        }],
        "generationConfig": {
            "responseModalities": ["IMAGE", "TEXT"]
        }
    })
}

fn candidate_parts(v: &serde_json::Value) -> impl Iterator<Item = &serde_json::Value> {
    v["candidates"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|c| c["content"]["parts"].as_array())
        .flatten()
}

/// Decode every inline image in a generateContent response.
pub fn parse_inline_images(body: &[u8]) -> Result<Vec<Vec<u8>>, WonderlandError> {
    let v: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| WonderlandError::SchemaParse(format!("gemini response: {e}")))?;

    let mut images = Vec::new();
    for part in candidate_parts(&v) {
        let inline = part.get("inlineData").or_else(|| part.get("inline_data"));
        if let Some(data) = inline.and_then(|i| i["data"].as_str()) {
            let bytes = STANDARD.decode(data).map_err(|e| {
                WonderlandError::SchemaParse(format!("gemini inline image is not base64: {e}"))
            })?;
            images.push(bytes);
        }
    }

    if images.is_empty() {
        return Err(WonderlandError::NoImage {
            provider: PROVIDER.to_string(),
        });
    }
    Ok(images)
}

/// First non-empty text part of a generateContent response.
pub fn parse_text(body: &[u8]) -> Result<String, WonderlandError> {
    let v: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| WonderlandError::SchemaParse(format!("gemini response: {e}")))?;

    candidate_parts(&v)
        .filter_map(|p| p["text"].as_str())
        .map(str::trim)
        .find(|t| !t.is_empty())
        .map(str::to_string)
        .ok_or_else(|| WonderlandError::Upstream {
            provider: PROVIDER.to_string(),
            message: "no text in response".to_string(),
            status: None,
        })
}

pub struct GeminiProvider {
    http: HttpClient,
    store: Arc<ImageStore>,
    credentials: ProviderCredentials,
}

impl GeminiProvider {
    pub fn new(http: HttpClient, store: Arc<ImageStore>, credentials: ProviderCredentials) -> Self {
        Self {
            http,
            store,
            credentials,
        }
    }

    async fn generate(
        &self,
        instruction: &str,
        image_url: &str,
    ) -> Result<Vec<String>, WonderlandError> {
        let source = self.http.fetch_bytes(image_url).await?;
        let request = self
            .http
            .post(&endpoint(&self.credentials.base_url, IMAGE_MODEL))
            .header("x-goog-api-key", &self.credentials.api_key)
            .json(&build_image_body(instruction, &source));

        let body = self.http.send_checked(request, PROVIDER).await?;
        let mut saved = Vec::new();
        let mut first_error = None;
        for bytes in parse_inline_images(&body)? {
            match self.store.save_bytes(ImageKind::Gemini, "png", &bytes).await {
                Ok(path) => {
                    tracing::info!(provider = PROVIDER, path = %path, "saved generated image");
                    saved.push(path);
                }
                Err(e) => {
                    tracing::warn!(provider = PROVIDER, "failed to save image: {e}");
                    first_error.get_or_insert(e);
                }
            }
        }
        keep_saved(saved, first_error)
    }
}

/// Inline images have no remote fallback, so the attempt fails only when
/// nothing could be saved.
fn keep_saved(
    saved: Vec<String>,
    first_error: Option<WonderlandError>,
) -> Result<Vec<String>, WonderlandError> {
    match first_error {
        Some(e) if saved.is_empty() => Err(e),
        _ => Ok(saved),
    }
}

#[async_trait]
impl ImageProvider for GeminiProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn attempt(&self, instruction: &str, image_url: &str) -> AttemptOutcome {
        AttemptOutcome::from_result(self.generate(instruction, image_url).await)
    }
}

/// Rewrites user prompts through the Gemini text model.
pub struct GeminiRewriter {
    http: HttpClient,
    credentials: ProviderCredentials,
}

impl GeminiRewriter {
    pub fn new(http: HttpClient, credentials: ProviderCredentials) -> Self {
        Self { http, credentials }
    }
}

#[async_trait]
impl PromptRewriter for GeminiRewriter {
    async fn rewrite(&self, original: &str) -> Result<String, WonderlandError> {
        let body = serde_json::json!({
            "contents": [{
                "role": "user",
                "parts": [{"text": prompt::rewrite_instruction(original)}]
            }],
            "generationConfig": {
                "thinkingConfig": {"thinkingBudget": 0}
            }
        });
        let request = self
            .http
            .post(&endpoint(&self.credentials.base_url, TEXT_MODEL))
            .header("x-goog-api-key", &self.credentials.api_key)
            .json(&body);

        let response = self.http.send_checked(request, PROVIDER).await?;
        parse_text(&response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_model() {
        assert_eq!(
            endpoint("https://generativelanguage.googleapis.com/", IMAGE_MODEL),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash-image-preview:generateContent"
        );
    }

    #[test]
    fn image_body_inlines_source() {
        let body = build_image_body("cartoonize", b"\x89PNG\r\n");
        let parts = &body["contents"][0]["parts"];
        assert_eq!(parts[0]["inline_data"]["mime_type"], "image/png");
        assert_eq!(parts[0]["inline_data"]["data"], STANDARD.encode(b"\x89PNG\r\n"));
        assert_eq!(parts[1]["text"], "cartoonize");
        assert_eq!(body["generationConfig"]["responseModalities"][0], "IMAGE");
    }

    #[test]
    fn jpeg_is_default_mime() {
        assert_eq!(mime_for(&[0xFF, 0xD8, 0xFF]), "image/jpeg");
    }

    #[test]
    fn inline_images_decoded() {
        let data = STANDARD.encode(b"fake-png");
        let body = format!(
            r#"{{"candidates":[{{"content":{{"parts":[{{"text":"here"}},{{"inlineData":{{"mimeType":"image/png","data":"{data}"}}}}]}}}}]}}"#
        );
        let images = parse_inline_images(body.as_bytes()).unwrap();
        assert_eq!(images, vec![b"fake-png".to_vec()]);
    }

    #[test]
    fn text_only_response_is_no_image() {
        let body = br#"{"candidates":[{"content":{"parts":[{"text":"I can't do that"}]}}]}"#;
        let err = parse_inline_images(body).unwrap_err();
        assert!(matches!(err, WonderlandError::NoImage { .. }));
    }

    #[test]
    fn text_extracted_and_trimmed() {
        let body = br#"{"candidates":[{"content":{"parts":[{"text":"  "},{"text":" optimized prompt \n"}]}}]}"#;
        assert_eq!(parse_text(body).unwrap(), "optimized prompt");
    }

    #[test]
    fn partial_save_keeps_written_images() {
        let saved = keep_saved(
            vec!["/ai-photos/gemini_a.png".into()],
            Some(WonderlandError::Other("disk full".into())),
        )
        .unwrap();
        assert_eq!(saved, vec!["/ai-photos/gemini_a.png"]);
    }

    #[test]
    fn nothing_saved_reports_first_error() {
        let err = keep_saved(Vec::new(), Some(WonderlandError::Other("disk full".into())))
            .unwrap_err();
        assert_eq!(err.user_message(), "disk full");
        assert!(keep_saved(Vec::new(), None).unwrap().is_empty());
    }

    #[test]
    fn missing_candidates_is_error() {
        assert!(parse_text(br#"{"promptFeedback":{}}"#).is_err());
    }
}
