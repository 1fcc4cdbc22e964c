//! DashScope (Tongyi Qianwen) multimodal image editing, the primary provider.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::ProviderCredentials;
use crate::dispatch::{AttemptOutcome, HttpClient, ImageProvider};
use crate::error::WonderlandError;
use crate::storage::{ImageKind, ImageStore};

pub const PROVIDER: &str = "dashscope";

const GENERATION_PATH: &str = "/api/v1/services/aigc/multimodal-generation/generation";

#[derive(Deserialize)]
struct GenerationResponse {
    output: Option<Output>,
    code: Option<String>,
    message: Option<String>,
}

#[derive(Deserialize)]
struct Output {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    #[serde(default)]
    content: Vec<ContentItem>,
}

#[derive(Deserialize)]
struct ContentItem {
    image: Option<String>,
}

pub struct DashScopeProvider {
    http: HttpClient,
    store: Arc<ImageStore>,
    credentials: ProviderCredentials,
    model: String,
}

impl DashScopeProvider {
    pub fn new(
        http: HttpClient,
        store: Arc<ImageStore>,
        credentials: ProviderCredentials,
        model: impl Into<String>,
    ) -> Self {
        Self {
            http,
            store,
            credentials,
            model: model.into(),
        }
    }

    pub fn build_body(&self, instruction: &str, image_url: &str) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "input": {
                "messages": [{
                    "role": "user",
                    "content": [
                        {"image": image_url},
                        {"text": instruction}
                    ]
                }]
            },
            "parameters": {
                "watermark": true,
                "negative_prompt": ""
            }
        })
    }

    async fn generate(
        &self,
        instruction: &str,
        image_url: &str,
    ) -> Result<Vec<String>, WonderlandError> {
        let url = format!(
            "{}{GENERATION_PATH}",
            self.credentials.base_url.trim_end_matches('/')
        );
        let request = self
            .http
            .post(&url)
            .bearer_auth(&self.credentials.api_key)
            .json(&self.build_body(instruction, image_url));

        let body = self.http.send_checked(request, PROVIDER).await?;
        let remote_urls = parse_image_urls(&body)?;

        let mut saved = Vec::with_capacity(remote_urls.len());
        for remote in remote_urls {
            match self
                .store
                .save_from_url(&self.http, ImageKind::Cartoon, &remote)
                .await
            {
                Ok(path) => {
                    tracing::info!(provider = PROVIDER, path = %path, "saved generated image");
                    saved.push(path);
                }
                Err(e) => {
                    // The vendor URL stays valid for a while; hand it back as-is.
                    tracing::warn!(provider = PROVIDER, url = %remote, "failed to save image: {e}");
                    saved.push(remote);
                }
            }
        }
        Ok(saved)
    }
}

/// Pull every image URL out of a generation response.
pub fn parse_image_urls(body: &[u8]) -> Result<Vec<String>, WonderlandError> {
    let response: GenerationResponse = serde_json::from_slice(body)
        .map_err(|e| WonderlandError::SchemaParse(format!("dashscope response: {e}")))?;

    let Some(output) = response.output else {
        let message = match (response.code, response.message) {
            (Some(code), Some(msg)) => format!("{code}: {msg}"),
            (None, Some(msg)) => msg,
            (Some(code), None) => code,
            (None, None) => "response missing 'output'".to_string(),
        };
        return Err(WonderlandError::Upstream {
            provider: PROVIDER.to_string(),
            message,
            status: None,
        });
    };

    let urls: Vec<String> = output
        .choices
        .into_iter()
        .flat_map(|c| c.message.content)
        .filter_map(|item| item.image)
        .collect();

    if urls.is_empty() {
        return Err(WonderlandError::NoImage {
            provider: PROVIDER.to_string(),
        });
    }
    Ok(urls)
}

#[async_trait]
impl ImageProvider for DashScopeProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn attempt(&self, instruction: &str, image_url: &str) -> AttemptOutcome {
        AttemptOutcome::from_result(self.generate(instruction, image_url).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_images_across_choices() {
        let body = br#"{"output":{"choices":[
            {"message":{"content":[{"image":"https://cdn/a.png"},{"text":"ok"}]}},
            {"message":{"content":[{"image":"https://cdn/b.png"}]}}
        ]}}"#;
        let urls = parse_image_urls(body).unwrap();
        assert_eq!(urls, vec!["https://cdn/a.png", "https://cdn/b.png"]);
    }

    #[test]
    fn response_without_images_is_no_image() {
        let body = br#"{"output":{"choices":[{"message":{"content":[{"text":"sorry"}]}}]}}"#;
        let err = parse_image_urls(body).unwrap_err();
        assert!(matches!(err, WonderlandError::NoImage { .. }));
    }

    #[test]
    fn error_payload_carries_vendor_code() {
        let body = br#"{"code":"InvalidParameter","message":"url error"}"#;
        let err = parse_image_urls(body).unwrap_err();
        assert!(err.user_message().contains("InvalidParameter: url error"));
    }

    #[test]
    fn malformed_json_is_schema_error() {
        let err = parse_image_urls(b"not json").unwrap_err();
        assert!(matches!(err, WonderlandError::SchemaParse(_)));
    }

    #[test]
    fn body_places_image_before_text() {
        let provider = DashScopeProvider::new(
            HttpClient::new(),
            Arc::new(ImageStore::new("/tmp", "/ai-photos")),
            ProviderCredentials {
                api_key: "sk".into(),
                base_url: "http://localhost".into(),
            },
            "qwen-image-edit",
        );
        let body = provider.build_body("draw", "https://img/x.jpg");
        assert_eq!(body["model"], "qwen-image-edit");
        let content = &body["input"]["messages"][0]["content"];
        assert_eq!(content[0]["image"], "https://img/x.jpg");
        assert_eq!(content[1]["text"], "draw");
        assert_eq!(body["parameters"]["watermark"], true);
    }
}
