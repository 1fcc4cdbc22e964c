//! Vidu reference-to-image, the tertiary provider.
//!
//! Vidu is asynchronous and exposes no completion endpoint we can rely on,
//! so a successful attempt only means the task was accepted. The returned
//! reference is `vidu-task:<id>`, not a downloadable image.

use async_trait::async_trait;

use crate::config::ProviderCredentials;
use crate::dispatch::{AttemptOutcome, HttpClient, ImageProvider};
use crate::error::WonderlandError;

pub const PROVIDER: &str = "vidu";
pub const MODEL: &str = "viduq1";
pub const TASK_REFERENCE_PREFIX: &str = "vidu-task:";

pub struct ViduProvider {
    http: HttpClient,
    credentials: ProviderCredentials,
}

impl ViduProvider {
    pub fn new(http: HttpClient, credentials: ProviderCredentials) -> Self {
        Self { http, credentials }
    }

    async fn submit(&self, prompt: &str, image_url: &str) -> Result<Vec<String>, WonderlandError> {
        let url = format!(
            "{}/ent/v2/reference2image",
            self.credentials.base_url.trim_end_matches('/')
        );
        let request = self
            .http
            .post(&url)
            .header("Authorization", format!("Token {}", self.credentials.api_key))
            .json(&build_body(prompt, image_url));

        let body = self.http.send_checked(request, PROVIDER).await?;
        let task_id = parse_task_id(&body)?;
        tracing::info!(provider = PROVIDER, vidu_task = %task_id, "vidu task submitted");
        Ok(vec![format!("{TASK_REFERENCE_PREFIX}{task_id}")])
    }
}

pub fn build_body(prompt: &str, image_url: &str) -> serde_json::Value {
    serde_json::json!({
        "model": MODEL,
        "images": [image_url],
        "prompt": prompt,
        "aspect_ratio": "1:1"
    })
}

pub fn parse_task_id(body: &[u8]) -> Result<String, WonderlandError> {
    let v: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| WonderlandError::SchemaParse(format!("vidu response: {e}")))?;

    if let Some(state @ "failed") = v["state"].as_str() {
        return Err(WonderlandError::Upstream {
            provider: PROVIDER.to_string(),
            message: format!("task {state}"),
            status: None,
        });
    }

    // task_id may come back as a string or a number
    match &v["task_id"] {
        serde_json::Value::String(s) if !s.is_empty() => Ok(s.clone()),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        _ => Err(WonderlandError::SchemaParse(
            "vidu response missing 'task_id'".into(),
        )),
    }
}

#[async_trait]
impl ImageProvider for ViduProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn attempt(&self, instruction: &str, image_url: &str) -> AttemptOutcome {
        AttemptOutcome::from_result(self.submit(instruction, image_url).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_has_reference_image() {
        let body = build_body("cartoon", "https://img/x.jpg");
        assert_eq!(body["model"], "viduq1");
        assert_eq!(body["images"][0], "https://img/x.jpg");
        assert_eq!(body["aspect_ratio"], "1:1");
    }

    #[test]
    fn task_id_string_or_number() {
        assert_eq!(
            parse_task_id(br#"{"task_id":"abc","state":"created"}"#).unwrap(),
            "abc"
        );
        assert_eq!(parse_task_id(br#"{"task_id":8812345}"#).unwrap(), "8812345");
    }

    #[test]
    fn failed_state_is_upstream_error() {
        let err = parse_task_id(br#"{"task_id":"abc","state":"failed"}"#).unwrap_err();
        assert!(matches!(err, WonderlandError::Upstream { .. }));
    }

    #[test]
    fn missing_task_id_is_schema_error() {
        let err = parse_task_id(br#"{"state":"created"}"#).unwrap_err();
        assert!(matches!(err, WonderlandError::SchemaParse(_)));
    }
}
