pub mod dashscope;
pub mod gemini;
pub mod vidu;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};

use crate::error::WonderlandError;

/// Cap on any provider or image response body.
pub const MAX_RESPONSE_BYTES: usize = 20 * 1024 * 1024; // 20MB

/// Per-request timeout for vendor calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Image fetches (source images, vendor result URLs) are quicker.
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Normalized result of one provider call. Adapters convert whatever the
/// vendor returns into this before the orchestrator sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success { images: Vec<String> },
    Failure { message: String },
}

impl AttemptOutcome {
    pub fn from_result(result: Result<Vec<String>, WonderlandError>) -> Self {
        match result {
            Ok(images) if images.is_empty() => Self::Failure {
                message: "provider returned no images".to_string(),
            },
            Ok(images) => Self::Success { images },
            Err(e) => Self::Failure {
                message: e.user_message(),
            },
        }
    }
}

/// One image-generation vendor.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Run one generation with a fully built instruction against a publicly
    /// reachable source image.
    async fn attempt(&self, instruction: &str, image_url: &str) -> AttemptOutcome;
}

/// Shared reqwest client plus the response checks every adapter needs.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    pub fn new() -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(4)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("failed to build tuned HTTP client, using defaults: {e}");
                Client::new()
            });
        Self { client }
    }

    pub fn post(&self, url: &str) -> RequestBuilder {
        self.client.post(url).timeout(REQUEST_TIMEOUT)
    }

    /// Send a vendor request and return the (size-capped) body of a 2xx
    /// response, mapping failure statuses onto structured errors.
    pub async fn send_checked(
        &self,
        request: RequestBuilder,
        provider: &str,
    ) -> Result<Vec<u8>, WonderlandError> {
        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(WonderlandError::RateLimited {
                provider: provider.to_string(),
            });
        }

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(WonderlandError::AuthFailed {
                provider: provider.to_string(),
                message: format!("{status}"),
            });
        }

        if !status.is_success() {
            let body = read_capped(response, provider).await.unwrap_or_default();
            let text = String::from_utf8_lossy(&body);
            let preview: String = text.chars().take(500).collect();
            return Err(WonderlandError::Upstream {
                provider: provider.to_string(),
                message: format!("{status}: {preview}"),
                status: Some(status.as_u16()),
            });
        }

        read_capped(response, provider).await
    }

    /// Download raw bytes from an arbitrary URL.
    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, WonderlandError> {
        let response = self
            .client
            .get(url)
            .timeout(FETCH_TIMEOUT)
            .send()
            .await?
            .error_for_status()?;
        read_capped(response, "image host").await
    }
}

async fn read_capped(response: Response, provider: &str) -> Result<Vec<u8>, WonderlandError> {
    if response
        .content_length()
        .is_some_and(|len| len as usize > MAX_RESPONSE_BYTES)
    {
        return Err(WonderlandError::Upstream {
            provider: provider.to_string(),
            message: format!("response too large (max {MAX_RESPONSE_BYTES} bytes)"),
            status: None,
        });
    }

    let bytes = response.bytes().await.map_err(|e| WonderlandError::Upstream {
        provider: provider.to_string(),
        message: format!("failed to read response body: {e}"),
        status: None,
    })?;

    if bytes.len() > MAX_RESPONSE_BYTES {
        return Err(WonderlandError::Upstream {
            provider: provider.to_string(),
            message: format!(
                "response too large: {} bytes (max {MAX_RESPONSE_BYTES})",
                bytes.len()
            ),
            status: None,
        });
    }

    Ok(bytes.to_vec())
}

/// The three slots of the fallback schedule. Secondary and tertiary are
/// optional; an unconfigured slot resolves to the primary provider.
#[derive(Clone)]
pub struct ProviderSet {
    pub primary: Arc<dyn ImageProvider>,
    pub secondary: Option<Arc<dyn ImageProvider>>,
    pub tertiary: Option<Arc<dyn ImageProvider>>,
}

impl ProviderSet {
    pub fn resolve(&self, slot: crate::prompt::ProviderSlot) -> &Arc<dyn ImageProvider> {
        use crate::prompt::ProviderSlot;
        match slot {
            ProviderSlot::Primary => &self.primary,
            ProviderSlot::Secondary => self.secondary.as_ref().unwrap_or(&self.primary),
            ProviderSlot::Tertiary => self.tertiary.as_ref().unwrap_or(&self.primary),
        }
    }
}
