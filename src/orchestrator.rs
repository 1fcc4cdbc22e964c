use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::dispatch::dashscope::DashScopeProvider;
use crate::dispatch::gemini::{GeminiProvider, GeminiRewriter};
use crate::dispatch::vidu::ViduProvider;
use crate::dispatch::{AttemptOutcome, HttpClient, ImageProvider, ProviderSet};
use crate::error::WonderlandError;
use crate::localize::SourceLocalizer;
use crate::prompt::{self, MAX_ATTEMPTS, ProviderSlot};
use crate::rewrite::{self, PromptRewriter};
use crate::storage::{ImageStore, OUTPUT_URL_PREFIX};
use crate::tasks::{TaskGuard, TaskRegistry};

/// Body of `POST /generate-image/`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub model_name: Option<String>,
    pub prompt: Option<String>,
    pub base_image_url: Option<String>,
}

impl GenerateRequest {
    pub fn base_image_url(&self) -> Result<&str, WonderlandError> {
        self.base_image_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or(WonderlandError::MissingField("base_image_url"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationOutput {
    pub task_id: String,
    pub image_paths: Vec<String>,
    /// Provider that produced the images, or `"mock"`.
    pub provider: String,
    /// Provider calls made, 0 in mock mode.
    pub attempts: usize,
}

/// Drives the fixed seven-attempt schedule across the provider slots.
///
/// Without a [`ProviderSet`] the orchestrator runs in mock mode and never
/// touches the network.
pub struct Orchestrator {
    registry: Arc<TaskRegistry>,
    output: Arc<ImageStore>,
    providers: Option<ProviderSet>,
    localizer: Option<SourceLocalizer>,
    rewriter: Option<Arc<dyn PromptRewriter>>,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<TaskRegistry>,
        output: Arc<ImageStore>,
        providers: Option<ProviderSet>,
    ) -> Self {
        Self {
            registry,
            output,
            providers,
            localizer: None,
            rewriter: None,
        }
    }

    pub fn with_localizer(mut self, localizer: SourceLocalizer) -> Self {
        self.localizer = Some(localizer);
        self
    }

    pub fn with_rewriter(mut self, rewriter: Arc<dyn PromptRewriter>) -> Self {
        self.rewriter = Some(rewriter);
        self
    }

    /// Wire up the real vendor adapters from configuration.
    pub fn from_config(config: &Config, registry: Arc<TaskRegistry>) -> Self {
        let http = HttpClient::new();
        let output = Arc::new(ImageStore::new(&config.ai_photos_dir, OUTPUT_URL_PREFIX));

        let providers = config.dashscope.clone().map(|creds| {
            let primary: Arc<dyn ImageProvider> = Arc::new(DashScopeProvider::new(
                http.clone(),
                Arc::clone(&output),
                creds,
                config.dashscope_model.clone(),
            ));
            let secondary = config.gemini.clone().map(|creds| {
                Arc::new(GeminiProvider::new(http.clone(), Arc::clone(&output), creds))
                    as Arc<dyn ImageProvider>
            });
            let tertiary = config.vidu.clone().map(|creds| {
                Arc::new(ViduProvider::new(http.clone(), creds)) as Arc<dyn ImageProvider>
            });
            ProviderSet {
                primary,
                secondary,
                tertiary,
            }
        });

        let source_store = ImageStore::new(
            &config.original_photos_dir,
            config.public_original_base_url.clone(),
        );
        let mut orchestrator = Self::new(registry, output, providers).with_localizer(
            SourceLocalizer::new(http.clone(), source_store, config.public_host.clone()),
        );

        if let Some(creds) = config.gemini.clone().filter(|_| config.prompt_rewrite) {
            orchestrator = orchestrator.with_rewriter(Arc::new(GeminiRewriter::new(http, creds)));
        }
        orchestrator
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    pub fn mock_mode(&self) -> bool {
        self.providers.is_none()
    }

    /// Validate, register, and run a request. The task record is released
    /// before this returns, whatever the outcome.
    pub async fn generate(
        &self,
        request: GenerateRequest,
    ) -> Result<GenerationOutput, WonderlandError> {
        request.base_image_url()?;
        let guard = self.registry.register(request.clone());
        self.run(guard, &request).await
    }

    /// Run an already registered task. Dropping `guard` on return removes
    /// the record, including on early returns and panics.
    pub async fn run(
        &self,
        guard: TaskGuard,
        request: &GenerateRequest,
    ) -> Result<GenerationOutput, WonderlandError> {
        let task_id = guard.id().to_string();
        let source_url = request.base_image_url()?;

        let Some(providers) = &self.providers else {
            let path = self.output.save_mock_placeholder().await?;
            tracing::info!(task_id = %task_id, path = %path, "mock mode: generated placeholder");
            return Ok(GenerationOutput {
                task_id,
                image_paths: vec![path],
                provider: "mock".to_string(),
                attempts: 0,
            });
        };

        let image_url = match &self.localizer {
            Some(localizer) => localizer.publicize(source_url).await?,
            None => source_url.to_string(),
        };

        let base = prompt::effective_prompt(request.prompt.as_deref());
        let rewritten = rewrite::rewrite_prompt(self.rewriter.as_deref(), base).await;
        let variants = prompt::variants(rewritten.prompt());

        let mut errors: Vec<String> = Vec::new();
        for index in 0..MAX_ATTEMPTS {
            if guard.is_cancelled() {
                tracing::warn!(task_id = %task_id, attempt = index + 1, "task cancelled, stopping");
                return Err(WonderlandError::Cancelled(task_id));
            }

            let provider = providers.resolve(ProviderSlot::for_attempt(index));
            let instruction =
                prompt::build_instruction(prompt::variant_for_attempt(&variants, index));
            let attempt = index + 1;

            tracing::info!(
                task_id = %task_id,
                provider = provider.name(),
                attempt,
                "starting attempt"
            );
            match provider.attempt(&instruction, &image_url).await {
                AttemptOutcome::Success { images } => {
                    tracing::info!(
                        task_id = %task_id,
                        provider = provider.name(),
                        attempt,
                        images = images.len(),
                        "generation succeeded"
                    );
                    return Ok(GenerationOutput {
                        task_id,
                        image_paths: images,
                        provider: provider.name().to_string(),
                        attempts: attempt,
                    });
                }
                AttemptOutcome::Failure { message } => {
                    tracing::warn!(
                        task_id = %task_id,
                        provider = provider.name(),
                        attempt,
                        "attempt failed: {message}"
                    );
                    errors.push(format!("{} attempt {attempt}: {message}", provider.name()));
                    if let Some(delay) = prompt::backoff_after(index) {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        tracing::error!(task_id = %task_id, "all {MAX_ATTEMPTS} attempts failed");
        Err(WonderlandError::Exhausted {
            attempts: MAX_ATTEMPTS,
            message: errors.join("; "),
        })
    }
}
