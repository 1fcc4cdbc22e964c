use std::env;
use std::path::PathBuf;

use crate::localize::is_valid_public_host;

/// Placeholder shipped in `.env.example`; treated the same as a missing key.
pub const DASHSCOPE_PLACEHOLDER_KEY: &str = "your_dashscope_api_key_here";

pub const DEFAULT_DASHSCOPE_BASE_URL: &str = "https://dashscope.aliyuncs.com";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_VIDU_BASE_URL: &str = "https://api.vidu.com";
pub const DEFAULT_DASHSCOPE_MODEL: &str = "qwen-image-edit";
pub const DEFAULT_PUBLIC_HOST: &str = "us.liyao.space";

#[derive(Clone)]
pub struct ProviderCredentials {
    pub api_key: String,
    pub base_url: String,
}

impl std::fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderCredentials")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    /// `None` means mock mode.
    pub dashscope: Option<ProviderCredentials>,
    pub dashscope_model: String,
    pub gemini: Option<ProviderCredentials>,
    pub vidu: Option<ProviderCredentials>,
    pub prompt_rewrite: bool,
    pub ai_photos_dir: PathBuf,
    pub original_photos_dir: PathBuf,
    pub public_original_base_url: String,
    pub public_host: String,
    pub bind_addr: String,
    pub static_bind_addr: String,
    pub cors_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup (tests pass a map).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let dashscope = match get("DASHSCOPE_API_KEY") {
            Some(key) if key != DASHSCOPE_PLACEHOLDER_KEY => Some(ProviderCredentials {
                api_key: key,
                base_url: or("DASHSCOPE_BASE_URL", DEFAULT_DASHSCOPE_BASE_URL),
            }),
            _ => {
                tracing::warn!("DASHSCOPE_API_KEY not set, running in mock mode");
                None
            }
        };

        let gemini = get("GEMINI_API_KEY").map(|key| ProviderCredentials {
            api_key: key,
            base_url: or("GEMINI_BASE_URL", DEFAULT_GEMINI_BASE_URL),
        });
        if gemini.is_none() {
            tracing::warn!("GEMINI_API_KEY not set, secondary slot falls back to dashscope");
        }

        let vidu = get("VIDU_API_KEY").map(|key| ProviderCredentials {
            api_key: key,
            base_url: or("VIDU_BASE_URL", DEFAULT_VIDU_BASE_URL),
        });
        if vidu.is_none() {
            tracing::warn!("VIDU_API_KEY not set, tertiary slot falls back to dashscope");
        }

        let prompt_rewrite = !matches!(
            get("PROMPT_REWRITE").map(|v| v.to_lowercase()).as_deref(),
            Some("0" | "false" | "off" | "no")
        );

        let public_host = match get("PUBLIC_HOST") {
            Some(host) if is_valid_public_host(host.trim()) => host.trim().to_string(),
            Some(host) => {
                tracing::warn!(
                    public_host = %host,
                    "PUBLIC_HOST is not a valid host, using {DEFAULT_PUBLIC_HOST}"
                );
                DEFAULT_PUBLIC_HOST.to_string()
            }
            None => DEFAULT_PUBLIC_HOST.to_string(),
        };

        let cors_origins = or("CORS_ORIGINS", "http://localhost:3000")
            .split(',')
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();

        Config {
            dashscope,
            dashscope_model: or("DASHSCOPE_MODEL", DEFAULT_DASHSCOPE_MODEL),
            gemini,
            vidu,
            prompt_rewrite,
            ai_photos_dir: PathBuf::from(or("AI_PHOTOS_DIR", "../ai-photos")),
            original_photos_dir: PathBuf::from(or(
                "ORIGINAL_PHOTOS_DIR",
                "../original-photos-cache",
            )),
            public_original_base_url: or(
                "PUBLIC_ORIGINAL_BASE_URL",
                "http://us.liyao.space:8080/original-images",
            ),
            public_host,
            bind_addr: or("BIND_ADDR", "0.0.0.0:8000"),
            static_bind_addr: or("STATIC_BIND_ADDR", "0.0.0.0:8080"),
            cors_origins,
        }
    }

    pub fn mock_mode(&self) -> bool {
        self.dashscope.is_none()
    }
}
