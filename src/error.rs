use thiserror::Error;

#[derive(Debug, Error)]
pub enum WonderlandError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid request body: {0}")]
    InvalidBody(String),

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("task {0} was cancelled")]
    Cancelled(String),

    #[error("all {attempts} attempts failed: {message}")]
    Exhausted { attempts: usize, message: String },

    #[error("rate limited by {provider}")]
    RateLimited { provider: String },

    #[error("upstream error from {provider}: {message}")]
    Upstream {
        provider: String,
        message: String,
        status: Option<u16>,
    },

    #[error("auth failed for {provider}: {message}")]
    AuthFailed { provider: String, message: String },

    #[error("source image {0} is not reachable by providers")]
    SourceUnreachable(String),

    #[error("schema parse error: {0}")]
    SchemaParse(String),

    #[error("no image in response from {provider}")]
    NoImage { provider: String },

    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image encoding error: {0}")]
    Image(#[from] image::ImageError),

    #[error("{0}")]
    Other(String),
}

impl WonderlandError {
    /// Extract provider name from structured error variants.
    pub fn provider(&self) -> Option<&str> {
        match self {
            Self::RateLimited { provider } => Some(provider),
            Self::Upstream { provider, .. } => Some(provider),
            Self::AuthFailed { provider, .. } => Some(provider),
            Self::NoImage { provider } => Some(provider),
            _ => None,
        }
    }

    /// True for errors caused by the caller rather than the service or a vendor.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::MissingField(_) | Self::InvalidBody(_) | Self::TaskNotFound(_)
        )
    }

    /// Message safe to hand back to HTTP clients. Transport errors are
    /// collapsed so internal URLs never leak.
    pub fn user_message(&self) -> String {
        match self {
            Self::MissingField(field) => format!("missing required field: {field}"),
            Self::InvalidBody(reason) => format!("invalid request body: {reason}"),
            Self::TaskNotFound(id) => format!("task not found: {id}"),
            Self::Cancelled(id) => format!("task {id} was cancelled"),
            Self::Exhausted { attempts, message } => {
                format!("generation failed after {attempts} attempts: {message}")
            }
            Self::RateLimited { provider } => {
                format!("rate limited by {provider}, try again shortly")
            }
            Self::Upstream {
                provider, message, ..
            } => format!("upstream error from {provider}: {message}"),
            Self::AuthFailed { provider, message } => {
                format!("authentication failed for {provider}: {message}")
            }
            Self::SourceUnreachable(url) => {
                format!("source image {url} is not reachable by providers")
            }
            Self::SchemaParse(_) => "failed to parse provider response".to_string(),
            Self::NoImage { provider } => format!("{provider} returned no image"),
            Self::Request(_) => "request to provider failed".to_string(),
            Self::Io(_) => "failed to write image to storage".to_string(),
            Self::Image(_) => "failed to encode image".to_string(),
            Self::Other(msg) => msg.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_extracted_from_vendor_variants() {
        let err = WonderlandError::Upstream {
            provider: "dashscope".to_string(),
            message: "boom".to_string(),
            status: Some(500),
        };
        assert_eq!(err.provider(), Some("dashscope"));
        assert_eq!(WonderlandError::Other("x".into()).provider(), None);
    }

    #[test]
    fn client_errors_classified() {
        assert!(WonderlandError::MissingField("base_image_url").is_client_error());
        assert!(WonderlandError::TaskNotFound("abc".into()).is_client_error());
        assert!(WonderlandError::InvalidBody("bad json".into()).is_client_error());
        assert!(!WonderlandError::Cancelled("abc".into()).is_client_error());
        assert!(
            !WonderlandError::Exhausted {
                attempts: 7,
                message: "nope".into()
            }
            .is_client_error()
        );
    }

    #[test]
    fn schema_parse_message_is_sanitized() {
        let err = WonderlandError::SchemaParse("expected value at line 1 column 1".into());
        assert_eq!(err.user_message(), "failed to parse provider response");
    }
}
