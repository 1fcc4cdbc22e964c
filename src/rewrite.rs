use async_trait::async_trait;

use crate::error::WonderlandError;

/// Auxiliary text model that turns a terse user prompt into a richer one.
#[async_trait]
pub trait PromptRewriter: Send + Sync {
    async fn rewrite(&self, original: &str) -> Result<String, WonderlandError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewriteOutcome {
    Rewritten(String),
    Unchanged { original: String, reason: String },
}

impl RewriteOutcome {
    pub fn prompt(&self) -> &str {
        match self {
            Self::Rewritten(text) => text,
            Self::Unchanged { original, .. } => original,
        }
    }
}

/// Rewriting is best-effort: any failure keeps the original prompt.
pub async fn rewrite_prompt(
    rewriter: Option<&dyn PromptRewriter>,
    original: &str,
) -> RewriteOutcome {
    let Some(rewriter) = rewriter else {
        return RewriteOutcome::Unchanged {
            original: original.to_string(),
            reason: "rewriting disabled".to_string(),
        };
    };

    match rewriter.rewrite(original).await {
        Ok(text) if !text.trim().is_empty() => {
            tracing::info!(original, rewritten = %text, "prompt rewritten");
            RewriteOutcome::Rewritten(text.trim().to_string())
        }
        Ok(_) => {
            tracing::warn!("prompt rewriter returned empty text, keeping original");
            RewriteOutcome::Unchanged {
                original: original.to_string(),
                reason: "empty rewrite".to_string(),
            }
        }
        Err(e) => {
            tracing::warn!("prompt rewriting failed, keeping original: {e}");
            RewriteOutcome::Unchanged {
                original: original.to_string(),
                reason: e.user_message(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Result<&'static str, &'static str>);

    #[async_trait]
    impl PromptRewriter for Fixed {
        async fn rewrite(&self, _original: &str) -> Result<String, WonderlandError> {
            self.0
                .map(str::to_string)
                .map_err(|e| WonderlandError::Other(e.to_string()))
        }
    }

    #[tokio::test]
    async fn successful_rewrite_is_used() {
        let rewriter = Fixed(Ok("  a detailed prompt "));
        let outcome = rewrite_prompt(Some(&rewriter), "short").await;
        assert_eq!(outcome, RewriteOutcome::Rewritten("a detailed prompt".into()));
        assert_eq!(outcome.prompt(), "a detailed prompt");
    }

    #[tokio::test]
    async fn failure_keeps_original() {
        let rewriter = Fixed(Err("quota exceeded"));
        let outcome = rewrite_prompt(Some(&rewriter), "short").await;
        assert_eq!(
            outcome,
            RewriteOutcome::Unchanged {
                original: "short".into(),
                reason: "quota exceeded".into()
            }
        );
    }

    #[tokio::test]
    async fn empty_rewrite_keeps_original() {
        let rewriter = Fixed(Ok("   "));
        let outcome = rewrite_prompt(Some(&rewriter), "short").await;
        assert_eq!(outcome.prompt(), "short");
    }

    #[tokio::test]
    async fn no_rewriter_keeps_original() {
        let outcome = rewrite_prompt(None, "short").await;
        assert!(matches!(outcome, RewriteOutcome::Unchanged { .. }));
        assert_eq!(outcome.prompt(), "short");
    }
}
