//! Re-hosting of source images that vendors cannot reach.
//!
//! Upload flows hand us `http://localhost:...` URLs. Vendors fetch the
//! source image themselves, so those are downloaded, written to the static
//! directory, and replaced with a public URL before any provider call.

use std::net::IpAddr;

use url::{Host, Url};

use crate::dispatch::HttpClient;
use crate::error::WonderlandError;
use crate::storage::{ImageKind, ImageStore};

/// True for URLs pointing at this machine (localhost or a loopback address).
pub fn is_loopback_url(raw: &str) -> bool {
    let Ok(url) = Url::parse(raw) else {
        return false;
    };
    match url.host() {
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(ip)) => IpAddr::V4(ip).is_loopback(),
        Some(Host::Ipv6(ip)) => IpAddr::V6(ip).is_loopback(),
        None => false,
    }
}

/// True when `host` can stand in for a loopback host in an http URL.
pub fn is_valid_public_host(host: &str) -> bool {
    replace_host("http://localhost/", host).is_some()
}

/// Swap the host of a URL, keeping scheme, port, path and query.
pub fn replace_host(raw: &str, host: &str) -> Option<String> {
    let mut url = Url::parse(raw).ok()?;
    url.set_host(Some(host)).ok()?;
    Some(url.to_string())
}

pub struct SourceLocalizer {
    http: HttpClient,
    store: ImageStore,
    public_host: String,
}

impl SourceLocalizer {
    /// `store` must be served at a publicly reachable URL prefix.
    pub fn new(http: HttpClient, store: ImageStore, public_host: impl Into<String>) -> Self {
        Self {
            http,
            store,
            public_host: public_host.into(),
        }
    }

    /// Return a URL vendors can fetch. Non-loopback URLs pass through; a
    /// failed re-host falls back to rewriting the host. A loopback URL is
    /// never returned.
    pub async fn publicize(&self, image_url: &str) -> Result<String, WonderlandError> {
        if !is_loopback_url(image_url) {
            return Ok(image_url.to_string());
        }

        tracing::info!(url = image_url, "re-hosting loopback source image");
        let result = async {
            let bytes = self.http.fetch_bytes(image_url).await?;
            self.store.save_bytes(ImageKind::Original, "jpg", &bytes).await
        }
        .await;

        match result {
            Ok(public_url) => {
                tracing::info!(url = %public_url, "source image re-hosted");
                Ok(public_url)
            }
            Err(e) => match replace_host(image_url, &self.public_host) {
                Some(fallback) => {
                    tracing::warn!(fallback = %fallback, "failed to re-host source image: {e}");
                    Ok(fallback)
                }
                None => {
                    tracing::error!(
                        url = image_url,
                        public_host = %self.public_host,
                        "failed to re-host source image and public host is invalid: {e}"
                    );
                    Err(WonderlandError::SourceUnreachable(image_url.to_string()))
                }
            },
        }
    }
}
