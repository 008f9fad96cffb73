//! External resource resolution with an origin allowlist.
//!
//! An external resource locator points the preview at a document the host
//! did not author. Resolving it means leaving the process, so it is the one
//! place the engine touches the network:
//! - Only origins on the allowlist can be fetched (empty allowlist = external
//!   resources disabled)
//! - GET only; redirects are followed manually and must stay on the same
//!   origin and on the allowlist
//! - A failure here is a load failure for the generation, never a crash

use anyhow::{anyhow, Result};
use reqwest::Client;
use url::Url;

const MAX_REDIRECTS: usize = 5;

/// Origin allowlist for external resource locators.
///
/// An origin is scheme + host + port, matched exactly.
#[derive(Debug, Clone, Default)]
pub struct ExternalFetchPolicy {
    pub allowed_origins: Vec<String>,
}

impl ExternalFetchPolicy {
    pub fn is_origin_allowed(&self, url: &Url) -> bool {
        if self.allowed_origins.is_empty() {
            return false;
        }
        let origin = url.origin().ascii_serialization();
        self.allowed_origins.iter().any(|allowed| origin == *allowed)
    }
}

/// Fetch the document text behind an external resource locator.
pub(crate) async fn fetch_external(locator: &str, policy: &ExternalFetchPolicy) -> Result<String> {
    fetch_inner(locator, policy, 0).await
}

async fn fetch_inner(locator: &str, policy: &ExternalFetchPolicy, hops: usize) -> Result<String> {
    let url = Url::parse(locator)
        .map_err(|e| anyhow!("invalid external resource locator '{}': {}", locator, e))?;

    if !policy.is_origin_allowed(&url) {
        return Err(anyhow!(
            "external resource blocked: origin '{}' is not in the allowlist",
            url.origin().ascii_serialization()
        ));
    }

    let client = Client::builder()
        // Redirects are followed manually so each hop can be re-checked.
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(|e| anyhow!("failed to create HTTP client: {}", e))?;

    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|e| anyhow!("external resource fetch failed: {}", e))?;

    let status = response.status();
    let final_url = response.url().clone();

    if status.is_redirection() {
        if hops >= MAX_REDIRECTS {
            return Err(anyhow!("external resource fetch: too many redirects"));
        }
        let location = response
            .headers()
            .get("location")
            .ok_or_else(|| anyhow!("redirect without a location header"))?
            .to_str()
            .map_err(|_| anyhow!("invalid redirect location"))?;
        let redirect_url = final_url
            .join(location)
            .map_err(|e| anyhow!("invalid redirect URL: {}", e))?;

        if redirect_url.origin() != url.origin() {
            return Err(anyhow!(
                "external resource blocked: redirect to different origin '{}'",
                redirect_url.origin().ascii_serialization()
            ));
        }

        return Box::pin(fetch_inner(redirect_url.as_str(), policy, hops + 1)).await;
    }

    if !status.is_success() {
        return Err(anyhow!(
            "external resource fetch failed with status {}",
            status
        ));
    }

    response
        .text()
        .await
        .map_err(|e| anyhow!("failed to read external resource body: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_matching() {
        let policy = ExternalFetchPolicy {
            allowed_origins: vec![
                "https://demos.example.com".to_string(),
                "http://localhost:3000".to_string(),
            ],
        };

        // Allowed
        assert!(policy.is_origin_allowed(&Url::parse("https://demos.example.com/a.html").unwrap()));
        assert!(policy.is_origin_allowed(&Url::parse("http://localhost:3000/demo").unwrap()));

        // Not allowed
        assert!(!policy.is_origin_allowed(&Url::parse("https://evil.com/a.html").unwrap()));
        assert!(!policy.is_origin_allowed(&Url::parse("http://demos.example.com/a.html").unwrap())); // http vs https
        assert!(!policy.is_origin_allowed(&Url::parse("https://demos.example.com:8080/").unwrap())); // different port
    }

    #[test]
    fn test_empty_allowlist_disables_external_resources() {
        let policy = ExternalFetchPolicy::default();
        assert!(!policy.is_origin_allowed(&Url::parse("https://anything.com").unwrap()));
    }

    #[tokio::test]
    async fn test_blocked_origin_fails_without_touching_the_network() {
        let err = fetch_external("https://blocked.example/x.html", &ExternalFetchPolicy::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not in the allowlist"));
    }

    #[tokio::test]
    async fn test_invalid_locator_is_rejected() {
        let policy = ExternalFetchPolicy {
            allowed_origins: vec!["https://demos.example.com".to_string()],
        };
        let err = fetch_external("not a url", &policy).await.unwrap_err();
        assert!(err.to_string().contains("invalid external resource locator"));
    }
}
