//! HTTP client for the identity provider's handle resolution endpoint.
//!
//! Wraps `com.atproto.identity.resolveHandle`. The provider is a black box:
//! any 2xx answer with a `did` field is a successful resolution, any other
//! status means the handle does not resolve.

use crate::{Did, Error, Result};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

const RESOLVE_HANDLE_PATH: &str = "xrpc/com.atproto.identity.resolveHandle";

/// Default public resolver.
pub const DEFAULT_RESOLVER_URL: &str = "https://bsky.social";

#[derive(Deserialize)]
struct ResolveHandleResponse {
    did: String,
}

/// Resolves handles such as `alice.bsky.social` to their DID.
#[derive(Clone, Debug)]
pub struct HandleResolver {
    base_url: Url,
    http: Client,
}

impl HandleResolver {
    /// Create a resolver against `base_url` with the given request timeout.
    pub fn new(base_url: impl AsRef<str>, timeout: Duration) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Self::with_http_client(base_url, http)
    }

    /// Use an existing reqwest client.
    pub fn with_http_client(base_url: impl AsRef<str>, http: Client) -> Result<Self> {
        let mut url = Url::parse(base_url.as_ref()).map_err(|e| Error::InvalidRequest {
            reason: format!("invalid resolver url {:?}: {e}", base_url.as_ref()),
        })?;
        if !url.path().ends_with('/') {
            let mut path = url.path().trim_end_matches('/').to_owned();
            path.push('/');
            url.set_path(&path);
        }
        Ok(Self {
            base_url: url,
            http,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve `handle` to a DID.
    ///
    /// Returns `Ok(None)` when the provider answers with a non-2xx status and
    /// `Err(Error::Resolver)` when it cannot be reached or the body is not the
    /// expected JSON.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn resolve(&self, handle: &str) -> Result<Option<Did>> {
        let mut url = self
            .base_url
            .join(RESOLVE_HANDLE_PATH)
            .map_err(|e| Error::Resolver {
                context: e.to_string(),
            })?;
        url.query_pairs_mut().append_pair("handle", handle);

        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            tracing::debug!(%status, handle, "handle did not resolve");
            return Ok(None);
        }

        let body = response.json::<ResolveHandleResponse>().await?;
        Did::new(body.did).map(Some).map_err(|_| Error::Resolver {
            context: "resolver returned an empty did".to_string(),
        })
    }
}
