//! The handle workflow: check the current handle, check that a vanity name is
//! free, claim it, and answer the provider's domain verification lookup.
//!
//! ## Resolver failures
//!
//! The external resolver is consulted twice per claim. An unreachable or
//! misbehaving resolver never fails a request on its own: it reads as "not
//! found" when checking the current handle and as "available" when checking a
//! new name. Both cases are logged at `warn` and flagged on the returned
//! [`Checked`] so callers can count them.

use crate::{
    BindAction, Denylist, Did, Error, HandleBinding, HandleLabel, HandleResolver, HandleStore,
    Result, label_from_host,
};

/// Answer from a step that consults the external resolver.
#[derive(Debug)]
pub struct Checked<T> {
    pub value: T,
    /// The resolver could not be reached and `value` is the fallback answer.
    pub resolver_failed: bool,
}

impl<T> Checked<T> {
    fn answered(value: T) -> Self {
        Self {
            value,
            resolver_failed: false,
        }
    }

    fn fallback(value: T) -> Self {
        Self {
            value,
            resolver_failed: true,
        }
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

#[derive(Clone, Debug)]
pub struct HandleRegistry {
    store: HandleStore,
    resolver: HandleResolver,
    denylist: Denylist,
    domain: String,
}

impl HandleRegistry {
    pub fn new(
        store: HandleStore,
        resolver: HandleResolver,
        denylist: Denylist,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            store,
            resolver,
            denylist,
            domain: domain.into(),
        }
    }

    /// The vanity domain handles are issued under.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn store(&self) -> &HandleStore {
        &self.store
    }

    /// Sanitizes user input into a label under this registry's domain.
    pub fn label(&self, raw: &str) -> Result<HandleLabel> {
        HandleLabel::parse_under(raw, &self.domain)
    }

    /// Resolves the user's current handle (e.g. `alice.bsky.social`) to the
    /// identity that owns it.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn current_identity(&self, handle: &str) -> Checked<Result<Did>> {
        let handle = handle.trim();
        if handle.is_empty() {
            return Checked::answered(Err(Error::NotFound));
        }
        match self.resolver.resolve(handle).await {
            Ok(Some(did)) => Checked::answered(Ok(did)),
            Ok(None) => Checked::answered(Err(Error::NotFound)),
            Err(e) => {
                tracing::warn!(handle, error = %e, "resolver unavailable, treating handle as unknown");
                Checked::fallback(Err(Error::NotFound))
            }
        }
    }

    /// Checks whether `raw` can be claimed and returns its qualified name.
    ///
    /// Reserved names are rejected before the resolver is consulted. A name
    /// that already resolves to some identity is taken.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn check_availability(&self, raw: &str) -> Checked<Result<String>> {
        let label = match self.label(raw) {
            Ok(label) => label,
            Err(e) => return Checked::answered(Err(e)),
        };
        let qualified = label.qualified(&self.domain);

        if self.denylist.is_denied(label.as_str(), &self.domain) {
            return Checked::answered(Err(Error::Denied { handle: qualified }));
        }

        match self.resolver.resolve(&qualified).await {
            Ok(Some(_)) => Checked::answered(Err(Error::Taken { handle: qualified })),
            Ok(None) => Checked::answered(Ok(qualified)),
            Err(e) => {
                tracing::warn!(handle = %qualified, error = %e, "resolver unavailable, treating handle as available");
                Checked::fallback(Ok(qualified))
            }
        }
    }

    /// Binds the sanitized `raw` name to `did`, replacing the identity's
    /// previous name if it had one.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn claim(&self, did: &str, raw: &str) -> Result<(HandleBinding, BindAction)> {
        let did = Did::new(did)?;
        let label = self.label(raw)?;

        if self.denylist.is_denied(label.as_str(), &self.domain) {
            return Err(Error::Denied {
                handle: label.qualified(&self.domain),
            });
        }

        let (binding, action) = self.store.bind(&did, &label).await?;
        tracing::info!(
            did = %binding.did,
            handle = %label.qualified(&self.domain),
            ?action,
            "Handle claimed"
        );
        Ok((binding, action))
    }

    /// Identity bound to the subdomain named by a `Host` header value.
    pub async fn resolve_host(&self, host: Option<&str>) -> Result<Did> {
        let label = host.and_then(label_from_host).ok_or(Error::NotFound)?;
        self.store.lookup(label).await?.ok_or(Error::NotFound)
    }

    pub async fn ping(&self) -> Result<()> {
        self.store.ping().await
    }
}
