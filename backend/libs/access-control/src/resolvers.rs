//! Scope attribute resolvers
//!
//! Services register a resolver per scope prefix at startup (for example
//! `datasources:name:` → look the datasource up by name and return its uid
//! scope). Before evaluating, callers rewrite an evaluator through the
//! org-bound mutator returned by [`ScopeResolvers::attribute_mutator`].

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, warn};

use crate::error::ResolutionError;
use crate::scope::scope_prefix;

const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30);
const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Turns one attribute scope into concrete scopes for an organization
#[async_trait]
pub trait ScopeAttributeResolver: Send + Sync {
    async fn resolve(&self, org_id: i64, scope: &str) -> anyhow::Result<Vec<String>>;
}

/// Per-scope rewrite applied by [`crate::Evaluator::mutate_scopes`]
///
/// `Ok(None)` means nothing claims the scope and it stays as is.
#[async_trait]
pub trait ScopeAttributeMutator: Send + Sync {
    async fn mutate(&self, scope: &str) -> Result<Option<Vec<String>>, ResolutionError>;
}

/// Adapter so plain async closures can be registered as resolvers
pub struct FnResolver<F> {
    f: F,
}

/// Wrap `f(org_id, scope)` as a [`ScopeAttributeResolver`]
pub fn resolver_fn<F, Fut>(f: F) -> FnResolver<F>
where
    F: Fn(i64, String) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Vec<String>>> + Send,
{
    FnResolver { f }
}

#[async_trait]
impl<F, Fut> ScopeAttributeResolver for FnResolver<F>
where
    F: Fn(i64, String) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Vec<String>>> + Send,
{
    async fn resolve(&self, org_id: i64, scope: &str) -> anyhow::Result<Vec<String>> {
        (self.f)(org_id, scope.to_string()).await
    }
}

struct CachedScopes {
    scopes: Vec<String>,
    expires_at: Instant,
    generation: u64,
}

impl CachedScopes {
    fn is_live(&self, generation: u64, now: Instant) -> bool {
        self.generation == generation && self.expires_at > now
    }
}

type CacheKey = (i64, String);

struct Registry {
    resolvers: DashMap<String, Arc<dyn ScopeAttributeResolver>>,
    cache: DashMap<CacheKey, CachedScopes>,
    cache_ttl: Duration,
    max_entries: usize,
    /// Bumped on every registration; entries from older generations are dead
    generation: AtomicU64,
}

impl Registry {
    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn cached(&self, key: &CacheKey) -> Option<Vec<String>> {
        let entry = self.cache.get(key)?;
        if entry.is_live(self.generation(), Instant::now()) {
            return Some(entry.scopes.clone());
        }
        drop(entry);
        self.cache.remove(key);
        None
    }

    fn store(&self, key: CacheKey, scopes: Vec<String>, generation: u64) {
        if self.cache_ttl.is_zero() || self.max_entries == 0 {
            return;
        }
        // Resolved with a resolver that has since been replaced
        if self.generation() != generation {
            return;
        }

        if self.cache.len() >= self.max_entries {
            self.enforce_limits();
        }

        self.cache.insert(
            key,
            CachedScopes {
                scopes,
                expires_at: Instant::now() + self.cache_ttl,
                generation,
            },
        );
    }

    /// Drop dead entries, then the first tenth of the map if still full
    fn enforce_limits(&self) {
        let generation = self.generation();
        let now = Instant::now();
        self.cache.retain(|_, entry| entry.is_live(generation, now));

        if self.cache.len() < self.max_entries {
            return;
        }

        let evict_count = (self.cache.len() / 10).max(1);
        warn!(
            entries = self.cache.len(),
            evict_count, "scope resolution cache full, evicting entries"
        );
        let keys: Vec<CacheKey> = self
            .cache
            .iter()
            .take(evict_count)
            .map(|entry| entry.key().clone())
            .collect();
        for key in keys {
            self.cache.remove(&key);
        }
    }
}

/// Registry of attribute resolvers keyed by scope prefix
///
/// Cheap to clone; clones share the same registry. Registration may happen
/// while requests are being served: the last registration for a prefix wins
/// and becomes visible to subsequent lookups.
#[derive(Clone)]
pub struct ScopeResolvers {
    inner: Arc<Registry>,
}

impl Default for ScopeResolvers {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeResolvers {
    pub fn new() -> Self {
        Self::with_cache_ttl(DEFAULT_CACHE_TTL)
    }

    /// A zero TTL disables result caching
    pub fn with_cache_ttl(cache_ttl: Duration) -> Self {
        Self::with_cache_limits(cache_ttl, DEFAULT_MAX_ENTRIES)
    }

    /// Cache resolutions for `cache_ttl`, holding at most `max_entries`
    pub fn with_cache_limits(cache_ttl: Duration, max_entries: usize) -> Self {
        Self {
            inner: Arc::new(Registry {
                resolvers: DashMap::new(),
                cache: DashMap::new(),
                cache_ttl,
                max_entries,
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Register `resolver` for scopes starting with `prefix`
    ///
    /// Replaces any resolver already registered under `prefix` and drops
    /// cached resolutions.
    pub fn add_scope_attribute_resolver(
        &self,
        prefix: impl Into<String>,
        resolver: impl ScopeAttributeResolver + 'static,
    ) {
        let prefix = prefix.into();
        debug!(prefix = %prefix, "registering scope attribute resolver");

        // The resolver must be visible before the generation moves on
        self.inner.resolvers.insert(prefix, Arc::new(resolver));
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.cache.clear();
    }

    /// Mutator bound to one organization
    pub fn attribute_mutator(&self, org_id: i64) -> OrgScopeMutator {
        OrgScopeMutator {
            resolvers: self.clone(),
            org_id,
        }
    }

    async fn resolve(&self, org_id: i64, scope: &str) -> Result<Option<Vec<String>>, ResolutionError> {
        let key = (org_id, scope.to_string());
        if let Some(scopes) = self.inner.cached(&key) {
            return Ok(Some(scopes));
        }

        let generation = self.inner.generation();
        let prefix = scope_prefix(scope);
        // Clone the handle out so no map guard lives across the await
        let resolver = match self.inner.resolvers.get(&prefix) {
            Some(entry) => Arc::clone(entry.value()),
            None => return Ok(None),
        };

        let scopes = resolver
            .resolve(org_id, scope)
            .await
            .map_err(|e| e.context(format!("resolving scope {scope:?} in org {org_id}")))?;

        debug!(org_id, scope, resolved = scopes.len(), "resolved scope attribute");

        self.inner.store(key, scopes.clone(), generation);

        Ok(Some(scopes))
    }
}

/// [`ScopeAttributeMutator`] for one organization
#[derive(Clone)]
pub struct OrgScopeMutator {
    resolvers: ScopeResolvers,
    org_id: i64,
}

impl OrgScopeMutator {
    pub fn org_id(&self) -> i64 {
        self.org_id
    }
}

#[async_trait]
impl ScopeAttributeMutator for OrgScopeMutator {
    async fn mutate(&self, scope: &str) -> Result<Option<Vec<String>>, ResolutionError> {
        self.resolvers.resolve(self.org_id, scope).await
    }
}
