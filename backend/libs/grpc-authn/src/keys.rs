//! Signing key sources for token verification

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::error::{AuthnError, Result};
use crate::store::SigningKeyService;

/// Forced refreshes for unknown key ids happen at most this often
pub const MIN_FORCED_REFRESH: Duration = Duration::from_secs(30);

/// Where verification keys come from; fixed at construction
#[derive(Clone)]
pub enum KeySource {
    /// Keys held by a local key service, no outbound calls
    InProc(Arc<dyn SigningKeyService>),
    /// Keys served by a JWKS endpoint
    Remote(RemoteKeySet),
}

impl KeySource {
    pub fn is_remote(&self) -> bool {
        matches!(self, KeySource::Remote(_))
    }

    /// Key for `kid`, or the only key when the token names none
    pub async fn find_key(&self, kid: Option<&str>) -> Result<Option<Jwk>> {
        match self {
            KeySource::InProc(service) => {
                let keys = service
                    .get_jwks()
                    .await
                    .context("loading local signing keys")
                    .map_err(AuthnError::Backend)?;
                Ok(select_key(&keys, kid))
            }
            KeySource::Remote(remote) => {
                let keys = remote.keys(false).await?;
                if let Some(key) = select_key(&keys, kid) {
                    return Ok(Some(key));
                }
                debug!(kid, "key id not in cached set, refreshing");
                let keys = remote.keys(true).await?;
                Ok(select_key(&keys, kid))
            }
        }
    }
}

fn select_key(keys: &JwkSet, kid: Option<&str>) -> Option<Jwk> {
    match kid {
        Some(kid) => keys.find(kid).cloned(),
        None if keys.keys.len() == 1 => keys.keys.first().cloned(),
        None => None,
    }
}

struct CachedKeys {
    keys: Arc<JwkSet>,
    fetched_at: Instant,
}

/// Outcome of the latest fetch, shared with callers that queued behind it
#[derive(Default)]
struct RefreshState {
    attempted_at: Option<Instant>,
    failure: Option<String>,
}

struct RemoteInner {
    client: reqwest::Client,
    url: String,
    ttl: Duration,
    cache: RwLock<Option<CachedKeys>>,
    /// Held for the duration of a fetch; at most one is in flight
    refresh: Mutex<RefreshState>,
}

/// JWKS endpoint client with a TTL cache
#[derive(Clone)]
pub struct RemoteKeySet {
    inner: Arc<RemoteInner>,
}

impl RemoteKeySet {
    pub fn new(
        url: impl Into<String>,
        ttl: Duration,
        request_timeout: Duration,
        insecure_skip_verify: bool,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .danger_accept_invalid_certs(insecure_skip_verify)
            .build()
            .map_err(|e| AuthnError::Config(format!("building JWKS client: {e}")))?;

        Ok(Self {
            inner: Arc::new(RemoteInner {
                client,
                url: url.into(),
                ttl,
                cache: RwLock::new(None),
                refresh: Mutex::new(RefreshState::default()),
            }),
        })
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// Cached key set, fetching when stale
    ///
    /// `force` refetches unless the last attempt is younger than
    /// `MIN_FORCED_REFRESH`. Callers arriving during a fetch wait for it and
    /// share its outcome. When a refresh fails the previous key set keeps
    /// being served.
    pub async fn keys(&self, force: bool) -> Result<Arc<JwkSet>> {
        if !force {
            if let Some(keys) = self.cached(self.inner.ttl).await {
                return Ok(keys);
            }
        }

        let requested_at = Instant::now();
        let mut state = self.inner.refresh.lock().await;

        // A fetch finished while we waited for the lock
        if state.attempted_at.is_some_and(|at| at >= requested_at) {
            return self.last_outcome(&state).await;
        }

        if force {
            let min_interval = MIN_FORCED_REFRESH.min(self.inner.ttl);
            if state.attempted_at.is_some_and(|at| at.elapsed() < min_interval) {
                return self.last_outcome(&state).await;
            }
        } else if let Some(keys) = self.cached(self.inner.ttl).await {
            return Ok(keys);
        }

        let fetched = self.fetch().await;
        state.attempted_at = Some(Instant::now());

        match fetched {
            Ok(keys) => {
                let keys = Arc::new(keys);
                info!(url = %self.inner.url, count = keys.keys.len(), "fetched signing keys");
                *self.inner.cache.write().await = Some(CachedKeys {
                    keys: keys.clone(),
                    fetched_at: Instant::now(),
                });
                state.failure = None;
                Ok(keys)
            }
            Err(err) => {
                let reason = format!("{err:#}");
                match self.stale().await {
                    Some(keys) => {
                        warn!(
                            url = %self.inner.url,
                            error = %reason,
                            "signing key refresh failed, serving previous keys"
                        );
                        state.failure = Some(reason);
                        Ok(keys)
                    }
                    None => {
                        state.failure = Some(reason);
                        Err(AuthnError::Backend(err))
                    }
                }
            }
        }
    }

    async fn cached(&self, max_age: Duration) -> Option<Arc<JwkSet>> {
        self.inner
            .cache
            .read()
            .await
            .as_ref()
            .filter(|cached| cached.fetched_at.elapsed() < max_age)
            .map(|cached| cached.keys.clone())
    }

    async fn stale(&self) -> Option<Arc<JwkSet>> {
        self.inner
            .cache
            .read()
            .await
            .as_ref()
            .map(|cached| cached.keys.clone())
    }

    async fn last_outcome(&self, state: &RefreshState) -> Result<Arc<JwkSet>> {
        if let Some(keys) = self.stale().await {
            return Ok(keys);
        }
        let reason = state.failure.as_deref().unwrap_or("no signing keys fetched");
        Err(AuthnError::Backend(anyhow::anyhow!("{reason}")))
    }

    async fn fetch(&self) -> anyhow::Result<JwkSet> {
        self.inner
            .client
            .get(&self.inner.url)
            .send()
            .await
            .context("fetching signing keys")?
            .error_for_status()
            .context("fetching signing keys")?
            .json::<JwkSet>()
            .await
            .context("decoding signing keys")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MockSigningKeyService;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Accepts connections and never answers
    async fn silent_endpoint() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        format!("http://{addr}/jwks")
    }

    /// Serves `body` on the first request and 500 afterwards
    async fn flaky_endpoint(body: String) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let first = counter.fetch_add(1, Ordering::SeqCst) == 0;
                let body = body.clone();
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 4096];
                    let mut read = Vec::new();
                    while !read.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => read.extend_from_slice(&buf[..n]),
                        }
                    }
                    let (status, body) = if first {
                        ("200 OK", body)
                    } else {
                        ("500 Internal Server Error", String::new())
                    };
                    let response = format!(
                        "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        (format!("http://{addr}/jwks"), hits)
    }

    fn key_set(kids: &[&str]) -> JwkSet {
        let keys: Vec<_> = kids
            .iter()
            .map(|kid| {
                serde_json::json!({
                    "kty": "oct",
                    "kid": kid,
                    "alg": "HS256",
                    "k": "Z3JwYy1hdXRobi10ZXN0LWhtYWMtc2VjcmV0LTAx"
                })
            })
            .collect();
        serde_json::from_value(serde_json::json!({ "keys": keys })).unwrap()
    }

    #[test]
    fn test_select_key() {
        let single = key_set(&["a"]);
        assert!(select_key(&single, Some("a")).is_some());
        assert!(select_key(&single, None).is_some());
        assert!(select_key(&single, Some("b")).is_none());

        let several = key_set(&["a", "b"]);
        assert!(select_key(&several, None).is_none());
        assert_eq!(
            select_key(&several, Some("b")).unwrap().common.key_id.as_deref(),
            Some("b")
        );
    }

    #[tokio::test]
    async fn test_inproc_source() {
        let mut service = MockSigningKeyService::new();
        service.expect_get_jwks().returning(|| Ok(key_set(&["local"])));

        let source = KeySource::InProc(Arc::new(service));
        assert!(!source.is_remote());
        assert!(source.find_key(Some("local")).await.unwrap().is_some());
        assert!(source.find_key(Some("other")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_inproc_failure_is_backend_error() {
        let mut service = MockSigningKeyService::new();
        service
            .expect_get_jwks()
            .returning(|| Err(anyhow::anyhow!("key store sealed")));

        let source = KeySource::InProc(Arc::new(service));
        let err = source.find_key(None).await.unwrap_err();
        assert!(matches!(err, AuthnError::Backend(_)));
    }

    #[tokio::test]
    async fn test_remote_unreachable_is_backend_error() {
        let remote = RemoteKeySet::new(
            "http://127.0.0.1:1/jwks",
            Duration::from_secs(60),
            Duration::from_secs(1),
            false,
        )
        .unwrap();

        let err = KeySource::Remote(remote).find_key(Some("a")).await.unwrap_err();
        assert!(matches!(err, AuthnError::Backend(_)));
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_timeout() {
        let timeout = Duration::from_millis(500);
        let remote =
            RemoteKeySet::new(silent_endpoint().await, Duration::from_secs(60), timeout, false)
                .unwrap();

        let started = Instant::now();
        let (a, b, c, d) = tokio::join!(
            remote.keys(false),
            remote.keys(false),
            remote.keys(false),
            remote.keys(false)
        );
        let elapsed = started.elapsed();

        for result in [a, b, c, d] {
            assert!(matches!(result, Err(AuthnError::Backend(_))));
        }
        assert!(elapsed < timeout * 2, "callers queued for {elapsed:?}");
    }

    #[tokio::test]
    async fn test_failed_refresh_serves_previous_keys() {
        let body = serde_json::to_string(&key_set(&["a"])).unwrap();
        let (url, hits) = flaky_endpoint(body).await;
        let remote = RemoteKeySet::new(url, Duration::ZERO, Duration::from_secs(2), false).unwrap();

        let first = remote.keys(false).await.unwrap();
        let second = remote.keys(false).await.unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert!(second.find("a").is_some());
        assert!(Arc::ptr_eq(&first, &second));
    }
}
