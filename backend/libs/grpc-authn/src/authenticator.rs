use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tonic::metadata::MetadataMap;
use tracing::{debug, warn};

use crate::basic::BasicAuthenticator;
use crate::config::{AuthenticatorKind, AuthnSettings, JwtMode};
use crate::error::{AuthnError, Result};
use crate::identity::Requester;
use crate::jwt::JwtAuthenticator;
use crate::keys::{KeySource, RemoteKeySet};
use crate::legacy::LegacyAuthenticator;
use crate::metrics::AuthnMetrics;
use crate::permissions::PermissionResolver;
use crate::store::{CredentialStore, IdentityService, PermissionService, SigningKeyService};

/// Authenticate one call from its incoming metadata
///
/// On success the credential headers the authenticator consumed have been
/// removed from `metadata`. Implementations hold no per-call state.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, metadata: &mut MetadataMap) -> Result<Requester>;
}

/// The authenticator selected at construction
#[derive(Clone)]
pub enum AuthnStrategy {
    Legacy(LegacyAuthenticator),
    Jwt(JwtAuthenticator),
    Basic(BasicAuthenticator),
}

impl AuthnStrategy {
    pub fn kind(&self) -> AuthenticatorKind {
        match self {
            AuthnStrategy::Legacy(_) => AuthenticatorKind::Legacy,
            AuthnStrategy::Jwt(_) => AuthenticatorKind::Jwt,
            AuthnStrategy::Basic(_) => AuthenticatorKind::Basic,
        }
    }
}

/// Services the authenticators call out to
///
/// Only the ones the configured authenticator needs must be set.
#[derive(Clone, Default)]
pub struct Collaborators {
    pub credentials: Option<Arc<dyn CredentialStore>>,
    pub identities: Option<Arc<dyn IdentityService>>,
    pub permissions: Option<Arc<dyn PermissionService>>,
    pub signing_keys: Option<Arc<dyn SigningKeyService>>,
}

fn required<T: ?Sized>(value: &Option<Arc<T>>, name: &str) -> Result<Arc<T>> {
    value
        .clone()
        .ok_or_else(|| AuthnError::Config(format!("{name} is required by this authenticator")))
}

/// Configured authenticator plus instrumentation
#[derive(Clone)]
pub struct GrpcAuthn {
    strategy: AuthnStrategy,
    metrics: Option<AuthnMetrics>,
}

impl GrpcAuthn {
    pub fn new(strategy: AuthnStrategy) -> Self {
        Self {
            strategy,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: AuthnMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Build the authenticator named by `settings`
    pub fn from_settings(settings: &AuthnSettings, collaborators: Collaborators) -> Result<Self> {
        settings
            .validate()
            .map_err(|e| AuthnError::Config(format!("{e:#}")))?;

        let strategy = match settings.authenticator {
            AuthenticatorKind::Legacy => AuthnStrategy::Legacy(LegacyAuthenticator::new(
                required(&collaborators.credentials, "credential store")?,
                required(&collaborators.identities, "identity service")?,
                PermissionResolver::new(required(&collaborators.permissions, "permission service")?),
            )),
            AuthenticatorKind::Jwt => {
                let keys = match settings.mode {
                    JwtMode::InProc => {
                        KeySource::InProc(required(&collaborators.signing_keys, "signing key service")?)
                    }
                    JwtMode::Remote => {
                        let url = settings.signing_keys_url.clone().ok_or_else(|| {
                            AuthnError::Config("signing keys URL is required".to_string())
                        })?;
                        KeySource::Remote(RemoteKeySet::new(
                            url,
                            settings.jwks_cache_ttl(),
                            settings.jwks_request_timeout(),
                            settings.insecure_skip_verify,
                        )?)
                    }
                };
                let algorithms = settings
                    .algorithms()
                    .map_err(|e| AuthnError::Config(format!("{e:#}")))?;

                let mut jwt = JwtAuthenticator::new(
                    keys,
                    required(&collaborators.identities, "identity service")?,
                )
                .with_algorithms(algorithms)
                .with_audiences(settings.allowed_audiences.iter().cloned());
                if let Some(permissions) = &collaborators.permissions {
                    jwt = jwt.with_permissions(PermissionResolver::new(permissions.clone()));
                }
                AuthnStrategy::Jwt(jwt)
            }
            AuthenticatorKind::Basic => AuthnStrategy::Basic(BasicAuthenticator::new(
                settings.basic_username.clone().unwrap_or_default(),
                settings.basic_password.clone().unwrap_or_default(),
            )),
        };

        if settings.insecure_skip_verify {
            warn!("TLS verification of the signing key endpoint is disabled");
        }
        debug!(
            authenticator = strategy.kind().as_str(),
            mode = ?settings.mode,
            "gRPC authentication configured"
        );

        Ok(Self::new(strategy))
    }

    pub fn kind(&self) -> AuthenticatorKind {
        self.strategy.kind()
    }
}

#[async_trait]
impl Authenticator for GrpcAuthn {
    async fn authenticate(&self, metadata: &mut MetadataMap) -> Result<Requester> {
        let started = Instant::now();

        let result = match &self.strategy {
            AuthnStrategy::Legacy(auth) => auth.authenticate(metadata).await,
            AuthnStrategy::Jwt(auth) => auth.authenticate(metadata).await,
            AuthnStrategy::Basic(auth) => auth.authenticate(metadata).await,
        };

        let kind = self.kind().as_str();
        if let Some(metrics) = &self.metrics {
            let outcome = match &result {
                Ok(_) => "success",
                Err(e) => e.outcome(),
            };
            metrics.record(kind, outcome, started.elapsed().as_secs_f64());
        }

        if let Err(AuthnError::Backend(e) | AuthnError::Internal(e)) = &result {
            warn!(authenticator = kind, error = %format!("{e:#}"), "authentication failed");
        }

        result
    }
}
