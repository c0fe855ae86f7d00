//! Service-account API key authentication
//!
//! Accepts `authorization: Bearer glsa_...` keys issued by `apikey-codec`,
//! looks the hashed key up in the credential store and only admits
//! enabled service accounts holding the admin role.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use tonic::metadata::MetadataMap;
use tracing::{debug, warn};

use crate::authenticator::Authenticator;
use crate::error::{AuthnError, Result};
use crate::identity::{Requester, Role};
use crate::metadata::{self, AUTHORIZATION, BEARER_PREFIX};
use crate::permissions::PermissionResolver;
use crate::store::{CredentialStore, IdentityQuery, IdentityService};

const INVALID_KEY: &str = "invalid API key";

#[derive(Clone)]
pub struct LegacyAuthenticator {
    credentials: Arc<dyn CredentialStore>,
    identities: Arc<dyn IdentityService>,
    permissions: PermissionResolver,
}

impl LegacyAuthenticator {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        identities: Arc<dyn IdentityService>,
        permissions: PermissionResolver,
    ) -> Self {
        Self {
            credentials,
            identities,
            permissions,
        }
    }
}

/// Token part of a bearer header, or `None` when the scheme or token is missing
fn bearer_token(header: &str) -> Option<&str> {
    header
        .strip_prefix(BEARER_PREFIX)
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[async_trait]
impl Authenticator for LegacyAuthenticator {
    async fn authenticate(&self, metadata: &mut MetadataMap) -> Result<Requester> {
        let header = metadata::single_value(metadata, AUTHORIZATION);
        // Removed before any verification so no outcome forwards the raw key
        metadata::strip(metadata, AUTHORIZATION);
        let header = header?;

        let token = bearer_token(&header).ok_or_else(|| {
            warn!("authorization header is not a bearer token");
            AuthnError::Unauthenticated("malformed credentials")
        })?;

        let key = apikey_codec::decode(token).map_err(|e| {
            warn!(reason = e.reason().unwrap_or("unknown"), "rejected API key");
            AuthnError::Unauthenticated(INVALID_KEY)
        })?;

        let hash = tokio::task::spawn_blocking(move || key.hash())
            .await
            .context("hashing API key")
            .map_err(AuthnError::Internal)?
            .map_err(|e| AuthnError::Internal(anyhow::Error::new(e).context("hashing API key")))?;

        let credential = self
            .credentials
            .get_credential_by_hash(&hash)
            .await
            .context("looking up credential by hash")
            .map_err(AuthnError::Backend)?
            .ok_or_else(|| {
                warn!("no credential for API key");
                AuthnError::Unauthenticated(INVALID_KEY)
            })?;

        if credential.is_revoked {
            warn!(credential_id = credential.id, "API key is revoked");
            return Err(AuthnError::Unauthenticated(INVALID_KEY));
        }
        if credential.is_expired(Utc::now()) {
            warn!(credential_id = credential.id, "API key is expired");
            return Err(AuthnError::Unauthenticated(INVALID_KEY));
        }

        let service_account_id = credential.service_account_id.ok_or_else(|| {
            warn!(
                credential_id = credential.id,
                "API key is not linked to a service account"
            );
            AuthnError::Unauthenticated(INVALID_KEY)
        })?;

        let query = IdentityQuery {
            id: service_account_id,
            org_id: credential.org_id,
        };
        let identity = self
            .identities
            .get_signed_in_identity(&query)
            .await
            .context("looking up service account")
            .map_err(AuthnError::Backend)?
            .ok_or_else(|| {
                warn!(service_account_id, "service account not found");
                AuthnError::Unauthenticated(INVALID_KEY)
            })?;

        if !identity.org_role.includes(Role::Admin) {
            warn!(
                service_account_id,
                role = ?identity.org_role,
                "service account lacks admin role"
            );
            return Err(AuthnError::PermissionDenied("admin role required"));
        }
        if identity.is_disabled {
            warn!(service_account_id, "service account is disabled");
            return Err(AuthnError::PermissionDenied("service account disabled"));
        }

        let authenticated = self.permissions.resolve(identity).await?;

        debug!(
            service_account_id,
            org_id = authenticated.org_id(),
            "API key authenticated"
        );

        Ok(Requester::Identity(Arc::new(authenticated)))
    }
}
