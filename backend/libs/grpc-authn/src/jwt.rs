//! Identity-token authentication
//!
//! Every call carries an identity token in `x-grafana-id` naming the user or
//! service account the call acts for. With a remote key source the calling
//! service must also present an access token in `x-access-token`, verified
//! first and checked against the allowed audiences.
//!
//! The organization comes from the `grafana-orgid` header rather than from a
//! token claim.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::de::DeserializeOwned;
use tonic::metadata::MetadataMap;
use tracing::{debug, warn};

use crate::authenticator::Authenticator;
use crate::claims::{namespace_matches, TokenClaims};
use crate::error::{AuthnError, Result};
use crate::identity::{AuthenticatedIdentity, Requester};
use crate::keys::KeySource;
use crate::metadata::{self, ACCESS_TOKEN, ID_TOKEN};
use crate::permissions::PermissionResolver;
use crate::store::{IdentityQuery, IdentityService};

pub const DEFAULT_ALGORITHMS: [Algorithm; 2] = [Algorithm::RS256, Algorithm::ES256];

const INVALID_TOKEN: &str = "invalid token";

#[derive(Clone)]
pub struct JwtAuthenticator {
    keys: KeySource,
    identities: Arc<dyn IdentityService>,
    allowed_algorithms: Vec<Algorithm>,
    allowed_audiences: Vec<String>,
    permissions: Option<PermissionResolver>,
}

impl JwtAuthenticator {
    pub fn new(keys: KeySource, identities: Arc<dyn IdentityService>) -> Self {
        Self {
            keys,
            identities,
            allowed_algorithms: DEFAULT_ALGORITHMS.to_vec(),
            allowed_audiences: Vec::new(),
            permissions: None,
        }
    }

    pub fn with_algorithms(mut self, algorithms: impl IntoIterator<Item = Algorithm>) -> Self {
        self.allowed_algorithms = algorithms.into_iter().collect();
        self
    }

    /// Audiences accepted on access tokens
    pub fn with_audiences<I, S>(mut self, audiences: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_audiences = audiences.into_iter().map(Into::into).collect();
        self
    }

    /// Resolve permissions for every authenticated identity
    pub fn with_permissions(mut self, permissions: PermissionResolver) -> Self {
        self.permissions = Some(permissions);
        self
    }

    async fn verify<C: DeserializeOwned>(&self, token: &str, audiences: Option<&[String]>) -> Result<C> {
        let header = jsonwebtoken::decode_header(token).map_err(|e| {
            warn!(error = %e, "unreadable token header");
            AuthnError::Unauthenticated(INVALID_TOKEN)
        })?;

        if !self.allowed_algorithms.contains(&header.alg) {
            warn!(alg = ?header.alg, "token signed with disallowed algorithm");
            return Err(AuthnError::Unauthenticated(INVALID_TOKEN));
        }

        let jwk = self
            .keys
            .find_key(header.kid.as_deref())
            .await?
            .ok_or_else(|| {
                warn!(kid = ?header.kid, "no signing key for token");
                AuthnError::Unauthenticated(INVALID_TOKEN)
            })?;

        let key = DecodingKey::from_jwk(&jwk).map_err(|e| {
            warn!(kid = ?header.kid, error = %e, "unusable signing key");
            AuthnError::Unauthenticated(INVALID_TOKEN)
        })?;

        let mut validation = Validation::new(header.alg);
        validation.set_required_spec_claims(&["exp", "sub"]);
        match audiences {
            Some(audiences) => validation.set_audience(audiences),
            None => validation.validate_aud = false,
        }

        jsonwebtoken::decode::<C>(token, &key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                warn!(error = %e, "token verification failed");
                AuthnError::Unauthenticated(INVALID_TOKEN)
            })
    }
}

#[async_trait]
impl Authenticator for JwtAuthenticator {
    async fn authenticate(&self, metadata: &mut MetadataMap) -> Result<Requester> {
        let access_token = if self.keys.is_remote() {
            let token = metadata::single_value(metadata, ACCESS_TOKEN);
            metadata::strip(metadata, ACCESS_TOKEN);
            Some(token?)
        } else {
            None
        };
        let id_token = metadata::single_value(metadata, ID_TOKEN)?;

        let access = if let Some(access_token) = access_token {
            let claims: TokenClaims = self
                .verify(&access_token, Some(self.allowed_audiences.as_slice()))
                .await?;
            Some(claims)
        } else {
            None
        };

        let claims: TokenClaims = self.verify(&id_token, None).await?;
        let (namespace, id) = claims.subject().ok_or_else(|| {
            warn!(subject = %claims.sub, "identity token subject has unsupported namespace");
            AuthnError::Unauthenticated(INVALID_TOKEN)
        })?;

        if let Some(access) = &access {
            if !namespace_matches(access.namespace.as_deref(), claims.namespace.as_deref()) {
                warn!(
                    caller = %access.sub,
                    granted = ?access.namespace,
                    requested = ?claims.namespace,
                    "access token namespace does not cover identity token"
                );
                return Err(AuthnError::PermissionDenied("namespace mismatch"));
            }
        }

        let org_id = metadata::org_id(metadata)?;

        let identity = self
            .identities
            .get_signed_in_identity(&IdentityQuery { id, org_id })
            .await
            .context("looking up token identity")
            .map_err(AuthnError::Backend)?
            .ok_or_else(|| {
                warn!(%namespace, id, org_id, "token identity not found");
                AuthnError::Unauthenticated(INVALID_TOKEN)
            })?;

        if identity.namespace != namespace {
            warn!(%namespace, found = %identity.namespace, id, "identity namespace mismatch");
            return Err(AuthnError::Unauthenticated(INVALID_TOKEN));
        }
        if identity.is_disabled {
            warn!(%namespace, id, "identity is disabled");
            return Err(AuthnError::PermissionDenied("identity disabled"));
        }

        let mut authenticated = match &self.permissions {
            Some(resolver) => resolver.resolve(identity).await?,
            None => AuthenticatedIdentity::new(identity, None),
        };
        if let Some(access) = access {
            authenticated = authenticated.with_acting_service(access.sub);
        }

        debug!(
            identity = %authenticated.identity().typed_id(),
            org_id,
            acting_service = authenticated.acting_service(),
            "identity token authenticated"
        );

        Ok(Requester::Identity(Arc::new(authenticated)))
    }
}
