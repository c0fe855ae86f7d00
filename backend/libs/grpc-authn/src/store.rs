//! Collaborators the authenticators depend on
//!
//! Persistence lives elsewhere; these traits are the seams it plugs into.
//! Every method may block on I/O and is cancelled by dropping its future.

use access_control::Permission;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::jwk::JwkSet;

use crate::identity::SignedInIdentity;

/// Stored record for an issued API key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub id: i64,
    pub org_id: i64,
    pub service_account_id: Option<i64>,
    pub is_revoked: bool,
    pub expires: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires.is_some_and(|expires| expires <= now)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityQuery {
    pub id: i64,
    pub org_id: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PermissionOptions {
    /// Bypass any cache the permission service keeps
    pub reload_cache: bool,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// `Ok(None)` when no credential has this hash
    async fn get_credential_by_hash(&self, hash: &str) -> anyhow::Result<Option<Credential>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityService: Send + Sync {
    async fn get_signed_in_identity(
        &self,
        query: &IdentityQuery,
    ) -> anyhow::Result<Option<SignedInIdentity>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PermissionService: Send + Sync {
    async fn get_user_permissions(
        &self,
        identity: &SignedInIdentity,
        options: &PermissionOptions,
    ) -> anyhow::Result<Vec<Permission>>;
}

/// Signing keys held by a local key service
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SigningKeyService: Send + Sync {
    async fn get_jwks(&self) -> anyhow::Result<JwkSet>;
}
