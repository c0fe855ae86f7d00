use std::sync::Arc;

use access_control::group_scopes_by_action;
use anyhow::Context;
use tracing::debug;

use crate::error::{AuthnError, Result};
use crate::identity::{AuthenticatedIdentity, SignedInIdentity};
use crate::store::{PermissionOptions, PermissionService};

/// Explicit "load grants for this identity" step
///
/// Produces a new `AuthenticatedIdentity`; the looked-up identity is not
/// modified and nothing is cached across calls.
#[derive(Clone)]
pub struct PermissionResolver {
    permissions: Arc<dyn PermissionService>,
}

impl PermissionResolver {
    pub fn new(permissions: Arc<dyn PermissionService>) -> Self {
        Self { permissions }
    }

    pub async fn resolve(&self, identity: SignedInIdentity) -> Result<AuthenticatedIdentity> {
        if let Some(known) = identity.permissions.get(&identity.org_id) {
            let known = known.clone();
            return Ok(AuthenticatedIdentity::new(identity, Some(known)));
        }

        let permissions = self
            .permissions
            .get_user_permissions(&identity, &PermissionOptions::default())
            .await
            .context("fetching identity permissions")
            .map_err(AuthnError::Backend)?;

        debug!(
            identity = %identity.typed_id(),
            org_id = identity.org_id,
            count = permissions.len(),
            "resolved permissions"
        );

        let grouped = group_scopes_by_action(&permissions);
        Ok(AuthenticatedIdentity::new(identity, Some(grouped)))
    }
}
