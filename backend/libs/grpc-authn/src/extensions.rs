//! Handler-side access to the authenticated requester

use access_control::{Evaluator, ScopeResolvers};
use async_trait::async_trait;
use tonic::{Request, Status};
use tracing::{debug, warn};

use crate::identity::{AuthenticatedIdentity, Requester};

/// Extension trait for reading what `AuthnLayer` attached to a request
///
/// ```rust,no_run
/// use access_control::Evaluator;
/// use grpc_authn::RequesterExt;
/// use tonic::{Request, Response, Status};
///
/// async fn delete_folder(request: Request<()>) -> Result<Response<()>, Status> {
///     request.require_access(&Evaluator::permission("folders:delete", ["folders:uid:abc"]))?;
///     Ok(Response::new(()))
/// }
/// ```
#[async_trait]
pub trait RequesterExt {
    /// `Unauthenticated` if no authenticator ran for this call
    fn requester(&self) -> Result<&Requester, Status>;

    /// The user or service account; static-credential callers are rejected
    fn identity(&self) -> Result<&AuthenticatedIdentity, Status>;

    /// Identity whose resolved permissions satisfy `evaluator`
    fn require_access(&self, evaluator: &Evaluator) -> Result<&AuthenticatedIdentity, Status>;

    /// Like `require_access`, resolving attribute scopes first
    async fn require_access_resolved(
        &self,
        evaluator: &Evaluator,
        resolvers: &ScopeResolvers,
    ) -> Result<&AuthenticatedIdentity, Status>;
}

#[async_trait]
impl<T: Send + Sync> RequesterExt for Request<T> {
    fn requester(&self) -> Result<&Requester, Status> {
        self.extensions()
            .get::<Requester>()
            .ok_or_else(|| Status::unauthenticated("not authenticated"))
    }

    fn identity(&self) -> Result<&AuthenticatedIdentity, Status> {
        self.requester()?
            .identity()
            .ok_or_else(|| Status::permission_denied("identity required"))
    }

    fn require_access(&self, evaluator: &Evaluator) -> Result<&AuthenticatedIdentity, Status> {
        let identity = self.identity()?;
        if !identity.has_access(evaluator) {
            debug!(
                identity = %identity.identity().typed_id(),
                %evaluator,
                "access denied"
            );
            return Err(Status::permission_denied("access denied"));
        }
        Ok(identity)
    }

    async fn require_access_resolved(
        &self,
        evaluator: &Evaluator,
        resolvers: &ScopeResolvers,
    ) -> Result<&AuthenticatedIdentity, Status> {
        let identity = self.identity()?;
        let allowed = identity
            .has_access_resolved(evaluator, resolvers)
            .await
            .map_err(|e| {
                warn!(error = %e, %evaluator, "scope resolution failed");
                Status::internal("resolving scopes")
            })?;
        if !allowed {
            debug!(
                identity = %identity.identity().typed_id(),
                %evaluator,
                "access denied"
            );
            return Err(Status::permission_denied("access denied"));
        }
        Ok(identity)
    }
}
