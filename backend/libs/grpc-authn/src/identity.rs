//! Identities produced by authenticators
//!
//! `SignedInIdentity` is what the identity lookup returns. Authenticators
//! wrap it into an immutable `AuthenticatedIdentity` (optionally carrying
//! the resolved permission map) and attach a `Requester` to the request.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use access_control::{Evaluator, ResolutionError, ScopeResolvers, ScopesByAction};
use serde::{Deserialize, Serialize};

/// Kind of principal behind an identity token subject
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IdentityNamespace {
    User,
    ServiceAccount,
}

impl IdentityNamespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityNamespace::User => "user",
            IdentityNamespace::ServiceAccount => "service-account",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(IdentityNamespace::User),
            "service-account" => Some(IdentityNamespace::ServiceAccount),
            _ => None,
        }
    }
}

impl fmt::Display for IdentityNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Split a `<namespace>:<id>` subject
///
/// Only the user and service-account namespaces are accepted.
pub fn parse_subject(subject: &str) -> Option<(IdentityNamespace, i64)> {
    let (namespace, id) = subject.split_once(':')?;
    let namespace = IdentityNamespace::parse(namespace)?;
    let id = id.parse::<i64>().ok()?;
    Some((namespace, id))
}

/// Organization role, ordered by privilege
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Role {
    #[default]
    None,
    Viewer,
    Editor,
    Admin,
}

impl Role {
    /// Whether holding `self` implies holding `other`
    pub fn includes(self, other: Role) -> bool {
        self >= other
    }
}

/// Identity as returned by the identity lookup
#[derive(Debug, Clone, PartialEq)]
pub struct SignedInIdentity {
    pub id: i64,
    pub namespace: IdentityNamespace,
    pub org_id: i64,
    pub login: String,
    pub org_role: Role,
    pub is_disabled: bool,
    /// Permission maps the lookup already knows, keyed by org id
    pub permissions: HashMap<i64, ScopesByAction>,
}

impl SignedInIdentity {
    /// `<namespace>:<id>`
    pub fn typed_id(&self) -> String {
        format!("{}:{}", self.namespace, self.id)
    }
}

/// Identity attached to an authenticated request; never mutated afterwards
#[derive(Debug, Clone)]
pub struct AuthenticatedIdentity {
    identity: SignedInIdentity,
    permissions: Option<ScopesByAction>,
    acting_service: Option<String>,
}

impl AuthenticatedIdentity {
    pub fn new(identity: SignedInIdentity, permissions: Option<ScopesByAction>) -> Self {
        Self {
            identity,
            permissions,
            acting_service: None,
        }
    }

    /// Record the service that presented this identity on the user's behalf
    pub fn with_acting_service(mut self, subject: impl Into<String>) -> Self {
        self.acting_service = Some(subject.into());
        self
    }

    pub fn identity(&self) -> &SignedInIdentity {
        &self.identity
    }

    pub fn id(&self) -> i64 {
        self.identity.id
    }

    pub fn org_id(&self) -> i64 {
        self.identity.org_id
    }

    pub fn namespace(&self) -> IdentityNamespace {
        self.identity.namespace
    }

    /// Grants in the identity's org, if they were resolved
    pub fn permissions(&self) -> Option<&ScopesByAction> {
        self.permissions.as_ref()
    }

    pub fn acting_service(&self) -> Option<&str> {
        self.acting_service.as_deref()
    }

    /// Evaluate against the resolved grants; unresolved grants deny
    pub fn has_access(&self, evaluator: &Evaluator) -> bool {
        self.permissions
            .as_ref()
            .is_some_and(|granted| evaluator.evaluate(granted))
    }

    /// Resolve attribute scopes for this identity's org, then evaluate
    pub async fn has_access_resolved(
        &self,
        evaluator: &Evaluator,
        resolvers: &ScopeResolvers,
    ) -> Result<bool, ResolutionError> {
        if self.permissions.is_none() {
            return Ok(false);
        }
        let mutator = resolvers.attribute_mutator(self.org_id());
        let resolved = evaluator.mutate_scopes(&mutator).await?;
        Ok(self.has_access(&resolved))
    }
}

/// Whoever passed authentication, stored in request extensions
#[derive(Debug, Clone)]
pub enum Requester {
    /// A user or service account
    Identity(Arc<AuthenticatedIdentity>),
    /// A caller holding the static basic-auth credentials
    Static { username: String },
}

impl Requester {
    pub fn identity(&self) -> Option<&AuthenticatedIdentity> {
        match self {
            Requester::Identity(identity) => Some(identity),
            Requester::Static { .. } => None,
        }
    }
}
