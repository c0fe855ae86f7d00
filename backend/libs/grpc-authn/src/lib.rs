//! Authentication for gRPC services
//!
//! Three credential schemes sit behind one `Authenticator` contract:
//!
//! - **Legacy API keys**: `authorization: Bearer glsa_...`, decoded with
//!   `apikey-codec`, hashed and looked up in a credential store. Only
//!   enabled admin service accounts are admitted.
//! - **Identity tokens**: a JWT in `x-grafana-id` verified against local
//!   (`inproc`) or JWKS-served (`remote`) keys. Remote mode also requires
//!   the calling service's access token in `x-access-token`.
//! - **HTTP Basic**: a static username and password compared in constant
//!   time.
//!
//! `GrpcAuthn` picks one of them from `AuthnSettings` at startup and
//! `AuthnLayer` runs it for every call, unary or streaming. Handlers read
//! the result through `RequesterExt`.
//!
//! ## Server
//!
//! ```rust,no_run
//! use grpc_authn::{AuthnLayer, AuthnMetrics, AuthnSettings, Collaborators, GrpcAuthn};
//!
//! # fn example(collaborators: Collaborators) -> anyhow::Result<()> {
//! let settings = AuthnSettings::from_env()?;
//! let metrics = AuthnMetrics::register(prometheus::default_registry())?;
//! let authn = GrpcAuthn::from_settings(&settings, collaborators)?.with_metrics(metrics);
//!
//! // tonic::transport::Server::builder()
//! //     .layer(AuthnLayer::new(authn))
//! //     .add_service(FolderServiceServer::new(folders));
//! # let _ = AuthnLayer::new(authn);
//! # Ok(())
//! # }
//! ```
//!
//! ## Errors
//!
//! Malformed or unverifiable credentials are `Unauthenticated` and identified
//! callers lacking rights are `PermissionDenied`. Collaborator failures are
//! `Unavailable`. The reason a credential was rejected is only logged.

mod authenticator;
mod basic;
mod claims;
mod client;
mod config;
mod error;
mod extensions;
mod identity;
mod jwt;
mod keys;
mod layer;
mod legacy;
pub mod metadata;
mod metrics;
mod permissions;
mod store;

pub use authenticator::{Authenticator, AuthnStrategy, Collaborators, GrpcAuthn};
pub use basic::BasicAuthenticator;
pub use claims::{namespace_matches, TokenClaims, WILDCARD_NAMESPACE};
pub use client::CredentialsInterceptor;
pub use config::{AuthenticatorKind, AuthnSettings, JwtMode};
pub use error::{AuthnError, Result};
pub use extensions::RequesterExt;
pub use identity::{
    parse_subject, AuthenticatedIdentity, IdentityNamespace, Requester, Role, SignedInIdentity,
};
pub use jwt::{JwtAuthenticator, DEFAULT_ALGORITHMS};
pub use keys::{KeySource, RemoteKeySet, MIN_FORCED_REFRESH};
pub use layer::{AuthnLayer, AuthnService};
pub use legacy::LegacyAuthenticator;
pub use metrics::AuthnMetrics;
pub use permissions::PermissionResolver;
pub use store::{
    Credential, CredentialStore, IdentityQuery, IdentityService, PermissionOptions,
    PermissionService, SigningKeyService,
};

// Re-exported so implementors of the store traits need no direct dependency
pub use async_trait::async_trait;
pub use jsonwebtoken::jwk::JwkSet;
pub use jsonwebtoken::Algorithm;
