//! Claims carried by identity and access tokens

use serde::{Deserialize, Serialize};

use crate::identity::{parse_subject, IdentityNamespace};

/// Namespace value granting access to every namespace
pub const WILDCARD_NAMESPACE: &str = "*";

/// Registered claims plus the namespace the token was issued for
///
/// Audience is validated by the decoder and not kept here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// `<namespace>:<id>` for identity tokens, the calling service for access tokens
    pub sub: String,

    pub exp: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// Tenant namespace, e.g. `default` or `stacks-12`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl TokenClaims {
    pub fn subject(&self) -> Option<(IdentityNamespace, i64)> {
        parse_subject(&self.sub)
    }
}

/// Whether an access token issued for `granted` may act in `requested`
///
/// Identity tokens without a namespace are not restricted.
pub fn namespace_matches(granted: Option<&str>, requested: Option<&str>) -> bool {
    match (granted, requested) {
        (_, None) => true,
        (Some(WILDCARD_NAMESPACE), Some(_)) => true,
        (Some(granted), Some(requested)) => granted == requested,
        (None, Some(_)) => false,
    }
}
