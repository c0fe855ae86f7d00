//! Transport metadata helpers
//!
//! gRPC metadata keys are case-insensitive; tonic normalizes them to lower
//! case, so lookups go through the lower-case constants below.

use tonic::metadata::MetadataMap;

use crate::error::{AuthnError, Result};

pub const AUTHORIZATION: &str = "authorization";
pub const ID_TOKEN: &str = "x-grafana-id";
pub const ACCESS_TOKEN: &str = "x-access-token";
pub const ORG_ID: &str = "grafana-orgid";

pub const BEARER_PREFIX: &str = "Bearer ";
pub const BASIC_PREFIX: &str = "Basic ";

/// Exactly one ASCII value for `key`
///
/// Absent, repeated and non-ASCII values are all `Unauthenticated`.
pub fn single_value(metadata: &MetadataMap, key: &'static str) -> Result<String> {
    let mut values = metadata.get_all(key).iter();

    let first = values
        .next()
        .ok_or(AuthnError::Unauthenticated("missing credentials"))?;
    if values.next().is_some() {
        return Err(AuthnError::Unauthenticated("malformed credentials"));
    }

    first
        .to_str()
        .map(str::to_owned)
        .map_err(|_| AuthnError::Unauthenticated("malformed credentials"))
}

/// Drop every value of `key` so it is not forwarded further
pub fn strip(metadata: &mut MetadataMap, key: &'static str) {
    metadata.remove(key);
}

/// Organization id the caller claims to act in
pub fn org_id(metadata: &MetadataMap) -> Result<i64> {
    let raw = single_value(metadata, ORG_ID)?;
    raw.trim().parse::<i64>().map_err(|e| {
        AuthnError::Internal(anyhow::Error::new(e).context(format!("parsing {ORG_ID} metadata")))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::metadata::{Ascii, MetadataKey, MetadataValue};

    #[test]
    fn test_single_value_missing() {
        let metadata = MetadataMap::new();
        assert!(matches!(
            single_value(&metadata, AUTHORIZATION),
            Err(AuthnError::Unauthenticated(_))
        ));
    }

    #[test]
    fn test_single_value_duplicate() {
        let mut metadata = MetadataMap::new();
        metadata.append(AUTHORIZATION, MetadataValue::from_static("Bearer a"));
        metadata.append(AUTHORIZATION, MetadataValue::from_static("Bearer b"));

        assert!(matches!(
            single_value(&metadata, AUTHORIZATION),
            Err(AuthnError::Unauthenticated(_))
        ));
    }

    #[test]
    fn test_single_value_case_insensitive_key() {
        let mut metadata = MetadataMap::new();
        let key: MetadataKey<Ascii> = MetadataKey::from_bytes(b"Authorization").unwrap();
        metadata.insert(key, MetadataValue::from_static("Bearer a"));

        assert_eq!(single_value(&metadata, AUTHORIZATION).unwrap(), "Bearer a");
    }

    #[test]
    fn test_strip_removes_all_values() {
        let mut metadata = MetadataMap::new();
        metadata.append(AUTHORIZATION, MetadataValue::from_static("Bearer a"));
        metadata.append(AUTHORIZATION, MetadataValue::from_static("Bearer b"));

        strip(&mut metadata, AUTHORIZATION);
        assert!(metadata.get(AUTHORIZATION).is_none());
    }

    #[test]
    fn test_org_id() {
        let mut metadata = MetadataMap::new();
        metadata.insert(ORG_ID, MetadataValue::from_static("12"));
        assert_eq!(org_id(&metadata).unwrap(), 12);

        metadata.insert(ORG_ID, MetadataValue::from_static("twelve"));
        assert!(matches!(org_id(&metadata), Err(AuthnError::Internal(_))));

        assert!(matches!(
            org_id(&MetadataMap::new()),
            Err(AuthnError::Unauthenticated(_))
        ));
    }
}
