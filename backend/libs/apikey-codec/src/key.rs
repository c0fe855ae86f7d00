//! Prefixed key generation, parsing and hashing

use std::fmt;
use std::str::FromStr;

use argon2::{Algorithm, Argon2, Params, Version};
use crc::{Crc, CRC_32_ISO_HDLC};
use rand::{rngs::OsRng, RngCore};

use crate::error::TokenError;

/// Prefix shared by every issued key
pub const GLOBAL_PREFIX: &str = "gl";

/// Number of characters in a generated secret
pub const SECRET_LENGTH: usize = 32;

const SEPARATOR: char = '_';
const CHECKSUM_LENGTH: usize = 8;

const SECRET_ALPHABET: &[u8; 62] =
    b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Largest multiple of the alphabet size below 256; bytes above it are redrawn
const UNBIASED_BYTE_LIMIT: u8 = 248;

const CHECKSUM: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

// argon2id, 19 MiB, 2 passes, 1 lane
const HASH_MEMORY_KIB: u32 = 19_456;
const HASH_ITERATIONS: u32 = 2;
const HASH_PARALLELISM: u32 = 1;
const HASH_OUTPUT_LEN: usize = 32;

/// A parsed or freshly generated credential
///
/// Serializes (via `Display`) to `gl<service_id>_<secret>_<checksum>`.
#[derive(Clone, PartialEq, Eq)]
pub struct PrefixedKey {
    pub service_id: String,
    pub secret: String,
    pub checksum: String,
}

/// Issuance output
///
/// `client_secret` is handed to the caller exactly once; `hashed_key` is what
/// gets persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyGenResult {
    pub hashed_key: String,
    pub client_secret: String,
}

impl PrefixedKey {
    /// Salted one-way hash of the secret, keyed by the checksum
    ///
    /// Pure function of `(secret, checksum)`: hashing a decoded key yields the
    /// same value that was stored at issuance.
    pub fn hash(&self) -> Result<String, TokenError> {
        hash_secret(&self.secret, &self.checksum)
    }

    /// Recompute the checksum from `service_id` and `secret`
    pub fn compute_checksum(&self) -> String {
        compute_checksum(&self.service_id, &self.secret)
    }
}

impl fmt::Display for PrefixedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{GLOBAL_PREFIX}{}{SEPARATOR}{}{SEPARATOR}{}",
            self.service_id, self.secret, self.checksum
        )
    }
}

impl fmt::Debug for PrefixedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrefixedKey")
            .field("service_id", &self.service_id)
            .field("secret", &"<redacted>")
            .field("checksum", &self.checksum)
            .finish()
    }
}

impl FromStr for PrefixedKey {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode(s)
    }
}

impl fmt::Debug for KeyGenResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyGenResult")
            .field("hashed_key", &self.hashed_key)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Issue a new key for `service_id`
///
/// ## Errors
///
/// Returns `TokenError::Generation` if:
/// - `service_id` is empty or contains the `_` separator
/// - the OS random source fails
/// - the hashing primitive fails
pub fn generate(service_id: &str) -> Result<KeyGenResult, TokenError> {
    if service_id.is_empty() || service_id.contains(SEPARATOR) {
        return Err(TokenError::Generation(format!(
            "invalid service id {service_id:?}"
        )));
    }

    let mut key = PrefixedKey {
        service_id: service_id.to_string(),
        secret: random_secret()?,
        checksum: String::new(),
    };
    key.checksum = key.compute_checksum();

    let hashed_key = key.hash()?;

    Ok(KeyGenResult {
        hashed_key,
        client_secret: key.to_string(),
    })
}

/// Parse and checksum-verify a key string
///
/// ## Errors
///
/// Returns `TokenError::InvalidToken` if:
/// - the global prefix is missing
/// - splitting on `_` does not yield exactly three parts
/// - the recomputed checksum differs from the embedded one
pub fn decode(token: &str) -> Result<PrefixedKey, TokenError> {
    let rest = token
        .strip_prefix(GLOBAL_PREFIX)
        .ok_or_else(|| TokenError::invalid("missing global prefix"))?;

    let mut parts = rest.split(SEPARATOR);
    let (service_id, secret, checksum) = match (parts.next(), parts.next(), parts.next(), parts.next())
    {
        (Some(service_id), Some(secret), Some(checksum), None) => (service_id, secret, checksum),
        _ => return Err(TokenError::invalid("unexpected number of segments")),
    };

    let key = PrefixedKey {
        service_id: service_id.to_string(),
        secret: secret.to_string(),
        checksum: checksum.to_string(),
    };

    if key.compute_checksum() != key.checksum {
        return Err(TokenError::invalid("checksum mismatch"));
    }

    Ok(key)
}

/// Cheap syntactic test used to route a bearer value to this codec
pub fn is_prefixed_key(token: &str) -> bool {
    token.starts_with(GLOBAL_PREFIX) && token.matches(SEPARATOR).count() == 2
}

fn compute_checksum(service_id: &str, secret: &str) -> String {
    let mut digest = CHECKSUM.digest();
    digest.update(GLOBAL_PREFIX.as_bytes());
    digest.update(service_id.as_bytes());
    digest.update(&[SEPARATOR as u8]);
    digest.update(secret.as_bytes());

    hex::encode(digest.finalize().to_le_bytes())
}

fn random_secret() -> Result<String, TokenError> {
    let mut secret = String::with_capacity(SECRET_LENGTH);
    let mut buf = [0u8; SECRET_LENGTH * 2];

    while secret.len() < SECRET_LENGTH {
        OsRng
            .try_fill_bytes(&mut buf)
            .map_err(|e| TokenError::Generation(format!("random source failed: {e}")))?;

        for byte in buf.iter().copied().filter(|b| *b < UNBIASED_BYTE_LIMIT) {
            secret.push(SECRET_ALPHABET[(byte % 62) as usize] as char);
            if secret.len() == SECRET_LENGTH {
                break;
            }
        }
    }

    Ok(secret)
}

fn hash_secret(secret: &str, checksum: &str) -> Result<String, TokenError> {
    if checksum.len() != CHECKSUM_LENGTH {
        return Err(TokenError::Generation(
            "checksum must be 8 characters to salt the hash".to_string(),
        ));
    }

    let params = Params::new(
        HASH_MEMORY_KIB,
        HASH_ITERATIONS,
        HASH_PARALLELISM,
        Some(HASH_OUTPUT_LEN),
    )
    .map_err(|e| TokenError::Generation(format!("invalid hash parameters: {e}")))?;

    let mut output = [0u8; HASH_OUTPUT_LEN];
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        .hash_password_into(secret.as_bytes(), checksum.as_bytes(), &mut output)
        .map_err(|e| TokenError::Generation(format!("hashing failed: {e}")))?;

    Ok(hex::encode(output))
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = "glsa_yscW25imSKJIuav8zF37RZmnbiDvB05G_fcaaf58a";

    #[test]
    fn test_decode_fixture() {
        let key = decode(FIXTURE).expect("fixture should decode");

        assert_eq!(key.service_id, "sa");
        assert_eq!(key.secret, "yscW25imSKJIuav8zF37RZmnbiDvB05G");
        assert_eq!(key.checksum, "fcaaf58a");
        assert_eq!(key.to_string(), FIXTURE);
    }

    #[test]
    fn test_checksum_is_little_endian_crc32() {
        let key = PrefixedKey {
            service_id: "sa".to_string(),
            secret: "yscW25imSKJIuav8zF37RZmnbiDvB05G".to_string(),
            checksum: String::new(),
        };
        assert_eq!(key.compute_checksum(), "fcaaf58a");
    }

    #[test]
    fn test_decode_missing_prefix() {
        let err = decode("xxsa_yscW25imSKJIuav8zF37RZmnbiDvB05G_fcaaf58a").unwrap_err();
        assert_eq!(err.reason(), Some("missing global prefix"));
    }

    #[test]
    fn test_decode_wrong_segment_count() {
        assert!(decode("glsa_yscW25imSKJIuav8zF37RZmnbiDvB05G").is_err());
        assert!(decode("glsa_ysc_W25imSKJIuav8zF37RZmnbiDvB05G_fcaaf58a").is_err());
        assert!(decode("gl").is_err());
    }

    #[test]
    fn test_decode_error_message_is_uniform() {
        let a = decode("nope").unwrap_err();
        let b = decode("glsa_yscW25imSKJIuav8zF37RZmnbiDvB05G_00000000").unwrap_err();
        assert_eq!(a.to_string(), b.to_string());
        assert_ne!(a.reason(), b.reason());
    }

    #[test]
    fn test_random_secret_alphabet_and_length() {
        let secret = random_secret().expect("random source available");
        assert_eq!(secret.len(), SECRET_LENGTH);
        assert!(secret.bytes().all(|b| b.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_generate_rejects_bad_service_id() {
        assert!(matches!(generate(""), Err(TokenError::Generation(_))));
        assert!(matches!(generate("s_a"), Err(TokenError::Generation(_))));
    }

    #[test]
    fn test_hash_is_deterministic() {
        let key = decode(FIXTURE).unwrap();
        let first = key.hash().unwrap();
        let second = key.hash().unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), HASH_OUTPUT_LEN * 2);
    }

    #[test]
    fn test_debug_redacts_secret() {
        let key = decode(FIXTURE).unwrap();
        let rendered = format!("{key:?}");
        assert!(!rendered.contains("yscW25imSKJIuav8zF37RZmnbiDvB05G"));
    }

    #[test]
    fn test_is_prefixed_key() {
        assert!(is_prefixed_key(FIXTURE));
        assert!(!is_prefixed_key("eyJhbGciOiJSUzI1NiJ9.e30.sig"));
    }
}
