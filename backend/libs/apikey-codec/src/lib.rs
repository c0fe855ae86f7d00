//! Prefixed API Key Codec
//!
//! Issues and parses self-describing service-account credentials of the form
//!
//! ```text
//! gl<service-id>_<secret>_<checksum>
//! ```
//!
//! ## Core Components
//!
//! - **PrefixedKey**: parsed key (service id, secret, checksum)
//! - **KeyGenResult**: issuance output (client secret shown once + hash to persist)
//! - **generate / decode**: the two entry points
//!
//! ## Two-tier verification
//!
//! - The checksum (CRC32/IEEE, little-endian hex) is embedded in the token so
//!   truncated or mistyped keys are rejected locally, without a store lookup.
//! - The stored hash is argon2id over the secret, salted with the checksum,
//!   so a leaked hash does not disclose the secret.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! # fn example() -> Result<(), apikey_codec::TokenError> {
//! let issued = apikey_codec::generate("sa")?;
//! // `issued.client_secret` goes to the caller, `issued.hashed_key` to the store
//!
//! let key = apikey_codec::decode(&issued.client_secret)?;
//! assert_eq!(key.hash()?, issued.hashed_key);
//! # Ok(())
//! # }
//! ```

mod error;
mod key;

pub use error::TokenError;
pub use key::{
    decode, generate, is_prefixed_key, KeyGenResult, PrefixedKey, GLOBAL_PREFIX, SECRET_LENGTH,
};
