//! Authentication settings
//!
//! Loaded from environment variables:
//!
//! | Variable | Default |
//! |---|---|
//! | `GRPC_AUTHN_AUTHENTICATOR` | `legacy` (`legacy`, `jwt`, `basic`) |
//! | `GRPC_AUTHN_MODE` | `inproc` (`inproc`, `remote`) |
//! | `GRPC_AUTHN_SIGNING_KEYS_URL` | required for `remote` |
//! | `GRPC_AUTHN_ALLOWED_AUDIENCES` | empty, comma separated |
//! | `GRPC_AUTHN_ALLOWED_ALGORITHMS` | `RS256,ES256` |
//! | `GRPC_AUTHN_JWKS_CACHE_TTL_SECS` | `900` |
//! | `GRPC_AUTHN_JWKS_REQUEST_TIMEOUT_SECS` | `10` |
//! | `GRPC_AUTHN_INSECURE_SKIP_VERIFY` | `false` |
//! | `GRPC_AUTHN_BASIC_USERNAME` / `GRPC_AUTHN_BASIC_PASSWORD` | required for `basic` |
//! | `APP_ENV` | `development` |

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthenticatorKind {
    #[default]
    Legacy,
    Jwt,
    Basic,
}

impl AuthenticatorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthenticatorKind::Legacy => "legacy",
            AuthenticatorKind::Jwt => "jwt",
            AuthenticatorKind::Basic => "basic",
        }
    }
}

impl FromStr for AuthenticatorKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "legacy" => Ok(AuthenticatorKind::Legacy),
            "jwt" => Ok(AuthenticatorKind::Jwt),
            "basic" => Ok(AuthenticatorKind::Basic),
            other => bail!("unknown authenticator {other:?}"),
        }
    }
}

/// Where the JWT authenticator gets its signing keys
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JwtMode {
    #[default]
    InProc,
    Remote,
}

impl FromStr for JwtMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inproc" => Ok(JwtMode::InProc),
            "remote" => Ok(JwtMode::Remote),
            other => bail!("unknown JWT mode {other:?}"),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct AuthnSettings {
    pub authenticator: AuthenticatorKind,
    pub mode: JwtMode,
    pub signing_keys_url: Option<String>,
    pub allowed_audiences: Vec<String>,
    /// Algorithm names as accepted by `jsonwebtoken::Algorithm`
    pub allowed_algorithms: Vec<String>,
    pub jwks_cache_ttl_secs: u64,
    pub jwks_request_timeout_secs: u64,
    pub insecure_skip_verify: bool,
    pub basic_username: Option<String>,
    pub basic_password: Option<String>,
    pub environment: String,
}

impl std::fmt::Debug for AuthnSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthnSettings")
            .field("authenticator", &self.authenticator)
            .field("mode", &self.mode)
            .field("signing_keys_url", &self.signing_keys_url)
            .field("allowed_audiences", &self.allowed_audiences)
            .field("allowed_algorithms", &self.allowed_algorithms)
            .field("jwks_cache_ttl_secs", &self.jwks_cache_ttl_secs)
            .field("jwks_request_timeout_secs", &self.jwks_request_timeout_secs)
            .field("insecure_skip_verify", &self.insecure_skip_verify)
            .field("basic_username", &self.basic_username)
            .field("basic_password", &self.basic_password.as_ref().map(|_| "[REDACTED]"))
            .field("environment", &self.environment)
            .finish()
    }
}

impl Default for AuthnSettings {
    fn default() -> Self {
        Self {
            authenticator: AuthenticatorKind::default(),
            mode: JwtMode::default(),
            signing_keys_url: None,
            allowed_audiences: Vec::new(),
            allowed_algorithms: vec!["RS256".to_string(), "ES256".to_string()],
            jwks_cache_ttl_secs: 900,
            jwks_request_timeout_secs: 10,
            insecure_skip_verify: false,
            basic_username: None,
            basic_password: None,
            environment: "development".to_string(),
        }
    }
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn list(name: &str) -> Option<Vec<String>> {
    optional(name).map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
}

impl AuthnSettings {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let settings = Self {
            authenticator: optional("GRPC_AUTHN_AUTHENTICATOR")
                .map(|v| v.parse())
                .transpose()
                .context("Invalid GRPC_AUTHN_AUTHENTICATOR")?
                .unwrap_or_default(),
            mode: optional("GRPC_AUTHN_MODE")
                .map(|v| v.parse())
                .transpose()
                .context("Invalid GRPC_AUTHN_MODE")?
                .unwrap_or_default(),
            signing_keys_url: optional("GRPC_AUTHN_SIGNING_KEYS_URL"),
            allowed_audiences: list("GRPC_AUTHN_ALLOWED_AUDIENCES").unwrap_or_default(),
            allowed_algorithms: list("GRPC_AUTHN_ALLOWED_ALGORITHMS")
                .unwrap_or(defaults.allowed_algorithms),
            jwks_cache_ttl_secs: env::var("GRPC_AUTHN_JWKS_CACHE_TTL_SECS")
                .unwrap_or_else(|_| "900".to_string())
                .parse()
                .context("Invalid GRPC_AUTHN_JWKS_CACHE_TTL_SECS")?,
            jwks_request_timeout_secs: env::var("GRPC_AUTHN_JWKS_REQUEST_TIMEOUT_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .context("Invalid GRPC_AUTHN_JWKS_REQUEST_TIMEOUT_SECS")?,
            insecure_skip_verify: env::var("GRPC_AUTHN_INSECURE_SKIP_VERIFY")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .context("Invalid GRPC_AUTHN_INSECURE_SKIP_VERIFY")?,
            basic_username: optional("GRPC_AUTHN_BASIC_USERNAME"),
            basic_password: optional("GRPC_AUTHN_BASIC_PASSWORD"),
            environment: optional("APP_ENV").unwrap_or(defaults.environment),
        };

        settings.validate()?;
        Ok(settings)
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Cross-field rules
    pub fn validate(&self) -> Result<()> {
        if self.insecure_skip_verify && self.is_production() {
            bail!("GRPC_AUTHN_INSECURE_SKIP_VERIFY is not allowed in production");
        }

        match self.authenticator {
            AuthenticatorKind::Legacy => {}
            AuthenticatorKind::Basic => {
                let user_set = self.basic_username.as_deref().is_some_and(|u| !u.is_empty());
                let pass_set = self.basic_password.as_deref().is_some_and(|p| !p.is_empty());
                if !user_set || !pass_set {
                    bail!("basic authenticator requires GRPC_AUTHN_BASIC_USERNAME and GRPC_AUTHN_BASIC_PASSWORD");
                }
            }
            AuthenticatorKind::Jwt => {
                let algorithms = self.algorithms()?;
                if algorithms.is_empty() {
                    bail!("GRPC_AUTHN_ALLOWED_ALGORITHMS must not be empty");
                }
                if self.mode == JwtMode::Remote {
                    if self.signing_keys_url.is_none() {
                        bail!("GRPC_AUTHN_SIGNING_KEYS_URL is required in remote mode");
                    }
                    if self.allowed_audiences.is_empty() {
                        bail!("GRPC_AUTHN_ALLOWED_AUDIENCES is required in remote mode");
                    }
                }
            }
        }

        Ok(())
    }

    pub fn algorithms(&self) -> Result<Vec<Algorithm>> {
        self.allowed_algorithms
            .iter()
            .map(|name| {
                Algorithm::from_str(name).with_context(|| format!("unsupported algorithm {name:?}"))
            })
            .collect()
    }

    pub fn jwks_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.jwks_cache_ttl_secs)
    }

    pub fn jwks_request_timeout(&self) -> Duration {
        Duration::from_secs(self.jwks_request_timeout_secs)
    }
}
