//! Credential authority
//!
//! Verifies the shared password against a stored bcrypt hash and issues
//! short-lived HS256 tokens bound to a (connection id, network address) pair.
//! Verification never panics; every failure is an [`AuthError`].


use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

// ============================================================================
// Error Types
// ============================================================================

/// Authentication errors
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No signing secret configured
    #[error("signing secret is not configured")]
    MissingSecret,

    /// Signature, issuer or expiry check failed
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// Token was issued to another connection or address
    #[error("token does not belong to this connection")]
    TokenMismatch,

    /// Token could not be signed
    #[error("token signing failed: {0}")]
    Signing(String),
}

/// Auth result type
pub type Result<T> = std::result::Result<T, AuthError>;

// ============================================================================
// Configuration
// ============================================================================

/// Credential settings. Secrets are redacted from `Debug`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HMAC signing secret
    #[serde(default)]
    pub jwt_secret: Option<String>,
    /// bcrypt hash of the shared password
    #[serde(default)]
    pub password_hash: Option<String>,
    /// Token lifetime in seconds
    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: u64,
    /// `iss` claim written and required on every token
    #[serde(default = "default_issuer")]
    pub issuer: String,
}

fn default_token_ttl_secs() -> u64 {
    3600
}

fn default_issuer() -> String {
    "shellgate-server".to_string()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            password_hash: None,
            token_ttl_secs: default_token_ttl_secs(),
            issuer: default_issuer(),
        }
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| if v.is_some() { "[REDACTED]" } else { "<unset>" };
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &redact(&self.jwt_secret))
            .field("password_hash", &redact(&self.password_hash))
            .field("token_ttl_secs", &self.token_ttl_secs)
            .field("issuer", &self.issuer)
            .finish()
    }
}

/// Whether `hash` looks like a bcrypt hash (`$2a$`, `$2b$`, `$2x$`, `$2y$`).
pub fn is_bcrypt_hash(hash: &str) -> bool {
    let bytes = hash.as_bytes();
    hash.len() == 60
        && hash.starts_with("$2")
        && matches!(bytes.get(2), Some(b'a' | b'b' | b'x' | b'y'))
        && bytes.get(3) == Some(&b'$')
}

// ============================================================================
// Claims
// ============================================================================

/// Signed token payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Connection the token was issued to
    pub conn_id: String,
    /// Address the token was issued to
    pub ip: String,
    /// Always `true` for issued tokens
    pub authenticated: bool,
    /// Issued-at, Unix seconds
    pub iat: u64,
    /// Expiry, Unix seconds
    pub exp: u64,
    /// Issuer tag
    pub iss: String,
}

// ============================================================================
// Authority
// ============================================================================

/// Password check and token issue/verify.
pub struct CredentialAuthority {
    password_hash: Option<SecretString>,
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    issuer: String,
    ttl: Duration,
}

impl fmt::Debug for CredentialAuthority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialAuthority")
            .field("password_configured", &self.password_hash.is_some())
            .field("issuer", &self.issuer)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl CredentialAuthority {
    /// Build an authority. Fails when no signing secret is configured.
    pub fn new(config: &AuthConfig) -> Result<Self> {
        let secret = config
            .jwt_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or(AuthError::MissingSecret)?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[config.issuer.as_str()]);
        validation.leeway = 0;

        Ok(Self {
            password_hash: config
                .password_hash
                .as_deref()
                .filter(|h| !h.is_empty())
                .map(|h| SecretString::from(h.to_string())),
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            issuer: config.issuer.clone(),
            ttl: Duration::from_secs(config.token_ttl_secs),
        })
    }

    /// Whether a password hash is configured at all.
    pub fn has_password(&self) -> bool {
        self.password_hash.is_some()
    }

    /// Token lifetime.
    pub fn token_ttl(&self) -> Duration {
        self.ttl
    }

    /// Compare `candidate` against the stored hash. `false` on any error.
    pub fn validate_password(&self, candidate: &str) -> bool {
        let Some(hash) = &self.password_hash else {
            warn!("Password check attempted with no password hash configured");
            return false;
        };
        match bcrypt::verify(candidate, hash.expose_secret()) {
            Ok(valid) => valid,
            Err(e) => {
                warn!(error = %e, "Password hash comparison failed");
                false
            }
        }
    }

    /// [`validate_password`](Self::validate_password) off the async runtime.
    pub async fn check_password(self: &Arc<Self>, candidate: String) -> bool {
        let authority = Arc::clone(self);
        tokio::task::spawn_blocking(move || authority.validate_password(&candidate))
            .await
            .unwrap_or(false)
    }

    /// Sign a token bound to `conn_id` and `addr`.
    pub fn issue_token(&self, conn_id: &str, addr: IpAddr) -> Result<String> {
        let iat = u64::try_from(Utc::now().timestamp()).unwrap_or(0);
        let claims = TokenClaims {
            conn_id: conn_id.to_string(),
            ip: addr.to_string(),
            authenticated: true,
            iat,
            exp: iat.saturating_add(self.ttl.as_secs()),
            iss: self.issuer.clone(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::Signing(e.to_string()))?;
        debug!(conn_id = %conn_id, ip = %addr, "Issued session token");
        Ok(token)
    }

    /// Check signature, issuer and expiry and return the payload.
    pub fn verify_token(&self, token: &str) -> Result<TokenClaims> {
        decode::<TokenClaims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))
    }

    /// Both the connection id and the address must match exactly.
    pub fn token_matches(claims: &TokenClaims, conn_id: &str, addr: IpAddr) -> bool {
        claims.authenticated && claims.conn_id == conn_id && claims.ip == addr.to_string()
    }

    /// Verify `token` and require it to belong to `conn_id` at `addr`.
    pub fn verify_bound(&self, token: &str, conn_id: &str, addr: IpAddr) -> Result<TokenClaims> {
        let claims = self.verify_token(token)?;
        if !Self::token_matches(&claims, conn_id, addr) {
            warn!(
                conn_id = %conn_id,
                ip = %addr,
                token_conn_id = %claims.conn_id,
                token_ip = %claims.ip,
                "Token presented by a different connection or address"
            );
            return Err(AuthError::TokenMismatch);
        }
        Ok(claims)
    }
}
