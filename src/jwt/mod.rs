//! Session token handling
//!
//! The Identity Provider issues session tokens; this service only verifies
//! them. Token issuance lives here too so tests and local tooling can mint
//! sessions without a running provider.

use crate::config::JwtConfig;
use crate::domain::{PlatformRole, Session};
use crate::error::{AppError, Result};
use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Audience expected on every session token
const SESSION_AUDIENCE: &str = "medbridge";

/// Session token claims (issued at sign-in by the Identity Provider)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject (user ID)
    pub sub: String,
    /// Issuer
    pub iss: String,
    /// Audience
    pub aud: String,
    /// Token type discriminator (prevents token confusion attacks)
    #[serde(default)]
    pub token_type: String,
    /// Platform-wide role, if any. Immutable until the session is re-issued.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform_role: Option<String>,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration (Unix timestamp)
    pub exp: i64,
}

impl SessionClaims {
    /// Build the domain session from verified claims.
    ///
    /// An unrecognized `platform_role` value is treated as no role rather
    /// than rejected, so older tokens survive a role-vocabulary change.
    pub fn into_session(self) -> Result<Session> {
        let subject_id = Uuid::parse_str(&self.sub)
            .map_err(|_| AppError::Unauthorized("Invalid subject ID in token".to_string()))?;

        let platform_role = self
            .platform_role
            .as_deref()
            .and_then(|r| r.parse::<PlatformRole>().ok());

        Ok(Session {
            subject_id,
            issued_at: timestamp_to_datetime(self.iat)?,
            expires_at: timestamp_to_datetime(self.exp)?,
            platform_role,
        })
    }
}

fn timestamp_to_datetime(ts: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_opt(ts, 0)
        .single()
        .ok_or_else(|| AppError::Unauthorized("Invalid timestamp in token".to_string()))
}

/// JWT session token manager
#[derive(Clone)]
pub struct JwtManager {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
}

impl JwtManager {
    pub fn new(config: JwtConfig) -> Self {
        let algorithm = if config.private_key_pem.is_some() {
            Algorithm::RS256
        } else {
            Algorithm::HS256
        };
        let encoding_key = match config.private_key_pem.as_ref() {
            Some(private_key) => EncodingKey::from_rsa_pem(private_key.as_bytes())
                .expect("Failed to load JWT private key"),
            None => EncodingKey::from_secret(config.secret.as_bytes()),
        };
        let decoding_key = match config.public_key_pem.as_ref() {
            Some(public_key) => DecodingKey::from_rsa_pem(public_key.as_bytes())
                .expect("Failed to load JWT public key"),
            None => match config.private_key_pem.as_ref() {
                Some(private_key) => DecodingKey::from_rsa_pem(private_key.as_bytes())
                    .expect("Failed to load JWT private key"),
                None => DecodingKey::from_secret(config.secret.as_bytes()),
            },
        };
        Self {
            config,
            encoding_key,
            decoding_key,
            algorithm,
        }
    }

    /// Create a Validation with a strict leeway (5 seconds) instead of the
    /// default 60 seconds, so sessions expire promptly while still tolerating
    /// minor clock skew.
    fn strict_validation(&self) -> Validation {
        let mut v = Validation::new(self.algorithm);
        v.leeway = 5;
        v
    }

    /// Create a session token
    pub fn create_session_token(
        &self,
        subject_id: Uuid,
        platform_role: Option<PlatformRole>,
    ) -> Result<String> {
        let now = Utc::now();
        let exp = now + Duration::seconds(self.config.session_ttl_secs);

        let claims = SessionClaims {
            sub: subject_id.to_string(),
            iss: self.config.issuer.clone(),
            aud: SESSION_AUDIENCE.to_string(),
            token_type: "session".to_string(),
            platform_role: platform_role.map(|r| r.to_string()),
            iat: now.timestamp(),
            exp: exp.timestamp(),
        };
        let header = Header::new(self.algorithm);
        encode(&header, &claims, &self.encoding_key).map_err(|e| AppError::Internal(e.into()))
    }

    /// Verify and decode a session token
    pub fn verify_session_token(&self, token: &str) -> Result<SessionClaims> {
        let mut validation = self.strict_validation();
        validation.set_audience(&[SESSION_AUDIENCE]);
        validation.set_issuer(&[&self.config.issuer]);

        let token_data = decode::<SessionClaims>(token, &self.decoding_key, &validation)?;
        Ok(token_data.claims)
    }

    /// Verify a session token and build the domain session from it
    pub fn verify_session(&self, token: &str) -> Result<Session> {
        self.verify_session_token(token)?.into_session()
    }

    pub fn uses_rsa(&self) -> bool {
        self.algorithm == Algorithm::RS256
    }
}
