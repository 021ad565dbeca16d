//! Context cache layer
//!
//! Two halves: the signed, client-held cache token (a routing optimization,
//! never an authorization boundary) and the Redis-backed invalidation epoch
//! that lets membership-removal / suspension / sign-out flows force
//! re-resolution before the TTL runs out.

use crate::config::RedisConfig;
use crate::domain::{ContextCacheEntry, PortalKind};
use crate::error::{AppError, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, TimeZone, Utc};
use hmac::{Hmac, Mac};
use redis::{aio::ConnectionManager, AsyncCommands};
use sha2::Sha256;
use thiserror::Error;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Cache key prefixes
mod keys {
    pub const INVALIDATION_EPOCH: &str = "medbridge:ctx_epoch";
}

/// Default TTLs
mod ttl {
    /// Epoch marks outlive any session that could present an older entry
    pub const INVALIDATION_EPOCH_SECS: u64 = 86_400; // 24 hours
}

/// Failures decoding a presented cache token. All of these are hard
/// failures: a well-behaved client never produces them.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CacheTokenError {
    #[error("Malformed cache token")]
    Malformed,
    #[error("Cache token signature mismatch")]
    BadSignature,
    #[error("Cache token was issued to a different subject")]
    ForeignSubject,
}

impl From<CacheTokenError> for AppError {
    fn from(err: CacheTokenError) -> Self {
        AppError::Unauthorized(err.to_string())
    }
}

/// Encodes and validates signed context cache tokens.
///
/// Token layout: `base64url(json entry) "." base64url(hmac-sha256)`.
/// Tamper-evident, not encrypted; the entry contents are not secret.
#[derive(Clone)]
pub struct ContextTokenCodec {
    secret: Vec<u8>,
    ttl: Duration,
}

impl ContextTokenCodec {
    pub fn new(secret: &str, ttl_secs: i64) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            ttl: Duration::seconds(ttl_secs),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Mint a fresh entry for a resolution and sign it
    pub fn mint(
        &self,
        subject_id: Uuid,
        organization_id: Option<Uuid>,
        portal: PortalKind,
        now: DateTime<Utc>,
    ) -> (ContextCacheEntry, String) {
        // Truncate to whole seconds so re-encoding a decoded entry is stable
        let issued_at = Utc.timestamp_opt(now.timestamp(), 0).single().unwrap_or(now);
        let entry = ContextCacheEntry {
            subject_id,
            organization_id,
            portal,
            issued_at,
            expires_at: issued_at + self.ttl,
        };
        let token = self.encode(&entry);
        (entry, token)
    }

    /// Sign an entry into its wire form
    pub fn encode(&self, entry: &ContextCacheEntry) -> String {
        let json = serde_json::to_vec(entry).expect("cache entry serializes");
        let payload = URL_SAFE_NO_PAD.encode(json);
        let signature = URL_SAFE_NO_PAD.encode(self.sign(payload.as_bytes()));
        format!("{}.{}", payload, signature)
    }

    /// Validate signature and subject binding, returning the entry.
    ///
    /// Expiry is deliberately NOT checked here: an expired entry is stale,
    /// not tampered, and the Routing Gate handles the two very differently.
    pub fn decode(
        &self,
        token: &str,
        expected_subject: Uuid,
    ) -> std::result::Result<ContextCacheEntry, CacheTokenError> {
        let (payload, signature) = token.split_once('.').ok_or(CacheTokenError::Malformed)?;

        let sig_bytes = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| CacheTokenError::Malformed)?;

        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts any key length");
        mac.update(payload.as_bytes());
        mac.verify_slice(&sig_bytes)
            .map_err(|_| CacheTokenError::BadSignature)?;

        let json = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| CacheTokenError::Malformed)?;
        let entry: ContextCacheEntry =
            serde_json::from_slice(&json).map_err(|_| CacheTokenError::Malformed)?;

        if entry.subject_id != expected_subject {
            return Err(CacheTokenError::ForeignSubject);
        }

        Ok(entry)
    }

    fn sign(&self, payload: &[u8]) -> Vec<u8> {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts any key length");
        mac.update(payload);
        mac.finalize().into_bytes().to_vec()
    }
}

/// Per-subject invalidation epoch in Redis.
///
/// Entries issued at or before the epoch are stale no matter how much TTL
/// they have left. Written when a membership is removed, an organization is
/// suspended, or a subject signs out.
#[derive(Clone)]
pub struct InvalidationStore {
    conn: ConnectionManager,
}

impl InvalidationStore {
    /// Create a new invalidation store
    pub async fn new(config: &RedisConfig) -> Result<Self> {
        let client = redis::Client::open(config.url.as_str()).map_err(|e| {
            AppError::Internal(anyhow::anyhow!("Failed to create Redis client: {}", e))
        })?;

        let conn = ConnectionManager::new(client).await.map_err(|e| {
            AppError::Internal(anyhow::anyhow!("Failed to connect to Redis: {}", e))
        })?;

        Ok(Self { conn })
    }

    /// Record that every entry issued up to `now` is stale for this subject
    pub async fn mark_stale(&self, subject_id: Uuid, now: DateTime<Utc>) -> Result<()> {
        let mut conn = self.conn.clone();
        let key = Self::epoch_key(subject_id);
        let _: () = conn
            .set_ex(key, now.timestamp(), ttl::INVALIDATION_EPOCH_SECS)
            .await?;
        Ok(())
    }

    /// The subject's invalidation epoch, if one has been recorded
    pub async fn invalidated_after(&self, subject_id: Uuid) -> Result<Option<DateTime<Utc>>> {
        let mut conn = self.conn.clone();
        let key = Self::epoch_key(subject_id);
        let value: Option<i64> = conn.get(key).await?;

        Ok(value.and_then(|ts| Utc.timestamp_opt(ts, 0).single()))
    }

    /// Drop the epoch mark (e.g. after tests or manual recovery)
    pub async fn clear(&self, subject_id: Uuid) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(Self::epoch_key(subject_id)).await?;
        Ok(())
    }

    /// Liveness probe for readiness checks
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    fn epoch_key(subject_id: Uuid) -> String {
        format!("{}:{}", keys::INVALIDATION_EPOCH, subject_id)
    }
}
