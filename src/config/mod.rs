//! Configuration management for MedBridge Core

use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server host
    pub http_host: String,
    /// HTTP server port
    pub http_port: u16,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Redis configuration
    pub redis: RedisConfig,
    /// JWT configuration
    pub jwt: JwtConfig,
    /// Context cache configuration
    pub context: ContextConfig,
    /// Internal (shared-secret) channel configuration
    pub internal: InternalApiConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub session_ttl_secs: i64,
    pub private_key_pem: Option<String>,
    pub public_key_pem: Option<String>,
}

/// Tunables for context resolution and the signed cache entry
#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Secret used to sign the context cache token (HMAC-SHA256)
    pub signing_secret: String,
    /// Lifetime of a cache entry before the Routing Gate re-resolves
    pub cache_ttl_secs: i64,
    /// Per-call timeout for Membership Store reads
    pub upstream_timeout_ms: u64,
    /// Backoff before the single retry of a failed upstream read
    pub retry_backoff_ms: u64,
    /// Extra reloads when a fresh sign-up has not propagated yet
    pub empty_retry_attempts: u32,
    /// Base backoff between those reloads (doubles each attempt)
    pub empty_retry_backoff_ms: u64,
}

impl ContextConfig {
    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_millis(self.upstream_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn empty_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.empty_retry_backoff_ms)
    }
}

/// Shared-secret channel for privileged operations (platform-role grants,
/// context invalidation). Not part of the normal session flow.
#[derive(Debug, Clone)]
pub struct InternalApiConfig {
    pub shared_secret: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            http_host: env::var("HTTP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            http_port: env::var("HTTP_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("Invalid HTTP_PORT")?,
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").context("DATABASE_URL is required")?,
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
                min_connections: env::var("DATABASE_MIN_CONNECTIONS")
                    .unwrap_or_else(|_| "2".to_string())
                    .parse()
                    .unwrap_or(2),
            },
            redis: RedisConfig {
                url: env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            },
            jwt: JwtConfig {
                secret: env::var("JWT_SECRET").context("JWT_SECRET is required")?,
                issuer: env::var("JWT_ISSUER")
                    .unwrap_or_else(|_| "https://id.medbridge.health".to_string()),
                session_ttl_secs: env::var("JWT_SESSION_TTL_SECS")
                    .unwrap_or_else(|_| "3600".to_string())
                    .parse()
                    .unwrap_or(3600),
                private_key_pem: env::var("JWT_PRIVATE_KEY")
                    .ok()
                    .map(|value| value.replace("\\n", "\n")),
                public_key_pem: env::var("JWT_PUBLIC_KEY")
                    .ok()
                    .map(|value| value.replace("\\n", "\n")),
            },
            context: ContextConfig {
                signing_secret: env::var("CONTEXT_SIGNING_SECRET")
                    .context("CONTEXT_SIGNING_SECRET is required")?,
                cache_ttl_secs: env::var("CONTEXT_CACHE_TTL_SECS")
                    .unwrap_or_else(|_| "300".to_string())
                    .parse()
                    .unwrap_or(300),
                upstream_timeout_ms: env::var("CONTEXT_UPSTREAM_TIMEOUT_MS")
                    .unwrap_or_else(|_| "2000".to_string())
                    .parse()
                    .unwrap_or(2000),
                retry_backoff_ms: env::var("CONTEXT_RETRY_BACKOFF_MS")
                    .unwrap_or_else(|_| "100".to_string())
                    .parse()
                    .unwrap_or(100),
                empty_retry_attempts: env::var("CONTEXT_EMPTY_RETRY_ATTEMPTS")
                    .unwrap_or_else(|_| "2".to_string())
                    .parse()
                    .unwrap_or(2),
                empty_retry_backoff_ms: env::var("CONTEXT_EMPTY_RETRY_BACKOFF_MS")
                    .unwrap_or_else(|_| "150".to_string())
                    .parse()
                    .unwrap_or(150),
            },
            internal: InternalApiConfig {
                shared_secret: env::var("INTERNAL_API_SECRET")
                    .context("INTERNAL_API_SECRET is required")?,
            },
        })
    }

    /// Get HTTP server address
    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }
}
