//! Verified session and platform-role domain models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Cross-tenant privilege carried in session claims
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformRole {
    PlatformAdmin,
}

impl std::str::FromStr for PlatformRole {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "platform_admin" => Ok(PlatformRole::PlatformAdmin),
            _ => Err(format!("Unknown platform role: {}", s)),
        }
    }
}

impl std::fmt::Display for PlatformRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlatformRole::PlatformAdmin => write!(f, "platform_admin"),
        }
    }
}

impl<'r> sqlx::Decode<'r, sqlx::MySql> for PlatformRole {
    fn decode(
        value: sqlx::mysql::MySqlValueRef<'r>,
    ) -> std::result::Result<Self, sqlx::error::BoxDynError> {
        let s: String = sqlx::Decode::<'r, sqlx::MySql>::decode(value)?;
        s.parse().map_err(|e: String| e.into())
    }
}

impl sqlx::Type<sqlx::MySql> for PlatformRole {
    fn type_info() -> sqlx::mysql::MySqlTypeInfo {
        <String as sqlx::Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &sqlx::mysql::MySqlTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::MySql>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::MySql> for PlatformRole {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<u8>,
    ) -> std::result::Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        let s = match self {
            PlatformRole::PlatformAdmin => "platform_admin",
        };
        <&str as sqlx::Encode<sqlx::MySql>>::encode_by_ref(&s, buf)
    }
}

/// A verified session. Claims are immutable for the session's lifetime;
/// a platform-role grant only shows up here after the Identity Provider
/// re-issues the session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub subject_id: Uuid,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub platform_role: Option<PlatformRole>,
}

impl Session {
    pub fn is_platform_admin(&self) -> bool {
        matches!(self.platform_role, Some(PlatformRole::PlatformAdmin))
    }
}

/// Platform-role record held by the Membership Store. Written only through
/// the privileged internal channel; never consulted mid-session.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PlatformRoleGrant {
    pub subject_id: Uuid,
    pub role: PlatformRole,
    pub granted_at: DateTime<Utc>,
}
