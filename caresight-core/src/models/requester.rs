use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::id::UserId;

/// Account role of an authenticated principal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorRole {
    /// Platform operator, bypasses shared-access checks
    Admin,
    /// Account holder of the monitored home (the patient side)
    Customer,
    /// Person granted shared access by a customer
    Caregiver,
}

impl ActorRole {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Customer => "customer",
            Self::Caregiver => "caregiver",
        }
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin)
    }

    #[must_use]
    pub fn is_customer(&self) -> bool {
        matches!(self, Self::Customer)
    }

    #[must_use]
    pub fn is_caregiver(&self) -> bool {
        matches!(self, Self::Caregiver)
    }
}

impl FromStr for ActorRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "customer" => Ok(Self::Customer),
            "caregiver" => Ok(Self::Caregiver),
            _ => Err(format!("Unknown actor role: {}", s)),
        }
    }
}

impl std::fmt::Display for ActorRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// Database mapping: ActorRole <-> TEXT
impl sqlx::Type<sqlx::Postgres> for ActorRole {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }
}

impl sqlx::Encode<'_, sqlx::Postgres> for ActorRole {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.as_str(), buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Postgres> for ActorRole {
    fn decode(
        value: sqlx::postgres::PgValueRef<'r>,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let s = <String as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Self::from_str(&s).map_err(Into::into)
    }
}

/// The authenticated principal attached to a request. Authentication
/// itself happens upstream; this is what the gateway vouched for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    pub id: UserId,
    pub role: ActorRole,
}

impl Requester {
    #[must_use]
    pub fn new(id: UserId, role: ActorRole) -> Self {
        Self { id, role }
    }

    #[must_use]
    pub fn admin(id: UserId) -> Self {
        Self::new(id, ActorRole::Admin)
    }

    #[must_use]
    pub fn customer(id: UserId) -> Self {
        Self::new(id, ActorRole::Customer)
    }

    #[must_use]
    pub fn caregiver(id: UserId) -> Self {
        Self::new(id, ActorRole::Caregiver)
    }
}
