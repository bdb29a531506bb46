use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Tenant directory row (one per tenant, stored in the public schema)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Tenant {
    pub id: Uuid,
    pub slug: String,
    pub name: String,

    /// Derived from `slug` at provisioning time; never set by callers
    pub schema_name: String,

    pub status: TenantStatus,

    #[sqlx(json)]
    pub metadata: serde_json::Value,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tenant {
    pub fn is_active(&self) -> bool {
        self.status == TenantStatus::Active
    }
}

/// Tenant lifecycle status
///
/// Created as `Pending`, moved to `Migrating` while DDL and migrations run,
/// then `Active` on success. `Suspended` is administrative and reachable
/// from `Active`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TenantStatus {
    Pending,
    Migrating,
    Active,
    Suspended,
}

impl TenantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TenantStatus::Pending => "pending",
            TenantStatus::Migrating => "migrating",
            TenantStatus::Active => "active",
            TenantStatus::Suspended => "suspended",
        }
    }
}

impl std::fmt::Display for TenantStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Create new tenant request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateTenant {
    #[validate(length(min = 1, max = 50))]
    pub slug: String,

    #[validate(length(min = 1, max = 255))]
    pub name: String,

    pub metadata: Option<serde_json::Value>,
}

/// Update tenant request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UpdateTenant {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,

    pub status: Option<TenantStatus>,

    pub metadata: Option<serde_json::Value>,
}
