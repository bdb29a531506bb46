// Tenant-scoped execution context attached to requests after resolution.

use pgtenant_models::Tenant;
use sqlx::PgPool;

/// Everything a downstream handler needs to act on behalf of one tenant.
///
/// `db` is the pooled, schema-scoped client; `public_db` is an optional
/// handle to the shared public schema for cross-tenant lookups.
#[derive(Debug, Clone)]
pub struct TenantContext<C: Clone> {
    pub tenant: Tenant,
    pub db: C,
    pub public_db: Option<PgPool>,
}

impl<C: Clone> TenantContext<C> {
    pub fn new(tenant: Tenant, db: C) -> Self {
        Self {
            tenant,
            db,
            public_db: None,
        }
    }

    pub fn with_public_db(mut self, public_db: PgPool) -> Self {
        self.public_db = Some(public_db);
        self
    }

    pub fn schema_name(&self) -> &str {
        &self.tenant.schema_name
    }
}
