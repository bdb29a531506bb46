use crate::error::{DatabaseError, Result};
use async_trait::async_trait;
use pgtenant_models::{CreateTenant, Tenant, TenantStatus, UpdateTenant};
use sqlx::PgPool;
use uuid::Uuid;

/// Directory store contract.
///
/// [`TenantRepository`] is the Postgres implementation; consumers hold
/// `Arc<dyn TenantStore>` so tests can substitute an in-memory store.
#[async_trait]
pub trait TenantStore: Send + Sync {
    async fn create(&self, request: &CreateTenant, schema_name: &str) -> Result<Tenant>;

    async fn find_by_id_or_slug(&self, key: &str) -> Result<Tenant>;

    async fn find_many(
        &self,
        status: Option<TenantStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Tenant>>;

    async fn update_status(&self, id: Uuid, status: TenantStatus) -> Result<Tenant>;

    async fn update(&self, id: Uuid, update: &UpdateTenant) -> Result<Tenant>;

    async fn delete(&self, id: Uuid) -> Result<()>;
}

/// Tenant directory store: one row per tenant in the public schema.
pub struct TenantRepository {
    pool: PgPool,
}

impl TenantRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a new tenant row with status `pending`.
    ///
    /// `schema_name` is the value derived from the slug by the schema
    /// manager; the repository never derives it itself.
    pub async fn create(&self, request: &CreateTenant, schema_name: &str) -> Result<Tenant> {
        let metadata = request.metadata.clone().unwrap_or_else(|| serde_json::json!({}));
        let metadata_json = sqlx::types::Json(&metadata);

        let tenant = sqlx::query_as::<_, Tenant>(
            r#"
            INSERT INTO tenants (slug, name, schema_name, status, metadata)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(&request.slug)
        .bind(&request.name)
        .bind(schema_name)
        .bind(TenantStatus::Pending)
        .bind(metadata_json)
        .fetch_one(&self.pool)
        .await?;

        Ok(tenant)
    }

    /// Find tenant by ID
    pub async fn find_by_id(&self, id: Uuid) -> Result<Tenant> {
        let tenant = sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DatabaseError::not_found("Tenant", &id.to_string()))?;

        Ok(tenant)
    }

    /// Find tenant by slug
    pub async fn find_by_slug(&self, slug: &str) -> Result<Tenant> {
        let tenant = sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE slug = $1")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DatabaseError::not_found("Tenant", slug))?;

        Ok(tenant)
    }

    /// Find tenant by ID when the key parses as a UUID, otherwise by slug.
    pub async fn find_by_id_or_slug(&self, key: &str) -> Result<Tenant> {
        match Uuid::parse_str(key) {
            Ok(id) => self.find_by_id(id).await,
            Err(_) => self.find_by_slug(key).await,
        }
    }

    /// List tenants, optionally filtered by status (paginated)
    pub async fn find_many(
        &self,
        status: Option<TenantStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Tenant>> {
        let tenants = match status {
            Some(status) => {
                sqlx::query_as::<_, Tenant>(
                    r#"
                    SELECT * FROM tenants
                    WHERE status = $1
                    ORDER BY created_at DESC
                    LIMIT $2 OFFSET $3
                    "#,
                )
                .bind(status)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Tenant>(
                    r#"
                    SELECT * FROM tenants
                    ORDER BY created_at DESC
                    LIMIT $1 OFFSET $2
                    "#,
                )
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(tenants)
    }

    /// Count tenants
    pub async fn count(&self) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tenants")
            .fetch_one(&self.pool)
            .await?;

        Ok(count.0)
    }

    /// Update tenant status
    pub async fn update_status(&self, id: Uuid, status: TenantStatus) -> Result<Tenant> {
        let tenant = sqlx::query_as::<_, Tenant>(
            r#"
            UPDATE tenants
            SET status = $1, updated_at = NOW()
            WHERE id = $2
            RETURNING *
            "#,
        )
        .bind(status)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DatabaseError::not_found("Tenant", &id.to_string()))?;

        Ok(tenant)
    }

    /// Partial update of name, status and metadata
    pub async fn update(&self, id: Uuid, update: &UpdateTenant) -> Result<Tenant> {
        let mut query_builder = sqlx::QueryBuilder::new("UPDATE tenants SET updated_at = NOW()");

        if let Some(name) = &update.name {
            query_builder.push(", name = ");
            query_builder.push_bind(name);
        }
        if let Some(status) = update.status {
            query_builder.push(", status = ");
            query_builder.push_bind(status);
        }
        if let Some(metadata) = &update.metadata {
            query_builder.push(", metadata = ");
            query_builder.push_bind(sqlx::types::Json(metadata));
        }

        query_builder.push(" WHERE id = ");
        query_builder.push_bind(id);
        query_builder.push(" RETURNING *");

        let tenant = query_builder
            .build_query_as::<Tenant>()
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DatabaseError::not_found("Tenant", &id.to_string()))?;

        Ok(tenant)
    }

    /// Delete a tenant row. The caller is responsible for having dropped
    /// the tenant's schema first.
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM tenants WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::not_found("Tenant", &id.to_string()));
        }

        Ok(())
    }
}

#[async_trait]
impl TenantStore for TenantRepository {
    async fn create(&self, request: &CreateTenant, schema_name: &str) -> Result<Tenant> {
        TenantRepository::create(self, request, schema_name).await
    }

    async fn find_by_id_or_slug(&self, key: &str) -> Result<Tenant> {
        TenantRepository::find_by_id_or_slug(self, key).await
    }

    async fn find_many(
        &self,
        status: Option<TenantStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Tenant>> {
        TenantRepository::find_many(self, status, limit, offset).await
    }

    async fn update_status(&self, id: Uuid, status: TenantStatus) -> Result<Tenant> {
        TenantRepository::update_status(self, id, status).await
    }

    async fn update(&self, id: Uuid, update: &UpdateTenant) -> Result<Tenant> {
        TenantRepository::update(self, id, update).await
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        TenantRepository::delete(self, id).await
    }
}
