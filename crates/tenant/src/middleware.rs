// Axum middleware that resolves the active tenant for each request and
// attaches a schema-scoped database client for downstream handlers.

use crate::context::TenantContext;
use crate::extractor::{claims_from_request, TenantClaims};
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
    Json,
};
use pgtenant_database::{
    sanitize_error, ClientFactory, DatabaseError, TenantClientPool, TenantStore,
};
use pgtenant_models::Tenant;
use sqlx::PgPool;
use std::sync::Arc;

/// JSON error body returned by the middleware.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
        }
    }
}

/// Caller-supplied authorization hook.
///
/// Runs after the tenant row is loaded and must return `true` for the
/// request to proceed. This is the defense against a caller presenting a
/// tenant identifier they do not belong to: the claim alone is never
/// sufficient when a hook is configured.
pub type AccessCheck = Arc<dyn Fn(&TenantClaims, &Tenant) -> bool + Send + Sync>;

/// Shared state for [`resolve_tenant`].
pub struct TenancyState<F: ClientFactory> {
    pub store: Arc<dyn TenantStore>,
    pub pool: Arc<TenantClientPool<F>>,
    pub verify_access: Option<AccessCheck>,
    /// When `true`, requests without a tenant claim pass through unscoped
    /// instead of being rejected.
    pub allow_no_tenant: bool,
    /// Shared public-schema handle exposed to handlers via the context.
    pub public_db: Option<PgPool>,
}

impl<F: ClientFactory> TenancyState<F> {
    pub fn new(store: Arc<dyn TenantStore>, pool: Arc<TenantClientPool<F>>) -> Self {
        Self {
            store,
            pool,
            verify_access: None,
            allow_no_tenant: false,
            public_db: None,
        }
    }

    pub fn with_verify_access(mut self, check: AccessCheck) -> Self {
        self.verify_access = Some(check);
        self
    }

    pub fn with_allow_no_tenant(mut self, allow: bool) -> Self {
        self.allow_no_tenant = allow;
        self
    }

    pub fn with_public_db(mut self, public_db: PgPool) -> Self {
        self.public_db = Some(public_db);
        self
    }
}

/// Middleware to resolve the active tenant and attach a scoped client
pub async fn resolve_tenant<F: ClientFactory>(
    State(state): State<Arc<TenancyState<F>>>,
    mut request: Request,
    next: Next,
) -> Result<Response, (StatusCode, Json<ErrorResponse>)> {
    let claims = claims_from_request(&request).unwrap_or_default();

    let key = match claims.tenant_id.clone() {
        Some(key) => key,
        None => {
            if state.allow_no_tenant {
                return Ok(next.run(request).await);
            }
            return Err((
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse::new(
                    "missing_tenant",
                    "No tenant identifier in request claims",
                )),
            ));
        }
    };

    let tenant = state.store.find_by_id_or_slug(&key).await.map_err(|e| {
        // Fail closed: an unresolvable tenant is indistinguishable from a
        // missing one as far as the caller is concerned.
        match e {
            DatabaseError::NotFound(_) => (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse::new("tenant_not_found", "Unknown tenant")),
            ),
            other => {
                tracing::error!(
                    tenant = %key,
                    error = %sanitize_error(&other.to_string()),
                    "tenant lookup failed"
                );
                (
                    StatusCode::NOT_FOUND,
                    Json(ErrorResponse::new("tenant_not_found", "Unknown tenant")),
                )
            }
        }
    })?;

    if !tenant.is_active() {
        return Err((
            StatusCode::FORBIDDEN,
            Json(ErrorResponse::new(
                "tenant_not_active",
                &format!("Tenant is {}", tenant.status),
            )),
        ));
    }

    if let Some(verify) = &state.verify_access {
        if !verify(&claims, &tenant) {
            tracing::warn!(tenant = %tenant.slug, "tenant access check rejected request");
            return Err((
                StatusCode::FORBIDDEN,
                Json(ErrorResponse::new(
                    "tenant_access_denied",
                    "Caller is not authorized for this tenant",
                )),
            ));
        }
    }

    let client = state
        .pool
        .get_client(&tenant.schema_name)
        .await
        .map_err(|e| {
            tracing::error!(tenant = %tenant.slug, error = %e, "failed to obtain tenant client");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new(
                    "tenant_connection_failed",
                    &sanitize_error(&e.to_string()),
                )),
            )
        })?;

    let mut context = TenantContext::new(tenant, client);
    if let Some(public_db) = &state.public_db {
        context.public_db = Some(public_db.clone());
    }
    request.extensions_mut().insert(context);

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::{body::Body, middleware, routing::get, Extension, Router};
    use chrono::Utc;
    use http_body_util::BodyExt;
    use pgtenant_database::{PoolClient, PoolConfig};
    use pgtenant_models::{CreateTenant, TenantStatus, UpdateTenant};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tower::ServiceExt;
    use uuid::Uuid;

    #[derive(Default)]
    struct FakeStore {
        tenants: Mutex<HashMap<String, Tenant>>,
    }

    impl FakeStore {
        fn insert(&self, slug: &str, status: TenantStatus) -> Tenant {
            let tenant = Tenant {
                id: Uuid::new_v4(),
                slug: slug.to_string(),
                name: slug.to_string(),
                schema_name: format!("tenant_{}", slug.replace('-', "_")),
                status,
                metadata: serde_json::json!({}),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            };
            self.tenants
                .lock()
                .unwrap()
                .insert(slug.to_string(), tenant.clone());
            tenant
        }
    }

    #[async_trait]
    impl TenantStore for FakeStore {
        async fn create(
            &self,
            _request: &CreateTenant,
            _schema_name: &str,
        ) -> pgtenant_database::Result<Tenant> {
            unimplemented!("not used by middleware")
        }

        async fn find_by_id_or_slug(&self, key: &str) -> pgtenant_database::Result<Tenant> {
            self.tenants
                .lock()
                .unwrap()
                .get(key)
                .cloned()
                .ok_or_else(|| DatabaseError::not_found("Tenant", key))
        }

        async fn find_many(
            &self,
            _status: Option<TenantStatus>,
            _limit: i64,
            _offset: i64,
        ) -> pgtenant_database::Result<Vec<Tenant>> {
            Ok(Vec::new())
        }

        async fn update_status(
            &self,
            _id: Uuid,
            _status: TenantStatus,
        ) -> pgtenant_database::Result<Tenant> {
            unimplemented!("not used by middleware")
        }

        async fn update(
            &self,
            _id: Uuid,
            _update: &UpdateTenant,
        ) -> pgtenant_database::Result<Tenant> {
            unimplemented!("not used by middleware")
        }

        async fn delete(&self, _id: Uuid) -> pgtenant_database::Result<()> {
            unimplemented!("not used by middleware")
        }
    }

    #[derive(Clone)]
    struct FakeClient {
        schema_name: String,
    }

    #[async_trait]
    impl PoolClient for FakeClient {
        async fn disconnect(&self) {}
    }

    struct FakeFactory;

    #[async_trait]
    impl ClientFactory for FakeFactory {
        type Client = FakeClient;

        async fn create_client(
            &self,
            schema_name: &str,
        ) -> pgtenant_database::Result<FakeClient> {
            Ok(FakeClient {
                schema_name: schema_name.to_string(),
            })
        }
    }

    async fn scoped_handler(
        Extension(ctx): Extension<TenantContext<FakeClient>>,
    ) -> String {
        format!("{}:{}", ctx.tenant.slug, ctx.db.schema_name)
    }

    async fn unscoped_handler() -> &'static str {
        "unscoped"
    }

    fn app(state: Arc<TenancyState<FakeFactory>>) -> Router {
        Router::new()
            .route("/", get(scoped_handler))
            .route_layer(middleware::from_fn_with_state(
                state,
                resolve_tenant::<FakeFactory>,
            ))
    }

    fn state_with(store: FakeStore) -> Arc<TenancyState<FakeFactory>> {
        let pool = TenantClientPool::new(FakeFactory, PoolConfig::default());
        Arc::new(TenancyState::new(Arc::new(store), pool))
    }

    fn request_with_claims(tenant_id: Option<&str>) -> Request {
        let mut request = Request::builder().uri("/").body(Body::empty()).unwrap();
        if let Some(id) = tenant_id {
            request.extensions_mut().insert(TenantClaims::new(id));
        }
        request
    }

    async fn body_string(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_missing_claim_is_unauthorized() {
        let state = state_with(FakeStore::default());

        let response = app(state)
            .oneshot(request_with_claims(None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_missing_claim_passes_through_when_allowed() {
        let store = FakeStore::default();
        let pool = TenantClientPool::new(FakeFactory, PoolConfig::default());
        let state = Arc::new(
            TenancyState::new(Arc::new(store), pool).with_allow_no_tenant(true),
        );

        let app = Router::new()
            .route("/", get(unscoped_handler))
            .route_layer(middleware::from_fn_with_state(
                state,
                resolve_tenant::<FakeFactory>,
            ));

        let response = app.oneshot(request_with_claims(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "unscoped");
    }

    #[tokio::test]
    async fn test_unknown_tenant_is_not_found() {
        let state = state_with(FakeStore::default());

        let response = app(state)
            .oneshot(request_with_claims(Some("ghost")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_inactive_tenant_is_forbidden() {
        let store = FakeStore::default();
        store.insert("dormant", TenantStatus::Suspended);
        let state = state_with(store);

        let response = app(state)
            .oneshot(request_with_claims(Some("dormant")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_access_check_rejection_overrides_claim() {
        let store = FakeStore::default();
        store.insert("acme-corp", TenantStatus::Active);
        let pool = TenantClientPool::new(FakeFactory, PoolConfig::default());
        let state = Arc::new(
            TenancyState::new(Arc::new(store), pool)
                .with_verify_access(Arc::new(|_, _| false)),
        );

        let response = app(state)
            .oneshot(request_with_claims(Some("acme-corp")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_active_tenant_gets_scoped_context() {
        let store = FakeStore::default();
        store.insert("acme-corp", TenantStatus::Active);
        let state = state_with(store);
        let pool = state.pool.clone();

        let response = app(state)
            .oneshot(request_with_claims(Some("acme-corp")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "acme-corp:tenant_acme_corp");
        assert!(pool.has_client("tenant_acme_corp").await);
    }

    #[tokio::test]
    async fn test_access_check_acceptance_passes_claims_and_tenant() {
        let store = FakeStore::default();
        let tenant = store.insert("acme-corp", TenantStatus::Active);
        let pool = TenantClientPool::new(FakeFactory, PoolConfig::default());
        let expected_id = tenant.id;
        let state = Arc::new(TenancyState::new(Arc::new(store), pool).with_verify_access(
            Arc::new(move |claims: &TenantClaims, tenant: &Tenant| {
                claims.tenant_id.as_deref() == Some("acme-corp") && tenant.id == expected_id
            }),
        ));

        let response = app(state)
            .oneshot(request_with_claims(Some("acme-corp")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
