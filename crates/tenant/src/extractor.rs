// Tenant claim extraction from request extensions.

use axum::extract::Request;

/// Tenant identifier carried by the application's authentication layer.
///
/// The auth middleware upstream of tenant resolution is expected to insert
/// this into request extensions after validating the caller's credentials.
/// The identifier may be a tenant UUID or a slug.
#[derive(Debug, Clone, Default)]
pub struct TenantClaims {
    pub tenant_id: Option<String>,
}

impl TenantClaims {
    pub fn new(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: Some(tenant_id.into()),
        }
    }
}

/// Read the claims previously attached by the auth layer, if any.
pub fn claims_from_request(request: &Request) -> Option<TenantClaims> {
    request.extensions().get::<TenantClaims>().cloned()
}
