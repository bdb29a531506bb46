// Request-time tenant resolution: claims in, scoped database client out.

pub mod context;
pub mod extractor;
pub mod middleware;

pub use context::TenantContext;
pub use extractor::TenantClaims;
pub use middleware::{resolve_tenant, AccessCheck, ErrorResponse, TenancyState};
