pub mod connection;
pub mod error;
pub mod pool;
pub mod repositories;
pub mod sanitize;
pub mod schema;

pub use connection::{Database, DatabaseConfig};
pub use error::{DatabaseError, Result, SchemaError};
pub use pool::{
    ClientFactory, PgClientFactory, PgTenantClient, PoolClient, PoolConfig, PoolStats,
    TenantClientPool,
};
pub use repositories::tenants::{TenantRepository, TenantStore};
pub use sanitize::sanitize_error;
pub use schema::{
    slug_to_schema_name, validate_schema_name, validate_slug, SchemaConfig, SchemaCreateOutcome,
    SchemaManager, SchemaMigrateOutcome, SchemaOps,
};
