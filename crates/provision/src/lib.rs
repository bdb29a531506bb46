pub mod error;
pub mod service;

pub use error::{ProvisionError, Result};
pub use service::{MigrateAllEntry, ProvisionOutcome, ProvisioningService};
