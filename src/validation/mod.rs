//! Concurrent resolution of certificate and revocation dependencies

mod context;
mod errors;

pub use context::{DEFAULT_MAX_CONCURRENCY, ValidationContext, ValidationContextBuilder};
pub use errors::{ResolutionError, TaskError, ValidationError, ValidationResult};
