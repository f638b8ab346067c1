pub mod config;
pub mod crypto;
pub mod loader;
pub mod revocation;
pub mod signature;
pub mod telemetry;
pub mod token;
pub mod trust;
pub mod tsp;
pub mod validation;
