use std::collections::HashMap;
use std::path::PathBuf;

use config::{Config as ConfigLib, ConfigError, Environment, File};
use serde::Deserialize;

use crate::loader::Protocol;
use crate::revocation::FreshnessPolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub loader: LoaderConfig,
    pub freshness: FreshnessPolicy,
    pub revocation: RevocationConfig,
    pub validation: ValidationConfig,
    #[serde(default)]
    pub trust: TrustConfig,
    #[serde(default)]
    pub tsp: Option<TspConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoaderConfig {
    pub timeout_secs: u64,
    /// Responses are cached on disk when set
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    /// Only these URLs are fetched when set
    #[serde(default)]
    pub allowed_urls: Option<Vec<String>>,
    #[serde(default)]
    pub ignored_urls: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RevocationConfig {
    #[serde(default)]
    pub preferred_protocol: Option<Protocol>,
    pub use_ocsp: bool,
    pub use_crl: bool,
    /// Wrap online sources in the freshness cache
    pub cached: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValidationConfig {
    pub max_concurrency: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrustConfig {
    #[serde(default)]
    pub anchors_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TspConfig {
    pub url: String,
    #[serde(default)]
    pub policy_oid: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_sources(None)
    }

    pub fn load_with_sources(
        env_vars: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = ConfigLib::builder()
            .set_default("loader.timeout_secs", 30)?
            .set_default("freshness.tolerance", 1)?
            .set_default("freshness.unit", "days")?
            .set_default("revocation.use_ocsp", true)?
            .set_default("revocation.use_crl", true)?
            .set_default("revocation.cached", true)?
            .set_default("validation.max_concurrency", 8)?
            .add_source(File::with_name("config/ltv").required(false));

        // Explicit overrides replace the process environment so tests stay isolated
        if let Some(vars) = env_vars {
            for (key, value) in vars {
                builder = builder.set_override(&key, value)?;
            }
        } else {
            // e.g. LTV_LOADER__TIMEOUT_SECS or LTV_LOADER__IGNORED_URLS=a,b
            builder = builder.add_source(
                Environment::with_prefix("LTV")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("loader.allowed_urls")
                    .with_list_parse_key("loader.ignored_urls")
                    .try_parsing(true),
            );
        }

        builder.build()?.try_deserialize()
    }
}
