use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::{Result, eyre};
use ltv_engine::{
    config::{Config, LoaderConfig},
    crypto::DigestAlgorithm,
    loader::{
        DataLoader, FileCacheDataLoader, HttpDataLoader, OCSP_REQUEST_CONTENT_TYPE,
        TIMESTAMP_QUERY_CONTENT_TYPE,
    },
    revocation::{
        CachedRevocationSource, FreshnessCache, OnlineCrlSource, OnlineOcspSource,
        RevocationSource,
    },
    telemetry,
    token::CertificateToken,
    trust::{CommonCertificateSource, decode_certificates},
    tsp::{OnlineTspSource, TspSource},
    validation::ValidationContext,
};

/// Resolve certificate chains and revocation proofs for long-term validation
#[derive(Parser, Debug)]
#[command(name = "ltv-check")]
#[command(version, about, long_about = None)]
struct Args {
    /// Certificate files (DER or PEM) to resolve
    #[arg(required = true)]
    certificates: Vec<PathBuf>,

    /// Directory of trust anchors, overriding the configured one
    #[arg(long)]
    anchors: Option<PathBuf>,

    /// Request a time-stamp over this file from the configured TSA
    #[arg(long)]
    timestamp: Option<PathBuf>,
}

fn build_loader(config: &LoaderConfig, content_type: Option<&str>) -> Result<Arc<dyn DataLoader>> {
    let mut http = HttpDataLoader::new(config.timeout_secs)?;
    if let Some(content_type) = content_type {
        http = http.with_content_type(content_type);
    }
    let http: Arc<dyn DataLoader> = Arc::new(http);

    let Some(cache_dir) = &config.cache_dir else {
        return Ok(http);
    };
    let mut cache =
        FileCacheDataLoader::new(http, cache_dir).with_ignored_urls(config.ignored_urls.clone());
    if let Some(allowed) = &config.allowed_urls {
        cache = cache.with_allowed_urls(allowed.clone());
    }
    Ok(Arc::new(cache))
}

fn build_context(config: &Config, trusted: CommonCertificateSource) -> Result<ValidationContext> {
    let freshness = Arc::new(FreshnessCache::new(config.freshness));
    let preferred = config.revocation.preferred_protocol;
    let loader = build_loader(&config.loader, None)?;

    let mut builder = ValidationContext::builder()
        .trusted_source(Arc::new(trusted))
        .aia_loader(loader.clone())
        .max_concurrency(config.validation.max_concurrency);

    if config.revocation.use_ocsp {
        let source = OnlineOcspSource::builder()
            .loader(build_loader(&config.loader, Some(OCSP_REQUEST_CONTENT_TYPE))?)
            .preferred_protocol(preferred)
            .build()?;
        let source: Arc<dyn RevocationSource> = if config.revocation.cached {
            Arc::new(CachedRevocationSource::new(source, freshness.clone()))
        } else {
            Arc::new(source)
        };
        builder = builder.ocsp_source(source);
    }

    if config.revocation.use_crl {
        let source = OnlineCrlSource::builder()
            .loader(loader)
            .preferred_protocol(preferred)
            .build()?;
        let source: Arc<dyn RevocationSource> = if config.revocation.cached {
            Arc::new(CachedRevocationSource::new(source, freshness))
        } else {
            Arc::new(source)
        };
        builder = builder.crl_source(source);
    }

    Ok(builder.build()?)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    color_eyre::install()?;
    telemetry::init_tracing();

    let args = Args::parse();

    // Load configuration
    let config = Config::load()?;
    tracing::info!("Loaded configuration: {:?}", config);

    let trusted = CommonCertificateSource::new();
    if let Some(dir) = args.anchors.as_ref().or(config.trust.anchors_dir.as_ref()) {
        trusted.load_directory(dir, true).await?;
    }
    if trusted.is_empty() {
        tracing::warn!("No trust anchors loaded; chains will end at the last known issuer");
    }

    let context = build_context(&config, trusted)?;
    let mut targets = Vec::new();
    for path in &args.certificates {
        let bytes = tokio::fs::read(path).await?;
        for der in decode_certificates(&bytes)? {
            let token = Arc::new(CertificateToken::from_der(der)?);
            targets.push(context.add_certificate_token_for_verification(token));
        }
    }

    context.validate().await?;

    for target in &targets {
        println!("{}", target.subject());
        for (depth, certificate) in context.certificate_chain(target).iter().enumerate() {
            println!("  [{depth}] {} (id {})", certificate.subject(), certificate.id());
            for proof in context.revocations_for(certificate) {
                println!(
                    "      {} {:?} this_update={} next_update={} source={}",
                    proof.kind(),
                    proof.status(),
                    proof.this_update(),
                    proof
                        .next_update()
                        .map_or_else(|| "-".to_string(), |t| t.to_string()),
                    proof.source_url().unwrap_or("-"),
                );
            }
        }
    }

    if let Some(path) = &args.timestamp {
        let tsp = config
            .tsp
            .as_ref()
            .ok_or_else(|| eyre!("--timestamp requires tsp.url to be configured"))?;
        let loader = build_loader(&config.loader, Some(TIMESTAMP_QUERY_CONTENT_TYPE))?;
        let mut source = OnlineTspSource::new(&tsp.url, loader);
        if let Some(policy) = &tsp.policy_oid {
            source = source.with_policy_oid(policy);
        }

        let data = tokio::fs::read(path).await?;
        let algorithm = DigestAlgorithm::Sha256;
        let token = source
            .get_timestamp_response(algorithm, &algorithm.digest(&data))
            .await?;
        println!(
            "Time-stamp for {}: {} (id {})",
            path.display(),
            token.generation_time(),
            token.id()
        );
    }

    Ok(())
}
