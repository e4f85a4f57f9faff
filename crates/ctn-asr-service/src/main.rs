//! # CTN ASR Service
//!
//! Binary entry point for the CTN association-registry HTTP service.
//!
//! This executable:
//! - Loads configuration from environment and files
//! - Initializes observability (logging, tracing)
//! - Builds the circuit breaker registry and guarded registry clients
//! - Starts the HTTP server from ctn-asr-api

mod registry_client;
mod token_verifier;

use std::sync::Arc;

use ctn_asr_api::{start_server, ServiceConfig, ServiceError};
use ctn_asr_core::audit::TracingAuditSink;
use ctn_asr_core::verification::{
    GuardedRegistryClient, VerificationBreakerRegistry, VerificationService, GLEIF_REGISTRY,
    KVK_REGISTRY, PEPPOL_REGISTRY,
};
use registry_client::HttpRegistryClient;
use token_verifier::StaticTokenVerifier;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "ctn_asr_service=info,ctn_asr_api=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting CTN ASR Service");

    // -------------------------------------------------------------------------
    // Load configuration
    //
    // Sources (applied in order — later sources override earlier ones):
    //  1. /etc/ctn-asr/service.yaml        — system-wide defaults
    //  2. ./config/service.yaml            — deployment-local override
    //  3. Path given by ASR_CONFIG_FILE env — operator-specified file
    //  4. Environment variables prefixed ASR__ (double-underscore separator)
    //     e.g. ASR__SERVER__PORT=9090 sets server.port = 9090
    //
    // All service configuration fields carry serde defaults, so absent files
    // or an entirely unconfigured environment produces a valid service config
    // with built-in defaults.  A malformed file or an environment variable
    // that cannot be coerced to the correct type IS a hard error because it
    // indicates deliberate-but-broken operator configuration.
    // -------------------------------------------------------------------------
    let mut config_builder = config::Config::builder()
        .add_source(
            config::File::with_name("/etc/ctn-asr/service")
                .required(false)
                .format(config::FileFormat::Yaml),
        )
        .add_source(
            config::File::with_name("config/service")
                .required(false)
                .format(config::FileFormat::Yaml),
        );

    // Optional explicit path supplied by the operator.
    if let Ok(explicit_path) = std::env::var("ASR_CONFIG_FILE") {
        if !explicit_path.is_empty() {
            config_builder = config_builder.add_source(
                config::File::with_name(&explicit_path)
                    .required(true)
                    .format(config::FileFormat::Yaml),
            );
            info!(path = %explicit_path, "Loading configuration from explicit path");
        }
    }

    let config = match config_builder
        .add_source(config::Environment::with_prefix("ASR").separator("__"))
        .build()
    {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "Failed to build configuration; aborting");
            std::process::exit(3);
        }
    };

    let service_config: ServiceConfig = match config.try_deserialize() {
        Ok(sc) => sc,
        Err(e) => {
            error!(
                error = %e,
                "Could not deserialize service configuration; aborting. \
                 Fix the configuration and restart."
            );
            std::process::exit(3);
        }
    };

    if let Err(e) = service_config.validate() {
        error!(error = %e, "Service configuration is invalid; aborting");
        std::process::exit(3);
    }

    // -------------------------------------------------------------------------
    // Composition root
    //
    // One circuit breaker per external registry, registered under the
    // canonical registry name regardless of what the configuration file
    // calls it, so the admin API, health checks, and guarded clients all
    // agree on breaker identity.  The breaker registry and the guarded
    // clients share the same breaker instances.
    // -------------------------------------------------------------------------
    let breakers = Arc::new(VerificationBreakerRegistry::new());
    let mut verification = VerificationService::new();

    let registry_targets = [
        (KVK_REGISTRY, &service_config.registries.kvk),
        (GLEIF_REGISTRY, &service_config.registries.gleif),
        (PEPPOL_REGISTRY, &service_config.registries.peppol),
    ];

    for (registry_name, target) in registry_targets {
        let mut breaker_config = target.breaker.clone();
        breaker_config.name = registry_name.to_string();
        let breaker = breakers.register(breaker_config);

        let client = match HttpRegistryClient::new(
            registry_name,
            &target.base_url,
            std::time::Duration::from_secs(target.timeout_seconds),
        ) {
            Ok(client) => client,
            Err(e) => {
                error!(
                    registry = %registry_name,
                    error = %e,
                    "Failed to construct registry HTTP client; aborting"
                );
                std::process::exit(3);
            }
        };

        verification.register(GuardedRegistryClient::new(Arc::new(client), breaker));
        info!(
            registry = %registry_name,
            base_url = %target.base_url,
            "Registered guarded registry client"
        );
    }

    let token_verifier = Arc::new(StaticTokenVerifier::new(
        service_config.security.admin_token.clone(),
        service_config.security.admin_subject.clone(),
    ));

    let audit = Arc::new(TracingAuditSink);

    info!(
        host = %service_config.server.host,
        port = service_config.server.port,
        "Starting HTTP server"
    );

    // Start the server
    if let Err(e) = start_server(
        service_config,
        Arc::new(verification),
        breakers,
        token_verifier,
        audit,
    )
    .await
    {
        error!("Failed to start server: {}", e);

        let exit_code = match e {
            ServiceError::BindFailed { .. } => 1,
            ServiceError::ServerFailed { .. } => 2,
            ServiceError::Configuration(_) => 3,
        };

        std::process::exit(exit_code);
    }

    Ok(())
}
