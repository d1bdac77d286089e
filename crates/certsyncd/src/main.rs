// # certsyncd - certificate lifecycle runner
//
// The certsyncd binary is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing the runtime
// 3. Registering storage, store and authority backends
// 4. Running the engine once and printing the result as JSON on stdout
//
// It is a thin integration layer; all lifecycle logic lives in certsync-core.
//
// ## Configuration
//
// ### Domains
// - `DOMAINS_LIST`: Comma-separated list of domains to manage
// - `DOMAINS_EMAIL`: Contact address used for issuance
// - `CERTS_RENEW_DAYS_BEFORE_EXPIRATION`: Renewal threshold in days (default 30)
//
// ### Snapshot
// - `CERTBOT_BUCKET`: Bucket holding the authority tree snapshot
// - `CERTBOT_OBJECT`: Object key of the snapshot (default certbot.tar.gz)
// - `CERTSYNC_WORKSPACE`: Local workspace root (default /tmp/certbot)
//
// ### Object Storage
// - `CERTSYNC_STORAGE_TYPE`: file, memory or http (default file)
// - `CERTSYNC_STORAGE_ROOT`: Bucket directory root (for file)
// - `CERTSYNC_STORAGE_ENDPOINT` / `CERTSYNC_STORAGE_TOKEN`: (for http)
//
// ### Certificate Store
// - `CERTSYNC_STORE_TYPE`: file or memory (default file)
// - `CERTSYNC_STORE_PATH`: Inventory file (for file)
//
// ### Authority
// - `CERTBOT_BINARY`, `CERTBOT_SERVER`
// - `CERTSYNC_AUTH_HOOK`, `CERTSYNC_CLEANUP_HOOK`
//
// ## Example
//
// ```bash
// export DOMAINS_LIST=example.com,www.example.com
// export DOMAINS_EMAIL=ops@example.com
// export CERTBOT_BUCKET=certbot-state
// export CERTSYNC_STORAGE_TYPE=http
// export CERTSYNC_STORAGE_ENDPOINT=https://storage.example.net
//
// certsyncd
// ```

use anyhow::Result;
use certsync_core::{CertSyncEngine, EngineEvent, RunReport};
use certsyncd::{CertsyncExitCode, Settings, build_registry, init_tracing, join_event_logger};
use std::process::ExitCode;
use tracing::{debug, error, info};

fn main() -> ExitCode {
    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return CertsyncExitCode::ConfigError.into();
        }
    };

    if let Err(e) = settings.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return CertsyncExitCode::ConfigError.into();
    }

    if let Err(e) = init_tracing(&settings.log_level) {
        eprintln!("{}", e);
        return CertsyncExitCode::ConfigError.into();
    }

    info!("Starting certsyncd");

    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return CertsyncExitCode::RuntimeError.into();
        }
    };

    let code = rt.block_on(async {
        match run(settings).await {
            Ok(report) => match serde_json::to_string(&report) {
                Ok(json) => {
                    println!("{}", json);
                    CertsyncExitCode::Completed
                }
                Err(e) => {
                    error!("Failed to serialize result: {}", e);
                    CertsyncExitCode::RuntimeError
                }
            },
            Err(e) => {
                error!("Run failed: {:#}", e);
                CertsyncExitCode::RuntimeError
            }
        }
    });

    code.into()
}

/// Run the engine once
async fn run(settings: Settings) -> Result<RunReport> {
    if !settings.is_actionable() {
        // No collaborator is even constructed
        return Ok(RunReport::noop());
    }

    let config = settings.to_config()?;
    info!(
        "Managing {} domain(s), renewing under {} days",
        config.domains.len(),
        config.renew_days_before_expiration
    );

    let registry = build_registry();
    let storage = registry.create_object_storage(&config.storage)?;
    let store = registry.create_certificate_store(&config.store).await?;
    let authority = registry.create_authority(&config.authority)?;

    let (engine, mut events) = CertSyncEngine::new(storage, store, authority, config)?;

    let event_logger = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            log_event(&event);
        }
    });

    let result = engine.run().await;

    // Closing the channel ends the logger
    drop(engine);
    join_event_logger(event_logger).await;

    Ok(result?)
}

fn log_event(event: &EngineEvent) {
    match event {
        EngineEvent::DomainFailed { domain, error } => {
            debug!(domain = %domain, "event: domain failed: {}", error)
        }
        other => debug!("event: {:?}", other),
    }
}
