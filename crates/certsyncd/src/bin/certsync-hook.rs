// # certsync-hook - HTTP-01 challenge hook
//
// Invoked by certbot as `--manual-auth-hook` / `--manual-cleanup-hook`:
//
// ```bash
// certsync-hook auth      # publish CERTBOT_VALIDATION for CERTBOT_TOKEN
// certsync-hook cleanup   # remove it again
// ```
//
// certbot provides `CERTBOT_DOMAIN`, `CERTBOT_TOKEN` and (for auth)
// `CERTBOT_VALIDATION`. The response is written to the bucket named after
// the domain, under `.well-known/acme-challenge/<token>`, using the same
// `CERTSYNC_STORAGE_*` settings as certsyncd.

use anyhow::{Context, Result};
use certsync_core::ChallengePublisher;
use certsyncd::{CertsyncExitCode, StorageSettings, build_registry, init_tracing};
use std::env;
use std::process::ExitCode;
use tracing::error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HookAction {
    Auth,
    Cleanup,
}

fn required(name: &str) -> Result<String> {
    env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .with_context(|| format!("{} is not set; this hook must be run by certbot", name))
}

fn main() -> ExitCode {
    let action = match env::args().nth(1).as_deref() {
        Some("auth") => HookAction::Auth,
        Some("cleanup") => HookAction::Cleanup,
        _ => {
            eprintln!("usage: certsync-hook {{auth|cleanup}}");
            return CertsyncExitCode::ConfigError.into();
        }
    };

    let storage = StorageSettings::from_lookup(&|key| env::var(key).ok());
    if let Err(e) = storage.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return CertsyncExitCode::ConfigError.into();
    }

    let log_level = env::var("CERTSYNC_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    if let Err(e) = init_tracing(&log_level) {
        eprintln!("{}", e);
        return CertsyncExitCode::ConfigError.into();
    }

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

    match rt.block_on(run(action, storage)) {
        Ok(()) => CertsyncExitCode::Completed.into(),
        Err(e) => {
            error!("Challenge hook failed: {:#}", e);
            CertsyncExitCode::RuntimeError.into()
        }
    }
}

async fn run(action: HookAction, storage: StorageSettings) -> Result<()> {
    let domain = required("CERTBOT_DOMAIN")?;
    let token = required("CERTBOT_TOKEN")?;

    let storage = build_registry().create_object_storage(&storage.to_config())?;
    let publisher = ChallengePublisher::new(storage);

    match action {
        HookAction::Auth => {
            let validation = required("CERTBOT_VALIDATION")?;
            publisher.publish(&domain, &token, &validation).await?;
        }
        HookAction::Cleanup => publisher.remove(&domain, &token).await?,
    }
    Ok(())
}
