//! Deploy one certificate to one target.
//!
//! Usage:
//!   cargo run --example deploy
//!
//! Environment (a `.env` file is read too):
//!   DEPLOY_TARGET       - target tag, e.g. `aliyun-clb`, `qiniu-cdn`, `local` (required)
//!   DEPLOY_CONFIG       - target config as a JSON object (default: `{}`)
//!   DEPLOY_CREDENTIALS  - credentials JSON, e.g. `{"provider":"qiniu",...}` (required)
//!   DEPLOY_CERT         - path to the PEM certificate chain (required)
//!   DEPLOY_KEY          - path to the PEM private key (required)
//!   RUST_LOG            - tracing filter (default: `info,cert_deploy_rs=debug`)

use cert_deploy_rs::{
    Credentials, Deployer, DeployerRegistry, DeploymentRecord, Outcome, StdoutStore,
    TracingLogger,
};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

fn required(name: &str) -> Result<String, Box<dyn std::error::Error>> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(format!("{} is not set", name).into()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,cert_deploy_rs=debug")),
        )
        .init();

    let target = required("DEPLOY_TARGET")?;
    let config: Map<String, Value> =
        serde_json::from_str(&std::env::var("DEPLOY_CONFIG").unwrap_or_else(|_| "{}".into()))?;
    let credentials: Credentials = serde_json::from_str(&required("DEPLOY_CREDENTIALS")?)?;
    let cert_pem = tokio::fs::read_to_string(required("DEPLOY_CERT")?).await?;
    let key_pem = tokio::fs::read_to_string(required("DEPLOY_KEY")?).await?;

    let registry = DeployerRegistry::with_builtin().with_logger(Arc::new(TracingLogger));
    let deployer = registry.resolve(&target, &config, credentials)?;

    // Ctrl-C stops between resources; whatever was bound stays bound.
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    println!();
    println!("═══════════════════════════════════════════════════════════════════════");
    println!("  DEPLOYING to {}", deployer.id());
    println!("═══════════════════════════════════════════════════════════════════════");
    println!();

    let run = deployer.deploy(&cancel, &cert_pem, &key_pem).await;
    let record = DeploymentRecord::from_run(deployer.id(), None, &run, deployer.log_entries());
    println!("{}", StdoutStore::render(&record)?);

    let result = run?;
    match result.outcome {
        Outcome::Success => println!("\n  deployed to {} resource(s)", result.updated.len()),
        outcome => {
            println!("\n  {:?}: {} of {} resource(s) updated", outcome, result.updated.len(), result.discovered.len());
            for (resource, error) in result.per_resource_errors() {
                println!("    {} -> {}", resource, error);
            }
        }
    }

    result.into_result()?;
    Ok(())
}
