//! cmolabel-gen - CMO Label Generator Microservice
//!
//! Consumes sample/request events from the messaging gateway, assigns CMO
//! labels, and republishes enriched events; answers synchronous label
//! previews over request/reply.

use anyhow::Result;
use clap::Parser;
use cmolabel_common::config::ServiceConfig;
use cmolabel_common::messaging::MessageBus;
use cmolabel_gen::audit::FileAuditLog;
use cmolabel_gen::pipeline::PipelineContext;
use cmolabel_gen::store::BusSampleStore;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "cmolabel-gen", about = "CMO label generator microservice")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, env = "CMOLABEL_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting cmolabel-gen (CMO Label Generator) microservice");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();
    let config = ServiceConfig::load(cli.config.as_deref())?;
    config.validate()?;

    let bus = MessageBus::new(config.queue_capacity);
    info!("Message bus initialized");

    let audit = Arc::new(FileAuditLog::open(&config.audit_log_path).await?);
    info!("Audit log: {}", audit.path().display());

    let store = Arc::new(BusSampleStore::new(
        bus.clone(),
        config.topics.patient_samples_request.clone(),
        config.topics.alt_id_samples_request.clone(),
        Duration::from_millis(config.request_timeout_ms),
    ));

    let pipeline = PipelineContext::start(&config, bus, store, audit).await?;
    info!("Listening for sample and request events");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    pipeline.shutdown().await;

    Ok(())
}
