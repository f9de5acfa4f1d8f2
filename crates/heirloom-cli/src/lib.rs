//! Wiring for the `heirloom` binary: tracing setup and construction of the injected
//! storage, record store, and extraction clients.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use heirloom_core::Config;
use heirloom_db::{create_record_store, DraftRepository, LetterRepository};
use heirloom_processing::ObjectStager;
use heirloom_services::{
    AnthropicExtractionClient, ExtractionClient, IngestionPipeline, PublishCoordinator,
};
use heirloom_storage::create_storage;

/// Initialize tracing for the CLI. `LOG_FORMAT=json` selects JSON output.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if json_logs(std::env::var("LOG_FORMAT").ok().as_deref()) {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn json_logs(format: Option<&str>) -> bool {
    format.is_some_and(|f| f.eq_ignore_ascii_case("json"))
}

/// Client handles shared by every subcommand.
pub struct AppContext {
    pub pipeline: IngestionPipeline,
    pub coordinator: PublishCoordinator,
    pub drafts: DraftRepository,
}

impl AppContext {
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let storage = create_storage(config)
            .await
            .context("Failed to initialize object storage")?;
        let records = create_record_store(config)
            .await
            .context("Failed to initialize record store")?;
        let extraction: Arc<dyn ExtractionClient> = Arc::new(
            AnthropicExtractionClient::from_config(config)
                .context("Failed to initialize extraction client")?,
        );

        tracing::info!(
            environment = %config.environment,
            storage = %storage.backend_type(),
            record_store = %config.record_store_backend,
            extraction = extraction.name(),
            "Clients initialized"
        );

        let drafts = DraftRepository::new(records.clone());
        let letters = LetterRepository::new(records);

        let stager = ObjectStager::new(
            storage.clone(),
            config.staging_fetch_concurrency,
            config.max_part_size_bytes,
        );
        let pipeline = IngestionPipeline::new(
            stager,
            storage.clone(),
            extraction,
            drafts.clone(),
            Duration::from_secs(config.extraction_timeout_secs),
        );
        let coordinator = PublishCoordinator::new(letters, drafts.clone(), storage);

        Ok(Self {
            pipeline,
            coordinator,
            drafts,
        })
    }
}
