mod analysis;
mod collection;
mod config;
mod db;
mod errors;
mod llm_client;
mod models;
mod pipeline;
mod routes;
mod scoring;
mod state;
mod store;
mod sync;
#[cfg(test)]
mod testing;

use anyhow::Result;
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::analysis::{AnalysisStage, LlmScoringOracle};
use crate::collection::feed::FeedListingSource;
use crate::collection::CollectionStage;
use crate::config::{Config, S3Settings};
use crate::db::create_pool;
use crate::llm_client::LlmClient;
use crate::pipeline::{Orchestrator, OrchestratorSettings, RunReportArchive, Stages};
use crate::routes::build_router;
use crate::state::AppState;
use crate::store::postgres::PgRecordStore;
use crate::store::RecordStore;
use crate::sync::{BitableStore, SyncStage};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting screener v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url).await?;
    let store: Arc<dyn RecordStore> = Arc::new(PgRecordStore::new(db));

    // Collection: listing feed
    let source = FeedListingSource::new(&config.listing_feed_url, config.listing_source.clone())?;
    info!(
        "Listing source '{}' at {}",
        config.listing_source, config.listing_feed_url
    );

    // Analysis: LLM scoring oracle
    let llm = LlmClient::new(
        config.llm.api_key.clone(),
        &config.llm.base_url,
        config.llm.model.clone(),
    )?;
    info!("LLM client initialized (model: {})", config.llm.model);

    // Sync: Bitable table
    let table = BitableStore::new(
        &config.bitable.base_url,
        &config.bitable.app_token,
        &config.bitable.table_id,
        config.bitable.access_token.clone(),
    )?;
    info!("Bitable table {} initialized", config.bitable.table_id);

    let settings = &config.pipeline;
    info!("Pipeline settings: {:?}", settings);

    let stages = Stages {
        collection: CollectionStage::new(
            Arc::new(source),
            store.clone(),
            settings.pacing,
            settings.breaker_threshold,
        ),
        analysis: AnalysisStage::new(
            Arc::new(LlmScoringOracle::new(llm)),
            store.clone(),
            settings.analysis_concurrency,
        ),
        sync: SyncStage::new(Arc::new(table), settings.sync_batch_size),
    };

    // Run reports go to S3 / MinIO when configured
    let archive = match &config.s3 {
        Some(s3) => {
            let client = build_s3_client(s3).await;
            info!("S3 client initialized, run reports go to bucket {}", s3.bucket);
            Some(RunReportArchive::new(client, s3.bucket.clone()))
        }
        None => {
            info!("S3 not configured, run reports are not archived");
            None
        }
    };

    let orchestrator = Orchestrator::new(
        stages,
        OrchestratorSettings {
            history_capacity: settings.history_capacity,
            max_failure_ratio: settings.analysis_max_failure_ratio,
        },
        archive,
    );

    // Structured event trail for every run
    orchestrator.events().subscribe_all(|event| {
        debug!("Pipeline event: {}", serde_json::to_string(event)?);
        Ok(())
    });

    // Build app state
    let state = AppState {
        store,
        orchestrator,
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: tighten CORS in production

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Constructs an S3 client configured for MinIO (local) or AWS (production).
async fn build_s3_client(settings: &S3Settings) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        &settings.access_key_id,
        &settings.secret_access_key,
        None,
        None,
        "screener-static",
    );

    let s3_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(credentials)
        .endpoint_url(&settings.endpoint)
        .load()
        .await;

    aws_sdk_s3::Client::new(&s3_config)
}
