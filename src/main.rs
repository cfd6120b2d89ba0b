use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use recommender_service::auth::AuthService;
use recommender_service::config::Config;
use recommender_service::embedding::EmbeddingBuilder;
use recommender_service::encoder::build_encoder;
use recommender_service::engines::{
    EmbeddingEngine, Engines, JaccardEngine, WeightedCountEngine,
};
use recommender_service::graph::GraphClient;
use recommender_service::projector::Projector;
use recommender_service::routes::{router, AppState};
use recommender_service::store::{DocumentStore, MongoStore};

#[derive(Parser)]
#[command(name = "recommender-service", about = "Social graph recommendation service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API
    Serve,
    /// Rebuild the graph view from the document store
    Sync {
        /// Erase the graph before projecting
        #[arg(long)]
        erase: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    dotenvy::dotenv().ok();
    let config = Config::from_env();
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Sync { erase } => run_sync(config, erase).await,
        Command::Serve => serve(config).await,
    }
}

async fn run_sync(config: Config, erase: bool) -> Result<()> {
    let store: Arc<dyn DocumentStore> =
        Arc::new(MongoStore::connect(&config.mongo_uri, &config.mongo_db).await?);
    let graph = GraphClient::connect(&config).await?;
    let projector = Projector::new(store, graph);
    let report = projector.run(erase).await?;
    for step in &report.steps {
        info!(step = step.step, records = step.records, "synchronized");
    }
    Ok(())
}

async fn serve(config: Config) -> Result<()> {
    info!("Starting recommender service...");
    info!(uri = %config.mongo_uri, database = %config.mongo_db, "document store");
    info!(uri = %config.neo4j_uri, "graph store");

    let store: Arc<dyn DocumentStore> =
        Arc::new(MongoStore::connect(&config.mongo_uri, &config.mongo_db).await?);
    let graph = GraphClient::connect(&config).await?;
    graph.ensure_constraints().await?;

    let encoder = build_encoder(&config);
    let builder = Arc::new(EmbeddingBuilder::new(
        store.clone(),
        encoder,
        config.embedding_ttl_hours,
    ));
    let engines = Arc::new(Engines {
        jaccard: JaccardEngine::new(graph.clone()),
        weighted: WeightedCountEngine::new(graph.clone()),
        embedding: EmbeddingEngine::new(store.clone(), builder),
    });
    let auth = Arc::new(AuthService::new(&config, store.clone())?);

    let state = AppState {
        engines,
        auth,
        service_mode: config.service_mode.clone(),
        request_timeout: Duration::from_secs(config.request_timeout_secs),
    };
    let app = router(state);

    let listener =
        tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.server_port)).await?;
    info!(port = config.server_port, "recommender service started");
    axum::serve(listener, app).await?;
    Ok(())
}
