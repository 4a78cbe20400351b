use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use draftsmith_config::{load_config, DraftsmithConfig};
use draftsmith_core::{
    ExecutionPlanner, IntentResolver, LlmEvaluator, PatternEvaluator, QualityEvaluator,
    ResolverConfig, TaskStore,
};
use draftsmith_runtime::stages::default_registry;
use draftsmith_runtime::{Worker, WorkerConfig};
use draftsmith_stores::{BroadcastNotifier, InMemoryTaskStore, TaskNotifier};

mod api;
mod providers;

use api::AppState;
use providers::{KeywordClassifier, SimulatedImages, SimulatedModel, SimulatedSearch};

#[derive(Debug, Parser)]
#[command(name = "draftsmith-server")]
struct Args {
    #[arg(long, default_value = "config/draftsmith.yaml")]
    config: PathBuf,
    #[arg(long, default_value = "127.0.0.1:8080")]
    listen: SocketAddr,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = load_config(&args.config)
        .with_context(|| format!("load config from {}", args.config.display()))?;
    info!(app = %config.app.name, "starting draftsmith-server");

    let state = build_state(&config);
    let worker = Worker::new(
        state.store.clone(),
        state.notifier.clone(),
        state.registry.clone(),
        gate_evaluator(&config),
        WorkerConfig::from_settings(&config.worker),
    );

    let shutdown = CancellationToken::new();
    let worker_handle = tokio::spawn({
        let token = shutdown.clone();
        async move { worker.run(token).await }
    });

    let app = api::router(state);
    let listener = tokio::net::TcpListener::bind(args.listen)
        .await
        .context("bind server listener failed")?;
    println!("draftsmith-server listening on http://{}", args.listen);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("server terminated with error")?;

    shutdown.cancel();
    if let Ok(Err(e)) = worker_handle.await {
        error!(error = %e, "worker exited with error");
    }
    Ok(())
}

fn build_state(config: &DraftsmithConfig) -> AppState {
    let model = Arc::new(SimulatedModel);
    let evaluator = gate_evaluator(config);

    let store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());
    let notifier: Arc<dyn TaskNotifier> = Arc::new(BroadcastNotifier::default());
    let registry = Arc::new(default_registry(
        model,
        Arc::new(SimulatedSearch),
        Arc::new(SimulatedImages),
        evaluator,
    ));
    let resolver = Arc::new(IntentResolver::with_config(
        Arc::new(KeywordClassifier),
        ResolverConfig {
            confidence_floor: config.resolver.confidence_floor,
        },
    ));

    AppState {
        resolver,
        planner: ExecutionPlanner::new(),
        store,
        notifier,
        registry,
    }
}

fn gate_evaluator(config: &DraftsmithConfig) -> Arc<dyn QualityEvaluator> {
    if config.evaluator.use_llm {
        Arc::new(LlmEvaluator::new(Arc::new(SimulatedModel)))
    } else {
        Arc::new(PatternEvaluator::new())
    }
}
