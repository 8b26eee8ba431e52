//! Wires the watcher, validator, rollback manager, instance tracker and
//! orchestrator together into a running process: one [`FilesystemWatcher`]
//! per configured watch path, feeding every settled artifact change into
//! a shared [`HotSwapOrchestrator`] until the process receives a
//! shutdown signal.

mod config;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use clap::Parser;
use hotswap_core::config::HotswapConfig;
use hotswap_core::model::artifact::WatchEvent;
use hotswap_core::model::event::{AggregateEvent, AggregateKind, EventEnvelope};
use hotswap_core::model::hotswap::RedefinitionOutcome;
use hotswap_core::{identity, VERSION as CORE_VERSION};
use hotswap_engine::errors::ErrorClassifier;
use hotswap_engine::eventlog::EventLog;
use hotswap_engine::redefine::{RedefinitionError, RedefinitionPrimitive, SimulatedRedefinitionPrimitive};
use hotswap_engine::rollback::RollbackManager;
use hotswap_engine::track::InstanceTracker;
use hotswap_engine::update::adapters::FrameworkAdapterRegistry;
use hotswap_engine::validate::ClassRegistry;
use hotswap_engine::watch::{ClassifierPolicy, FilesystemWatcher};
use hotswap_engine::HotSwapOrchestrator;
use tokio::task::JoinSet;
use uuid::Uuid;

use config::Cli;

/// Wraps a [`RedefinitionPrimitive`] and remembers whatever bytecode it
/// last reported swapping in successfully, doubling as the
/// [`ClassRegistry`] the orchestrator consults when a change arrives
/// with no previous bytecode attached. A real JVM-attach backend would
/// plug in as `inner` here without anything else in this file changing;
/// in the absence of one, `inner` is a placeholder that always succeeds.
struct TrackingRedefinitionPrimitive {
    inner: Arc<dyn RedefinitionPrimitive>,
    known: RwLock<HashMap<String, Vec<u8>>>,
}

impl TrackingRedefinitionPrimitive {
    fn new(inner: Arc<dyn RedefinitionPrimitive>) -> Self {
        Self {
            inner,
            known: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl RedefinitionPrimitive for TrackingRedefinitionPrimitive {
    async fn redefine(
        &self,
        type_key: &str,
        new_bytecode: &[u8],
    ) -> Result<RedefinitionOutcome, RedefinitionError> {
        let outcome = self.inner.redefine(type_key, new_bytecode).await?;
        if matches!(outcome, RedefinitionOutcome::Succeeded { .. }) {
            self.known
                .write()
                .expect("registry lock poisoned")
                .insert(type_key.to_string(), new_bytecode.to_vec());
        }
        Ok(outcome)
    }
}

impl ClassRegistry for TrackingRedefinitionPrimitive {
    fn currently_loaded(&self, type_key: &str) -> Option<Vec<u8>> {
        self.known.read().expect("registry lock poisoned").get(type_key).cloned()
    }
}

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.json_logs);

    let config = HotswapConfig::load(cli.config_path().as_deref())?;
    tracing::info!(version = CORE_VERSION, watch_paths = ?config.watch_paths, "starting hot-swap engine");

    let event_log = Arc::new(EventLog::new(&config.event_log_root));
    let tracker = Arc::new(InstanceTracker::new());
    let rollback = Arc::new(RollbackManager::new(config.rollback_snapshot_retention_per_class));
    let adapters = Arc::new(FrameworkAdapterRegistry::new());
    let classifier = Arc::new(ErrorClassifier::default());

    let backend = TrackingRedefinitionPrimitive::new(Arc::new(SimulatedRedefinitionPrimitive::new(0)));
    let backend = Arc::new(backend);
    let redefiner: Arc<dyn RedefinitionPrimitive> = backend.clone();
    let class_registry: Arc<dyn ClassRegistry> = backend;

    let runtime_id = Uuid::new_v4();
    let watch_path_strings: Vec<String> = config.watch_paths.iter().map(|p| p.display().to_string()).collect();
    event_log
        .append(&EventEnvelope::first(
            AggregateKind::Runtime,
            runtime_id,
            AggregateEvent::RuntimeStarted {
                watch_paths: watch_path_strings,
            },
        ))
        .await?;

    let orchestrator = Arc::new(HotSwapOrchestrator::new(
        event_log.clone(),
        class_registry,
        rollback,
        tracker,
        adapters,
        redefiner,
        classifier,
        runtime_id,
        config.instance_update_strict_mode,
        config.validation_session_verbosity,
    ));

    tracing::info!("replaying event log for crash recovery");
    orchestrator.recover_interrupted_requests().await;

    let mut watchers = Vec::with_capacity(config.watch_paths.len());
    let mut tasks = JoinSet::new();

    for path in &config.watch_paths {
        let mut watcher = FilesystemWatcher::new(
            vec![path.clone()],
            config.poll_interval,
            config.settling_attempts,
            config.settling_delay,
            ClassifierPolicy::default(),
        );
        let mut rx = watcher.start().await?;
        watchers.push(watcher);

        let orchestrator = orchestrator.clone();
        let identity_override = config.user_identity_override.clone();
        tasks.spawn(async move {
            while let Some(event) = rx.recv().await {
                match event {
                    WatchEvent::Artifact(artifact_event) => {
                        let identity = identity::resolve(identity_override.as_deref());
                        let outcome = orchestrator.handle_artifact_change(artifact_event, identity).await;
                        tracing::info!(
                            type_key = %outcome.type_key,
                            final_state = ?outcome.final_state,
                            detail = %outcome.detail,
                            "hot-swap change settled"
                        );
                    }
                    WatchEvent::OverflowDetected { .. } => {
                        orchestrator.handle_watcher_overflow().await;
                    }
                }
            }
        });
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received, draining watchers");

    for mut watcher in watchers {
        if let Err(e) = watcher.stop().await {
            tracing::warn!(error = %e, "failed to stop filesystem watcher cleanly");
        }
    }
    tasks.shutdown().await;

    let last = event_log
        .events_of(AggregateKind::Runtime, runtime_id)
        .await?
        .into_iter()
        .last();
    let stop_event = match last {
        Some(prior) => prior.next(AggregateEvent::RuntimeStopped),
        None => EventEnvelope::first(AggregateKind::Runtime, runtime_id, AggregateEvent::RuntimeStopped),
    };
    event_log.append(&stop_event).await?;

    Ok(())
}
