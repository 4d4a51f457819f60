//! The chime server: webhook intake, the periodic sweep, and their wiring.

pub mod config;
pub mod db;
pub mod error;
pub mod routes;
pub mod webhook;

use crate::config::ServerConfig;
use crate::db::{PgActorStore, PgEventStore};
use crate::error::ServerError;
use crate::routes::AppState;
use chime_ai::{LlmBackend, LlmInterpreter, LlmOccurrenceResolver, OpenAiBackend};
use chime_core::{Clock, SystemClock};
use chime_inbound::MessageProcessor;
use chime_notify::{CloudApiNotifier, GatedNotifier, Notifier};
use chime_scheduler::SchedulerSweep;
use chime_store::{ActorStore, EventStore};
use rootcause::Report;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Connects to the database, wires the engine and serves until the
/// listener stops.
///
/// # Errors
///
/// Returns an error if any startup step fails or the listener stops with
/// an error.
pub async fn serve(config: ServerConfig) -> Result<(), Report<ServerError>> {
    config
        .engine
        .validate()
        .map_err(|e| ServerError::Config {
            reason: e.to_string(),
        })?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .map_err(|e| ServerError::Database {
            reason: e.to_string(),
        })?;

    info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| ServerError::Migration {
            reason: e.to_string(),
        })?;

    let events: Arc<dyn EventStore> = Arc::new(PgEventStore::new(pool.clone()));
    let actors: Arc<dyn ActorStore> = Arc::new(PgActorStore::new(pool));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let verify_token = config.cloud_api.verify_token.clone();
    let cloud_api = CloudApiNotifier::new(config.cloud_api).map_err(|e| ServerError::Client {
        service: "Cloud API",
        reason: e.to_string(),
    })?;
    let notifier: Arc<dyn Notifier> = Arc::new(GatedNotifier::new(
        Arc::new(cloud_api),
        config.engine.messaging_enabled,
    ));
    if !config.engine.messaging_enabled {
        info!("outbound messaging disabled");
    }

    let backend: Arc<dyn LlmBackend> =
        Arc::new(OpenAiBackend::new(config.llm).map_err(|e| ServerError::Client {
            service: "chat model",
            reason: e.to_string(),
        })?);

    let sweep = Arc::new(
        SchedulerSweep::new(
            events.clone(),
            actors.clone(),
            notifier.clone(),
            clock.clone(),
            config.engine.clone(),
        )
        .with_resolver(Arc::new(LlmOccurrenceResolver::new(backend.clone()))),
    );
    let processor = Arc::new(
        MessageProcessor::new(
            events,
            actors,
            notifier,
            Arc::new(LlmInterpreter::new(backend)),
            clock,
            config.engine.clone(),
        )
        .with_support_contact(config.support_contact),
    );

    let interval = config.engine.sweep_interval();
    let ticker = sweep.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(interval);
        loop {
            interval.tick().await;
            match ticker.run_once().await {
                Ok(report) => debug!(
                    sweep_id = %report.sweep_id,
                    delivered = report.delivered,
                    "periodic sweep"
                ),
                Err(e) => error!(error = %e, "periodic sweep failed"),
            }
        }
    });

    let app = routes::router(Arc::new(AppState {
        processor,
        sweep,
        verify_token,
    }));

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .map_err(|e| ServerError::Bind {
            addr: config.listen_addr.clone(),
            reason: e.to_string(),
        })?;
    info!("listening on http://{}", config.listen_addr);

    axum::serve(listener, app.into_make_service())
        .await
        .map_err(|e| ServerError::Serve {
            reason: e.to_string(),
        })?;
    Ok(())
}
