use actix_web::{web, App, HttpServer};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use order_service::config::{AppConfig, ChannelBackend, StoreBackend};
use order_service::handlers;
use order_service::messaging::{EventChannel, EventPublisher, InMemoryChannel, RedpandaChannel};
use order_service::metrics::Metrics;
use order_service::pricing::FixedPrice;
use order_service::relay::OutboxRelay;
use order_service::service::OrderService;
use order_service::state::AppState;
use order_service::store::{run_migrations, InMemoryOrderStore, OrderStore, OutboxStore, PgOrderStore};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG overrides the default filter
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,order_service=debug")),
        )
        .init();

    tracing::info!("🚀 Starting order service");

    let config = AppConfig::from_env()?;

    // === 1. Metrics ===
    let metrics = Arc::new(Metrics::new()?);
    tracing::info!(
        "📊 Metrics registry created with {} metrics",
        metrics.registry().gather().len()
    );

    // === 2. Order store ===
    let mut pool = None;
    let (store, outbox): (Arc<dyn OrderStore>, Arc<dyn OutboxStore>) = match config.store {
        StoreBackend::Postgres => {
            let db = config
                .database
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("database settings missing"))?;
            tracing::info!(host = %db.host, port = db.port, database = %db.name, "Connecting to Postgres...");

            let pg = PgPoolOptions::new()
                .max_connections(db.max_connections)
                .connect(&db.url())
                .await?;
            run_migrations(&pg).await?;
            tracing::info!("✅ Database schema ready");

            let store = Arc::new(PgOrderStore::new(pg.clone()));
            pool = Some(pg);
            (store.clone() as Arc<dyn OrderStore>, store as Arc<dyn OutboxStore>)
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory order store; data is lost on exit");
            let store = Arc::new(InMemoryOrderStore::new());
            (store.clone() as Arc<dyn OrderStore>, store as Arc<dyn OutboxStore>)
        }
    };

    // === 3. Broker channel ===
    let channel: Arc<dyn EventChannel> = match config.channel {
        ChannelBackend::Redpanda => {
            let brokers = config
                .broker_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("broker url missing"))?;
            tracing::info!(brokers, "Connecting to Redpanda...");
            Arc::new(RedpandaChannel::new(brokers, metrics.clone())?)
        }
        ChannelBackend::Memory => {
            tracing::warn!("Using in-memory event channel; events are not delivered");
            Arc::new(InMemoryChannel::new())
        }
    };
    let publisher = EventPublisher::new(channel.clone());

    // === 4. Outbox relay ===
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let relay = OutboxRelay::new(
        outbox.clone(),
        publisher.clone(),
        config.relay.clone(),
        metrics.clone(),
    );
    let relay_handle = tokio::spawn(relay.run(shutdown_rx));

    // === 5. HTTP server ===
    let state = AppState {
        orders: OrderService::new(
            store.clone(),
            Arc::new(FixedPrice::new(config.unit_price)),
            metrics.clone(),
        ),
        publisher,
        outbox,
        store,
        metrics,
    };

    tracing::info!(port = config.port, "🌐 HTTP server listening");
    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .configure(handlers::configure)
    })
    .bind(("0.0.0.0", config.port))?
    .run()
    .await?;

    // === 6. Graceful shutdown ===
    tracing::info!("🛑 Shutting down");
    let _ = shutdown_tx.send(true);
    if let Err(e) = relay_handle.await {
        tracing::error!(error = %e, "Outbox relay task failed");
    }
    channel.close().await;
    if let Some(pool) = pool {
        pool.close().await;
        tracing::info!("Database pool closed");
    }

    tracing::info!("👋 Shutdown complete");
    Ok(())
}
