use std::sync::Arc;

use anyhow::{Error, Result};
use notification_dispatch::{
    api::{self, AppState},
    clients::{
        MessageBroker, NotificationStore, database::DatabaseClient, health::HealthChecker,
        rbmq::RabbitMqClient,
    },
    config::Config,
    consumer::{DeliveryPolicy, spawn_channel_consumers},
    dispatch::DispatchService,
    providers,
};
use tokio::{net::TcpListener, signal, sync::watch};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let _ = rustls::crypto::ring::default_provider().install_default();

    let config = Config::load()?;

    // A broker we cannot reach is fatal: nothing is consumed on a broken connection.
    let broker: Arc<dyn MessageBroker> = Arc::new(RabbitMqClient::connect(&config).await?);
    let store: Arc<dyn NotificationStore> =
        Arc::new(DatabaseClient::connect(&config.database_url).await?);

    let providers = providers::initialize_all(&config).await;
    let dispatcher = Arc::new(DispatchService::new(store.clone(), broker.clone()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut consumers = spawn_channel_consumers(
        broker.clone(),
        &providers,
        DeliveryPolicy::from_config(&config),
        shutdown_rx.clone(),
    );

    let supervisor = tokio::spawn(async move {
        while let Some(joined) = consumers.join_next().await {
            match joined {
                Ok((channel, Ok(()))) => info!(channel = %channel, "Channel consumer exited"),
                Ok((channel, Err(e))) => {
                    error!(channel = %channel, error = %e, "Channel consumer failed")
                }
                Err(e) => error!(error = %e, "Channel consumer task panicked"),
            }
        }
    });

    let state = Arc::new(AppState::new(
        dispatcher,
        HealthChecker::new(store, broker, providers),
    ));
    let listener = TcpListener::bind(("0.0.0.0", config.server_port)).await?;
    let server = tokio::spawn(api::serve(listener, state, shutdown_rx));

    info!("Notification dispatcher is running");

    signal::ctrl_c().await?;
    info!("Shutdown signal received");
    let _ = shutdown_tx.send(true);

    supervisor.await?;
    server.await??;

    Ok(())
}
