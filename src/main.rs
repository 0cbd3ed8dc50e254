// src/main.rs
use actix_web::{middleware, web, App, HttpServer};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use billing_manager::api;
use billing_manager::cache::RedisClient;
use billing_manager::clock::SystemClock;
use billing_manager::config::Config;
use billing_manager::database::create_pool;
use billing_manager::events::{EventHandler, LogPublisher};
use billing_manager::services::{
    AccountService, AllowanceEngine, BillingService, CreditSweeper, FailedEventService,
    LedgerResourceCounter,
};
use billing_manager::store::Store;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .init();

    info!("Starting billing-manager");

    // Load configuration
    let config = Config::from_env().expect("Failed to load configuration");

    info!("Environment: {}", config.environment);

    // Create database pool
    let db_pool = create_pool(&config.database_url)
        .await
        .expect("Failed to create database pool");

    info!("Database pool created");

    // Create Redis client
    let redis_client = RedisClient::new(&config.redis_url)
        .await
        .expect("Failed to create Redis client");

    info!("Redis client connected");

    // Create services
    let store = Store::new(db_pool, redis_client, Arc::new(SystemClock));
    let publisher = Arc::new(LogPublisher);

    let resource_counter = Arc::new(LedgerResourceCounter::new(store.clone()));

    let allowances = Arc::new(AllowanceEngine::new(store.clone()));
    let accounts = Arc::new(AccountService::new(
        store.clone(),
        publisher.clone(),
        resource_counter,
    ));
    let billing = Arc::new(BillingService::new(
        store.clone(),
        allowances.clone(),
        publisher.clone(),
    ));
    let failed_events = Arc::new(FailedEventService::new(store.clone()));
    let credit_sweeper = Arc::new(CreditSweeper::new(store.clone(), allowances.clone()));
    let event_handler = Arc::new(EventHandler::new(billing.clone(), failed_events.clone()));

    // Failed-event retry sweep
    {
        let failed_events = failed_events.clone();
        let event_handler = event_handler.clone();
        let interval_secs = config.retry_sweep_interval_secs;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
            loop {
                ticker.tick().await;
                if let Err(e) = failed_events.retry_pending(event_handler.as_ref()).await {
                    error!("Retry sweep error: {}", e);
                }
            }
        });
        info!("Retry sweep started ({}s interval)", interval_secs);
    }

    // Free-tier credit top-up sweep
    {
        let credit_sweeper = credit_sweeper.clone();
        let interval_secs = config.credit_sweep_interval_secs;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
            loop {
                ticker.tick().await;
                if let Err(e) = credit_sweeper.run_once().await {
                    error!("Credit sweep error: {}", e);
                }
            }
        });
        info!("Credit sweep started ({}s interval)", interval_secs);
    }

    // HTTP Server
    let bind_address = format!("{}:{}", config.host, config.port);
    info!("Starting HTTP server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .wrap(tracing_actix_web::TracingLogger::default())
            .app_data(web::Data::new(accounts.clone()))
            .app_data(web::Data::new(allowances.clone()))
            .app_data(web::Data::new(billing.clone()))
            .app_data(web::Data::new(event_handler.clone()))
            .configure(api::routes::configure)
    })
    .bind(&bind_address)?
    .run()
    .await
}
