use std::{net::SocketAddr, sync::Arc};

use http::HeaderValue;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use siteflow_api as api;
use api::{
    auth::{InMemoryPrincipalDirectory, InMemoryProjectDirectory, RbacAccessResolver},
    notifications::LogNotificationService,
    services::{
        procurement::{ProcurementDeps, ProcurementService},
        vendors::StoreVendorDirectory,
    },
    store::{InMemoryProcurementStore, ProcurementStore, SeaOrmProcurementStore},
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = api::config::load_config()?;
    api::config::init_tracing(&cfg.log_level, cfg.log_json);
    api::metrics::register_metrics();

    // Audit logger shared by every service component
    let base_logger = api::logging::setup_logger(api::logging::LoggerConfig::default());

    // Persistence backend
    let mut db = None;
    let store: Arc<dyn ProcurementStore> = if cfg.uses_in_memory_store() {
        warn!("using the in-memory store; data is lost on restart");
        Arc::new(InMemoryProcurementStore::new())
    } else {
        let pool = api::db::establish_connection_from_app_config(&cfg).await?;
        if cfg.auto_migrate {
            api::db::run_migrations(&pool).await.map_err(|e| {
                error!("Failed running migrations: {}", e);
                e
            })?;
        }
        let pool = Arc::new(pool);
        db = Some(pool.clone());
        Arc::new(SeaOrmProcurementStore::new(pool))
    };

    // Init events
    let (event_sender, event_rx) = api::events::channel(cfg.event_channel_capacity);
    tokio::spawn(api::events::process_events(event_rx));

    // Known principals and project memberships
    let projects = Arc::new(InMemoryProjectDirectory::default());
    let principals = Arc::new(InMemoryPrincipalDirectory::default());
    for entry in &cfg.directory {
        principals.register(entry.id, entry.role);
        for project_id in &entry.projects {
            projects.assign(entry.id, *project_id);
        }
    }
    info!(principals = cfg.directory.len(), "directory loaded");

    let procurement = ProcurementService::new(ProcurementDeps {
        store: store.clone(),
        access: Arc::new(RbacAccessResolver::new(projects)),
        vendors: Arc::new(StoreVendorDirectory::new(store)),
        principals,
        notifier: Arc::new(LogNotificationService::new(base_logger.clone())),
        events: event_sender,
        retry: cfg.retry_config(),
        logger: base_logger,
    });

    let mut app_state = api::AppState::new(cfg.clone(), procurement);
    if let Some(pool) = db {
        app_state = app_state.with_db(pool);
    }

    // Build CORS layer from config
    let origins: Vec<HeaderValue> = cfg
        .cors_origins()
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();
    let cors_layer = if !origins.is_empty() {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    } else if cfg.is_production() {
        error!("Missing CORS configuration; set APP__CORS_ALLOWED_ORIGINS");
        return Err("Missing CORS configuration: set APP__CORS_ALLOWED_ORIGINS".into());
    } else {
        info!("Using permissive CORS because explicit origins were not configured");
        CorsLayer::permissive()
    };

    let app = api::build_router(app_state).layer(cors_layer);

    // Bind and serve
    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port).parse()?;
    info!("siteflow-api listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
