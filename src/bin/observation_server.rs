use std::sync::Arc;

use luxtemp::{
    app_config_from_env, init_logging, log_app_bind, log_app_start, logging_config_from_env,
    observations_router, AppRole, ObservationStore, RecordSource, SharedObservationStore,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging_cfg = logging_config_from_env();
    init_logging(&logging_cfg)?;

    let app_cfg = app_config_from_env();
    log_app_start(AppRole::Server, &logging_cfg, &app_cfg);

    let store = ObservationStore::open(&app_cfg.store_path)?;
    let source: Arc<dyn RecordSource> = Arc::new(SharedObservationStore::new(store));

    let app = observations_router(source);
    let listener = tokio::net::TcpListener::bind(app_cfg.server_addr).await?;
    let bound_addr = listener.local_addr()?;

    log_app_bind(bound_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
