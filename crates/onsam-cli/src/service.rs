use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use onsam_api::build_app;
use onsam_client::ControllerClient;
use onsam_config::AmConfig;
use onsam_manager::RoadmManager;
use onsam_reconciler::AuditFsm;
use onsam_store::RoadmStore;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Start the aggregate manager: connect the store, spawn the two recurring
/// tickers, and serve the API until the process is stopped.
pub async fn run(cfg: AmConfig) -> Result<()> {
    let store = RoadmStore::connect(&cfg.db_dir).await?;
    let client = Arc::new(ControllerClient::new(
        cfg.controller_base_url(),
        &cfg.user,
        &cfg.password,
        Duration::from_secs(cfg.request_timeout.max(1)),
    )?);
    let manager = Arc::new(RoadmManager::new(
        store.clone(),
        client.clone(),
        cfg.reservation_timeout,
    ));

    // The FSM buffers are only ever touched from this ticker task.
    let fsm = Arc::new(Mutex::new(AuditFsm::new(store.clone(), client.clone(), cfg.update_step)));
    {
        let fsm = fsm.clone();
        let period = Duration::from_secs(cfg.update_timeout.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                fsm.lock().await.action().await;
            }
        });
    }

    {
        let manager = manager.clone();
        let period = Duration::from_secs(cfg.check_expire_timeout.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                match manager.check_resources_expiration().await {
                    Ok(reaped) if !reaped.is_empty() => {
                        for resource in &reaped {
                            if let Some(error) = &resource.error {
                                warn!(urn = %resource.urn, %error, "expired sliver left upstream state behind");
                            }
                        }
                        info!(slivers = reaped.len(), "expired reservations reaped");
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "expiration sweep failed"),
                }
            }
        });
    }

    let app = build_app(manager, Arc::new(cfg.api_token.clone()), cfg.check_credentials);
    let addr = format!("{}:{}", cfg.api_address, cfg.api_port);
    info!(%addr, controller = %cfg.controller_base_url(), "aggregate manager listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
