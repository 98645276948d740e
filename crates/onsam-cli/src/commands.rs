use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use onsam_client::ControllerClient;
use onsam_config::{load_config, AmConfig};
use onsam_reconciler::{AuditFsm, FsmState};
use onsam_store::RoadmStore;

fn build_client(cfg: &AmConfig) -> Result<Arc<ControllerClient>> {
    let client = ControllerClient::new(
        cfg.controller_base_url(),
        &cfg.user,
        &cfg.password,
        Duration::from_secs(cfg.request_timeout.max(1)),
    )?;
    Ok(Arc::new(client))
}

pub async fn run(config_path: &Path) -> Result<()> {
    let cfg = load_config(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    crate::service::run(cfg).await
}

/// One-shot full audit cycle: get, drain every buffer, clean.
pub async fn audit(config_path: &Path) -> Result<()> {
    let cfg = load_config(config_path)?;
    let store = RoadmStore::connect(&cfg.db_dir).await?;
    let client = build_client(&cfg)?;
    let mut fsm = AuditFsm::new(store.clone(), client, cfg.update_step);

    let mut ticks = 0usize;
    loop {
        ticks += 1;
        if ticks > 10_000 {
            bail!("audit cycle did not complete within {ticks} ticks");
        }
        let before = fsm.state();
        fsm.action().await;
        if before == FsmState::Clean && fsm.state() == FsmState::Get {
            break;
        }
        if before == FsmState::Get && fsm.state() == FsmState::Get {
            bail!("no inventory available from the controller");
        }
    }

    let mut session = store.session().await?;
    let views = session.get_resources().await?;
    println!("audited {} endpoints in {} ticks", views.len(), ticks);
    Ok(())
}

pub async fn resources(config_path: &Path) -> Result<()> {
    let cfg = load_config(config_path)?;
    let store = RoadmStore::connect(&cfg.db_dir).await?;
    let client = build_client(&cfg)?;
    let manager = onsam_manager::RoadmManager::new(store, client, cfg.reservation_timeout);

    let advertisement = manager.get_resources().await?;
    println!("{}", serde_json::to_string_pretty(&advertisement)?);
    Ok(())
}

pub fn check_config(config_path: &Path) -> Result<()> {
    let cfg = load_config(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    println!("configuration ok");
    println!("  controller     {}", cfg.controller_base_url());
    println!("  database       {}", cfg.db_dir.join("opennaas.db").display());
    println!("  api            {}:{}", cfg.api_address, cfg.api_port);
    println!("  update every   {}s (step {})", cfg.update_timeout, cfg.update_step);
    println!("  expire check   {}s", cfg.check_expire_timeout);
    println!("  credentials    {}", if cfg.check_credentials { "checked" } else { "open" });
    Ok(())
}
