use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::ConfigError;
use crate::raw::RawFile;

/// Validated AM configuration.
#[derive(Debug, Clone)]
pub struct AmConfig {
    /// OpenNaaS controller host.
    pub server_address: String,
    pub server_port: u16,
    /// Basic-auth credentials toward the controller.
    pub user: String,
    pub password: String,
    /// Directory holding the sqlite database file.
    pub db_dir: PathBuf,
    /// Default reservation lifetime in minutes.
    pub reservation_timeout: i64,
    /// Seconds between reconciler FSM ticks.
    pub update_timeout: u64,
    /// Maximum items written per FSM update tick.
    pub update_step: usize,
    /// Seconds between expiration sweeps.
    pub check_expire_timeout: u64,
    pub check_credentials: bool,
    /// Per-request HTTP timeout toward the controller, in seconds.
    pub request_timeout: u64,
    pub api_address: String,
    pub api_port: u16,
    pub api_token: String,
}

impl AmConfig {
    /// Base URL of the controller REST surface.
    pub fn controller_base_url(&self) -> String {
        format!("http://{}:{}/opennaas/", self.server_address, self.server_port)
    }
}

/// Load and validate the AM configuration from a YAML file.
///
/// `OPENNAAS_USER`, `OPENNAAS_PASSWORD` and `ONSAM_API_TOKEN` environment
/// variables override the corresponding file values so secrets can stay out
/// of the file.
pub fn load_config(path: &Path) -> Result<AmConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    let raw: RawFile = serde_yaml::from_str(&content).map_err(|e| ConfigError::YamlParse {
        path: path.display().to_string(),
        source: e,
    })?;
    let raw = raw.opennaas;

    let user = std::env::var("OPENNAAS_USER").unwrap_or(raw.user);
    let password = std::env::var("OPENNAAS_PASSWORD").unwrap_or(raw.password);
    let api_token = std::env::var("ONSAM_API_TOKEN").unwrap_or(raw.api_token);

    if raw.server_address.is_empty() {
        return Err(ConfigError::Invalid("opennaas.server_address is empty".into()));
    }
    if raw.server_port == 0 {
        return Err(ConfigError::Invalid("opennaas.server_port must be non-zero".into()));
    }
    if raw.update_step == 0 {
        return Err(ConfigError::Invalid("opennaas.update_step must be at least 1".into()));
    }
    if raw.reservation_timeout <= 0 {
        return Err(ConfigError::Invalid(
            "opennaas.reservation_timeout must be a positive number of minutes".into(),
        ));
    }
    if raw.check_credentials && api_token.is_empty() {
        return Err(ConfigError::Invalid(
            "opennaas.check_credentials is set but no api_token is configured".into(),
        ));
    }

    let config = AmConfig {
        server_address: raw.server_address,
        server_port: raw.server_port,
        user,
        password,
        db_dir: PathBuf::from(raw.db_dir),
        reservation_timeout: raw.reservation_timeout,
        update_timeout: raw.update_timeout,
        update_step: raw.update_step,
        check_expire_timeout: raw.check_expire_timeout,
        check_credentials: raw.check_credentials,
        request_timeout: raw.request_timeout,
        api_address: raw.api_address,
        api_port: raw.api_port,
        api_token,
    };
    debug!(
        controller = %config.controller_base_url(),
        db_dir = %config.db_dir.display(),
        "loaded AM configuration"
    );
    Ok(config)
}
