use serde::Deserialize;

/// Raw YAML representation of the AM configuration file.
///
/// Every key lives under a top-level `opennaas:` section, mirroring the
/// dotted `opennaas.*` names the service documentation uses.
#[derive(Debug, Deserialize)]
pub struct RawFile {
    pub opennaas: RawOpennaas,
}

#[derive(Debug, Deserialize)]
pub struct RawOpennaas {
    pub server_address: String,
    pub server_port: u16,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    pub db_dir: String,
    /// Default reservation lifetime, in minutes, when a request carries no end time.
    #[serde(default = "default_reservation_timeout")]
    pub reservation_timeout: i64,
    /// Seconds between reconciler FSM ticks.
    #[serde(default = "default_update_timeout")]
    pub update_timeout: u64,
    /// Maximum items written per FSM update tick.
    #[serde(default = "default_update_step")]
    pub update_step: usize,
    /// Seconds between expiration sweeps.
    #[serde(default = "default_check_expire_timeout")]
    pub check_expire_timeout: u64,
    #[serde(default)]
    pub check_credentials: bool,
    /// Bound on every HTTP request toward the controller, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    #[serde(default = "default_api_address")]
    pub api_address: String,
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    /// Bearer credential checked on the API when `check_credentials` is set.
    #[serde(default)]
    pub api_token: String,
}

fn default_reservation_timeout() -> i64 {
    60
}

fn default_update_timeout() -> u64 {
    30
}

fn default_update_step() -> usize {
    100
}

fn default_check_expire_timeout() -> u64 {
    60
}

fn default_request_timeout() -> u64 {
    30
}

fn default_api_address() -> String {
    "127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
    8445
}
