use std::sync::Arc;

use onsam_manager::RoadmManager;

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<RoadmManager>,
    pub auth_token: Arc<String>,
    pub check_credentials: bool,
}
