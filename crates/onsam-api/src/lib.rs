mod app;
mod auth;
mod error;
mod handlers;
mod state;

pub use app::build_app;
pub use state::AppState;
