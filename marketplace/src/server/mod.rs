//! HTTP server setup: shared state and routing.

pub mod routes;
pub mod state;

pub use routes::build_router;
pub use state::AppState;
