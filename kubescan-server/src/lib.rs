//! HTTP and WebSocket front end for the kubescan engine, plus the Kubernetes
//! adapter and trigger loops that drive scheduling.

pub mod handlers;
pub mod infra;
pub mod routes;

pub use infra::app_state::AppState;
pub use routes::create_router;
