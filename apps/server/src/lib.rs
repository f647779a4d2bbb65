//! HTTP/WebSocket surface over `PlatformCore`: route handlers and the
//! state/error/identity plumbing they share. The composition root that wires
//! `PlatformCore` and `ResourceReconciler` to the same collaborators lives in
//! `main.rs`, not here, so this crate stays testable without a live process.

pub mod error;
pub mod identity;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::api_routes;
pub use state::AppState;
