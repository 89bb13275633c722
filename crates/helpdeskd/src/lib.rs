//! Help desk daemon library - HTTP API, storage, sessions and presence.

pub mod error;
pub mod presence;
pub mod routes;
pub mod server;
pub mod session;
pub mod store;

pub use error::ApiError;
pub use server::{build_router, ensure_bootstrap_admin, AppState};
pub use store::Store;
