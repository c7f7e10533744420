pub mod auth;
pub mod server;
pub mod ws;

pub use auth::{AuthError, TokenVerifier};
pub use server::{build_router, start, AppState, ServerConfig, ServerHandle};
