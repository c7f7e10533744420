pub mod controller;
pub mod error;
pub mod registry;
pub mod session;

pub use controller::TurnController;
pub use error::EngineError;
pub use registry::ConnectionRegistry;
pub use session::{SessionState, SessionStore};
