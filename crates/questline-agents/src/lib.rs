pub mod bounded;
pub mod http;
pub mod traits;

pub mod mock;

pub use bounded::Bounded;
pub use http::HttpAgents;
pub use traits::{Chronicler, Completion, ContentGenerator, GeneratedStep, Scorer, Transformer};
