pub mod database;
pub mod error;
pub mod players;
pub mod quests;
pub mod row_helpers;
pub mod schema;

pub use database::Database;
pub use error::StoreError;
