mod database;

pub use database::{Database, StoreStats};
