pub mod migrations;
pub mod pool;

pub use pool::{Database, DatabaseHealth};
