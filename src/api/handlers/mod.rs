//! API request handlers

pub mod auth;
pub mod block_check;
pub mod health;
pub mod rank;
pub mod scheduler;
