//! Sitewatch - ISP block detection and search rank monitoring
//!
//! Keeps an eye on a fleet of websites from the point of view of several
//! Vietnamese ISPs.
//!
//! ## Features
//!
//! - Reachability probes over HTTP and HTTPS through one proxy per ISP
//! - Block classification (`OK`, `BLOCK_HTTP`, `BLOCK_HTTPS`, `BLOCK_DNS`, `BLOCK_UNKNOWN`, `ERROR`)
//! - Google rank lookup for a site's tracked keyword through SerpAPI
//! - Periodic block sweeps and a daily rank sweep
//! - Admin REST API with JWT authentication
//! - PostgreSQL storage for sites, proxies and check history

pub mod api;
pub mod checker;
pub mod config;
pub mod database;
pub mod error;
pub mod models;
pub mod pacer;
pub mod rank;
pub mod repository;
pub mod services;

#[cfg(test)]
mod test_support;

pub use config::Config;
pub use database::Database;
pub use error::{Result, WatchError};
