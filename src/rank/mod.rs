//! Search rank resolution

pub mod client;
pub mod matcher;
pub mod resolver;

pub use client::{SearchClient, SearchPage, SearchQuery, SerpApiClient};
pub use matcher::{find_position, normalize, OrganicResult};
pub use resolver::{RankResolver, RANK_WINDOWS};
