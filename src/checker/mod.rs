//! ISP block detection
//!
//! A site is probed over HTTP and HTTPS through each ISP proxy. The pair of
//! outcomes is classified into a block status, and the per-proxy statuses
//! are folded into the site's aggregate status.

pub mod classifier;
pub mod orchestrator;
pub mod probe;

pub use classifier::classify;
pub use orchestrator::BlockOrchestrator;
pub use probe::{FailureKind, HttpProber, Prober, Protocol, ProtocolOutcome};
