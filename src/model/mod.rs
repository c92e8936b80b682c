//! Data exchanged between the coordinator and its worker pools
//!
//! Jobs flow into the pools, results flow out. Content is shared between a
//! fetch result and the parse job derived from it, so it lives behind an `Arc`.

mod content;
mod job;
mod stats;

pub use content::{Content, Item};
pub use job::{FetchJob, FetchResult, ParseJob, ParseResult};
pub use stats::Stats;
