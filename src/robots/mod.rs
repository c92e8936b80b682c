//! Robots.txt handling module
//!
//! This module provides functionality for fetching, parsing, and caching
//! robots.txt files. Lookups fail open: an unreachable robots.txt never blocks
//! crawling.

mod cache;
mod parser;

pub use cache::{CachedRobots, RobotsCache, RobotsCacheOptions};
pub use parser::{RobotsRuleSet, Rule, WILDCARD_AGENT};
