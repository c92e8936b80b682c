//! URL handling module
//!
//! This module provides host extraction for per-site bookkeeping and the
//! resolution of templated source URLs.

mod domain;
mod template;

// Re-export main functions
pub use domain::{extract_domain, host_key};
pub use template::{resolve_template, PageParam, DATE_PLACEHOLDER, PAGE_PLACEHOLDER};
