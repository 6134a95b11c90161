//! URL handling module for Trawler
//!
//! This module provides URL normalization, domain extraction and the
//! same-origin check used to keep a crawl on its seed's domain.

mod domain;
mod normalize;

// Re-export main functions
pub use domain::{extract_domain, same_origin};
pub use normalize::normalize_url;
