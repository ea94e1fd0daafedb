//! Cache module for storing raw API responses on disk
//!
//! Every page fetched from Open Context is written once as a JSON file keyed by
//! a fingerprint of its request URL. Later runs read pages back instead of
//! hitting the network. There is no expiry: files are only removed through an
//! explicit prefix clear.

mod manager;

pub use manager::{slugify, CacheError, CacheManager};
