//! Open Context fetch library
//!
//! Fetches paged search results from the Open Context API through an on-disk
//! response cache, flattens the records into tables and matches local files to
//! catalog identifiers.

pub mod api;
pub mod cache;
pub mod cli;
pub mod export;
pub mod flatten;
pub mod matching;
pub mod record;
