//! Read-through page cache for point lookups.
//!
//! A single page, sized to the largest batch, is kept in memory. Lookups that
//! fall inside it are served under a shared lock; anything else reloads the
//! page starting exactly at the requested offset.

mod reader;

pub use reader::{CacheStats, CachedReader};
