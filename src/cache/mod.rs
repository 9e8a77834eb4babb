//! Dependency cache: a key/value store persisted across runs

pub mod keys;
pub mod store;

pub use keys::render_key;
pub use store::{CacheError, CacheStore, RestoredEntry};
