pub mod error;
pub mod store;

pub use error::CacheError;
pub use store::{CacheEntry, CacheStore, CachedAudio};
