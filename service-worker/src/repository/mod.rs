//! Repository Layer
//!
//! Cache storage abstractions and implementations.

mod memory;
mod traits;


pub use memory::MemoryCacheStorage;
pub use traits::{cache_key, CacheStorage, MatchOptions};
