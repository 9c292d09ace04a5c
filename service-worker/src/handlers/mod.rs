//! Handlers Layer
//!
//! Lifecycle and fetch event handlers on top of cache storage and network.

mod fetch;
mod install;

pub use fetch::{classify, FetchContext, FetchOutcome, Route};
pub use install::{precache, purge_stale};
