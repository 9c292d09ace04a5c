//! EDF Offline Agent
//!
//! Layered architecture:
//! - domain: Requests, responses, lifecycle states and errors
//! - repository: Cache storage abstractions and implementations
//! - handlers: Install, activate and fetch strategies
//!
//! `OfflineAgent` is one installed version; `Registration` tracks which
//! version is active for a scope. `browser` runs an agent inside a real
//! service worker.

pub mod agent;
pub mod config;
pub mod domain;
pub mod handlers;
pub mod network;
pub mod registration;
pub mod repository;

#[cfg(target_arch = "wasm32")]
mod browser;

#[cfg(test)]
mod tests;

pub use agent::OfflineAgent;
pub use config::{AgentConfig, AssetMatch};
pub use domain::{AgentError, AgentRequest, AgentResponse, AgentResult, Destination, RequestMode, WorkerState};
pub use handlers::{FetchOutcome, Route};
pub use network::{Fetcher, ReqwestFetcher};
pub use registration::{ControlMessage, Registration};
pub use repository::{CacheStorage, MatchOptions, MemoryCacheStorage};
