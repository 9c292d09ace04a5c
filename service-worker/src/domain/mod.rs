//! Domain Layer
//!
//! Requests, responses, lifecycle states and errors of the offline agent.
//! This layer only depends on serde, the URL type and, in the browser, the
//! native response type.

mod error;
mod lifecycle;
mod request;
mod response;

pub use error::{AgentError, AgentResult};
pub use lifecycle::WorkerState;
pub use request::{is_same_origin, AgentRequest, Destination, RequestMode};
pub use response::{AgentResponse, NativeResponse, OFFLINE_PLACEHOLDER_HTML};
