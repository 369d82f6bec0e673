//! Relay Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - Processes or sockets
//! - Async runtimes
//! - Configuration files
//!
//! All types here describe providers, tasks, worker state and the request /
//! response payloads exchanged with the tool-invocation layer.

pub mod api;
pub mod error;
pub mod event;
pub mod ids;
pub mod model;
pub mod output;
pub mod status;
pub mod task;

// Re-export commonly used types
pub use api::{
    Alternative, CancelRequest, CancelResponse, PromptRequest, PromptResponse, RouteRequest,
    RoutingDecision, SpawnRequest, WorkerOutputRequest, WorkerOutputResponse, WorkerStatusReport,
};
pub use error::CoreError;
pub use event::{WorkerEvent, WorkerEventType};
pub use ids::{EventId, PromptId, WorkerId};
pub use model::{CommunicationMethod, CostModel, LaunchSpec, ProviderDefinition};
pub use output::{OutputBuffer, OutputView};
pub use status::{CancelStatus, WorkerHealth, WorkerStatus};
pub use task::{Complexity, Priority, Task};
