//! Supervisor/worker orchestration: a supervisor routes each turn to one of
//! three specialized workers and assembles the reply.

pub mod error;
pub mod registry;
pub mod supervisor;
pub mod workers;

pub use error::{AgentError, Result};
pub use registry::{Delegation, worker_tools};
pub use supervisor::{RoutingRule, Supervisor, SupervisorResult};
pub use workers::order::OrderWorker;
pub use workers::product::{InventoryCheck, ProductWorker};
pub use workers::search::{SearchResult, SearchWorker};
