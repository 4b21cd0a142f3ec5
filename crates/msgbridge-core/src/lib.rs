//! Bridge engine: orchestrates one client request from translation through
//! the upstream call to the client-facing response, in either framing.
//!
//! Account selection, usage persistence, and session hashing are external
//! capabilities behind the traits in [`scheduler`], [`sink`] and
//! [`session`]; the engine only talks to those interfaces.

pub mod engine;
pub mod error;
pub mod frames;
pub mod identity;
pub mod scheduler;
pub mod session;
pub mod sink;
pub mod upstream;

pub use engine::{BridgeEngine, EngineConfig, EngineResponse, InboundRequest};
pub use error::{BridgeError, RouteError};
pub use scheduler::{
    AccountLease, AccountScheduler, AccountType, ApiKeyMeta, SchedulerError, UsageWindowSnapshot,
};
pub use session::{SessionHasher, Sha256SessionHasher};
pub use sink::{MetricsSink, RateLimitHint, UsageTally};
