//! Inbound HTTP surface: one Messages-dialect route in front of the engine.

mod routes;

pub use routes::{bridge_router, RouterState};
