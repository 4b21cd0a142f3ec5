//! Wire types for both sides of the bridge.
//!
//! `messages` models the client-facing dialect (`system` + `messages` +
//! `content_block_*` streaming events); `responses` models the upstream
//! dialect (`instructions` + `input` + `response.*` streaming events).
//! Everything here is plain serde data; no I/O, no conversion logic.

pub mod messages;
pub mod responses;
pub mod sse;
