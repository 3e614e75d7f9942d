//! HTTP surface over the turn engine.
//!
//! `triage_router()` returns a composable `Router`; `server::serve` binds
//! it and runs until shutdown.

pub mod endpoints;
pub mod error;
pub mod router;
pub mod server;
pub mod types;

pub use router::triage_router;
pub use server::{serve, ServerError};
pub use types::ApiContext;
