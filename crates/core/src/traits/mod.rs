//! Core traits for the governance gateway.
//!
//! Traits are organized by concern:
//! - `backend`: generation backend and token counting
//! - `clock`: injectable time source
//! - `state_store`: per-identity governance state

pub mod backend;
pub mod clock;
pub mod state_store;

pub use backend::*;
pub use clock::*;
pub use state_store::*;
