#![deny(unused)]
//! Core types, traits, and error definitions for the LLMOps governance gateway.
//!
//! This crate provides the building blocks shared by the governance,
//! model gateway and HTTP layers.

pub mod config;
pub mod error;
pub mod mocks;
pub mod traits;
pub mod types;

pub use error::{Disposition, Error, Result};
pub use traits::*;
pub use types::*;
