//! Core type definitions for the governance gateway.
//!
//! Broken down into submodules for better maintainability.

pub mod request;
pub mod verdict;

pub use request::*;
pub use verdict::*;
