//! # Domination Test Utilities
//!
//! Shared testing utilities for all crates:
//! - Determinism and replay harness
//! - Scripted, slow and faulty agents
//! - Hand-built fields and settings
//! - Property-based testing strategies

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod determinism;
pub mod fixtures;

/// Re-export proptest for convenience.
pub use proptest;
