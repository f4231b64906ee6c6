#![allow(dead_code)]
//! Shared fixtures for integration tests.
//!
//! - `chain`: an in-memory chain serving tipsets, messages and state objects
//! - `engine`: a small deterministic execution engine over a toy state tree

pub mod chain;
pub mod engine;

pub use chain::MockChain;
pub use engine::ToyEngine;
