//! Shared test utilities for grantflow integration tests.
//!
//! `TestHarness` wires every service against one in-memory database and a
//! temp artifact directory, and knows how to drive a proposal to any stage.

pub mod harness;

pub use harness::TestHarness;
