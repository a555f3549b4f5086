//! Shared test utilities for ocrflow integration tests.
//!
//! This module provides:
//! - `TestHarness` for isolated script-backed runs in temp directories
//! - Ready-made task adapters with controllable timing and outcomes

pub mod adapters;
pub mod harness;

pub use adapters::*;
pub use harness::{wait_for_terminal, wait_until, TestHarness};
