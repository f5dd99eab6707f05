//! Test utilities for unit and HTTP-level testing.
//!
//! This module provides:
//! - Test data factories for creating valid test fixtures
//! - In-memory repository implementations for mocking persistence
//! - A fake payment gateway and a recording notifier
//! - `TestContext`, which wires every use case over those mocks

mod billing_mocks;
mod context;
mod factories;
mod gateway_mocks;

pub use billing_mocks::*;
pub use context::*;
pub use factories::*;
pub use gateway_mocks::*;
