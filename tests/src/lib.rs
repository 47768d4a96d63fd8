//! Shared fixtures, mocks, and setup for the integration tests.

pub mod mocks;
pub mod setup;
