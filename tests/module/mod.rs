//! Module system tests
//!
//! Shared fixtures for the lifecycle, host and listener test suites.

pub mod test_utils;
