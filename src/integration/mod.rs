//! Integration tests
//!
//! Shared fixtures plus end-to-end tests that run whole conversion jobs.

pub mod fixtures;
