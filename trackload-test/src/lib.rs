//! Test utilities for trackload.
//!
//! This crate provides utilities to facilitate testing of the load generator against a tracking
//! service. See the modules for all available utilities.

pub mod server;
pub mod tracing;
