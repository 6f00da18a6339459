//! Test utilities for blobbench.
//!
//! This crate provides an in-process stand-in for the target object store,
//! with scripted behavior per test, plus a shared tracing initializer. See
//! the modules for all available utilities.

pub mod server;
pub mod tracing;
