//! Shared service plumbing for Parley services.

pub mod health;
pub mod tracing;
