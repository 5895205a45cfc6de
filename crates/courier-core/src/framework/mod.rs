//! Framework contracts: handler traits and middleware chain primitives.

pub mod handler;
pub mod middleware;
