//! Integration layer: the handler resolution boundary.

pub mod resolver;
