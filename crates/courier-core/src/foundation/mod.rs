//! Foundation layer: messages, capabilities, call context and replies.

pub mod capability;
pub mod context;
pub mod message;
pub mod reply;
