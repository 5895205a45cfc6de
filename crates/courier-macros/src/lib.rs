//! Procedural macros for Courier message types.
//!
//! - `#[derive(Request)]` implements `courier::core::Request`
//! - `#[derive(Notification)]` implements `courier::core::Notification`
//! - `#[derive(StreamRequest)]` implements `courier::core::StreamRequest`
//!
//! Capability lists declare the trait-object views that type-constrained
//! middleware can match against:
//!
//! ```rust,ignore
//! use courier::prelude::*;
//!
//! #[derive(Debug, Request)]
//! #[request(response = u64, capabilities(dyn Validate, dyn Idempotent))]
//! pub struct CreateOrder {
//!     pub quantity: u32,
//! }
//!
//! #[derive(Debug, Clone, Notification)]
//! pub struct OrderShipped {
//!     pub id: u64,
//! }
//!
//! #[derive(Debug, StreamRequest)]
//! #[stream_request(item = Order)]
//! pub struct ListOrders;
//! ```

mod message;

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

use message::MessageKind;

/// Derives `courier::core::Request`.
///
/// # Attributes
///
/// - `#[request(response = Type)]` - response type, `()` when omitted
/// - `#[request(capabilities(dyn Trait, ...))]` - extra capability views
#[proc_macro_derive(Request, attributes(request))]
pub fn derive_request(input: TokenStream) -> TokenStream {
    expand(input, MessageKind::Request)
}

/// Derives `courier::core::Notification`.
///
/// # Attributes
///
/// - `#[notification(capabilities(dyn Trait, ...))]` - extra capability views
#[proc_macro_derive(Notification, attributes(notification))]
pub fn derive_notification(input: TokenStream) -> TokenStream {
    expand(input, MessageKind::Notification)
}

/// Derives `courier::core::StreamRequest`.
///
/// # Attributes
///
/// - `#[stream_request(item = Type)]` - item type, required
/// - `#[stream_request(capabilities(dyn Trait, ...))]` - extra capability views
#[proc_macro_derive(StreamRequest, attributes(stream_request))]
pub fn derive_stream_request(input: TokenStream) -> TokenStream {
    expand(input, MessageKind::StreamRequest)
}

fn expand(input: TokenStream, kind: MessageKind) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match message::derive_message(&input, kind) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}
