//! Message derive implementations.
//!
//! | Derive | Attribute | Keys |
//! |--------|-----------|------|
//! | `Request` | `#[request(...)]` | `response = Type` (default `()`), `capabilities(dyn A, ...)` |
//! | `Notification` | `#[notification(...)]` | `capabilities(dyn A, ...)` |
//! | `StreamRequest` | `#[stream_request(...)]` | `item = Type` (required), `capabilities(dyn A, ...)` |
//!
//! Every listed capability becomes a `.with::<dyn A>(|message| message)`
//! entry, so the type must implement each trait it declares.
//!
//! Generated code names the traits through the `courier` facade
//! (`::courier::core`), so the deriving crate must depend on `courier`.

use proc_macro2::{Span, TokenStream};
use quote::quote;
use syn::parse::Parse;
use syn::punctuated::Punctuated;
use syn::{Attribute, Data, DeriveInput, Token, Type, parse_quote};

/// Which message trait is being derived.
#[derive(Clone, Copy)]
pub enum MessageKind {
    Request,
    Notification,
    StreamRequest,
}

impl MessageKind {
    fn attribute(self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Notification => "notification",
            Self::StreamRequest => "stream_request",
        }
    }

    fn derive_name(self) -> &'static str {
        match self {
            Self::Request => "Request",
            Self::Notification => "Notification",
            Self::StreamRequest => "StreamRequest",
        }
    }
}

#[derive(Default)]
struct MessageAttrs {
    response: Option<Type>,
    item: Option<Type>,
    capabilities: Vec<Type>,
}

pub fn derive_message(input: &DeriveInput, kind: MessageKind) -> syn::Result<TokenStream> {
    if let Data::Union(_) = input.data {
        return Err(syn::Error::new_spanned(
            &input.ident,
            format!("{} cannot be derived for unions", kind.derive_name()),
        ));
    }

    let attrs = parse_attrs(&input.attrs, kind)?;
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let core = quote! { ::courier::core };
    let capabilities = &attrs.capabilities;
    let capabilities_fn = quote! {
        fn capabilities() -> #core::Capabilities<Self> {
            #core::Capabilities::new()
                #( .with::<#capabilities>(|message| message) )*
        }
    };

    let body = match kind {
        MessageKind::Request => {
            let response = attrs.response.unwrap_or_else(|| parse_quote!(()));
            quote! {
                impl #impl_generics #core::Request for #name #ty_generics #where_clause {
                    type Response = #response;

                    #capabilities_fn
                }
            }
        }
        MessageKind::Notification => quote! {
            impl #impl_generics #core::Notification for #name #ty_generics #where_clause {
                #capabilities_fn
            }
        },
        MessageKind::StreamRequest => {
            let item = attrs.item.ok_or_else(|| {
                syn::Error::new(
                    Span::call_site(),
                    "#[derive(StreamRequest)] requires `#[stream_request(item = Type)]`",
                )
            })?;
            quote! {
                impl #impl_generics #core::StreamRequest for #name #ty_generics #where_clause {
                    type Item = #item;

                    #capabilities_fn
                }
            }
        }
    };

    Ok(body)
}

fn parse_attrs(attrs: &[Attribute], kind: MessageKind) -> syn::Result<MessageAttrs> {
    let mut parsed = MessageAttrs::default();

    for attr in attrs.iter().filter(|a| a.path().is_ident(kind.attribute())) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("capabilities") {
                let content;
                syn::parenthesized!(content in meta.input);
                let types: Punctuated<Type, Token![,]> =
                    content.parse_terminated(Type::parse, Token![,])?;
                parsed.capabilities.extend(types);
                Ok(())
            } else if meta.path.is_ident("response") && matches!(kind, MessageKind::Request) {
                parsed.response = Some(meta.value()?.parse()?);
                Ok(())
            } else if meta.path.is_ident("item") && matches!(kind, MessageKind::StreamRequest) {
                parsed.item = Some(meta.value()?.parse()?);
                Ok(())
            } else {
                Err(meta.error(format!(
                    "unsupported key in #[{}(...)]",
                    kind.attribute()
                )))
            }
        })?;
    }

    Ok(parsed)
}
