//! Procedural macros used by `handtrack`.
//!
//! Do not use this crate directly, use `handtrack` instead.

use proc_macro::{Span, TokenStream};
use quote::quote;
use syn::{parse::Error, ItemFn};

/// Turns `fn main` into the entry point of a `handtrack` application.
///
/// The annotated function runs on a background thread, while the main thread is handed to the
/// window system.
#[proc_macro_attribute]
pub fn main(args: TokenStream, item: TokenStream) -> TokenStream {
    match expand_main(args, item.clone()) {
        Ok(tokens) => tokens,
        Err(err) => {
            // Keep the original item around so that IDEs still see the function.
            let mut error = item;
            error.extend(TokenStream::from(err.to_compile_error()));
            error
        }
    }
}

fn expand_main(args: TokenStream, item: TokenStream) -> syn::Result<TokenStream> {
    if !args.is_empty() {
        return Err(Error::new(
            Span::call_site().into(),
            "`#[handtrack::main]` does not accept arguments",
        ));
    }

    let item = syn::parse::<ItemFn>(item)?;

    if item.sig.ident != "main" {
        return Err(Error::new(
            item.sig.ident.span(),
            "`#[handtrack::main]` must be applied to a function called `main`",
        ));
    }
    if item.sig.asyncness.is_some() {
        return Err(Error::new(
            item.sig.ident.span(),
            "`#[handtrack::main]` cannot be applied to an `async fn`",
        ));
    }

    Ok(quote! {
        fn main() {
            #item

            ::handtrack::init_logger!();

            ::handtrack::run(main);
        }
    }
    .into())
}
