//! Procedural macros for the Cobalt bot framework.
//!
//! This crate provides:
//!
//! - `#[derive(FromState)]` - Generates a typed view over a matcher's `State`
//!
//! # FromState Derive Macro
//!
//! ```rust,ignore
//! use cobalt::prelude::*;
//!
//! #[derive(FromState)]
//! struct Echo {
//!     #[state(key = "args")]
//!     text: String,
//!     #[state(key = "command")]
//!     command: Option<String>,
//!     #[state(default)]
//!     attempts: u32,
//! }
//!
//! async fn echo(ctx: MatcherContext) -> Response {
//!     match ctx.parse::<Echo>() {
//!         Ok(echo) => { let _ = ctx.send(echo.text).await; Response::Success }
//!         Err(_) => Response::Finish,
//!     }
//! }
//! ```

mod from_state;

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

/// Derives `FromState` for a struct with named fields.
///
/// Each field marked `#[state]`, `#[state(key = "...")]` or
/// `#[state(default)]` is deserialized from the state; unmarked fields are
/// `Default::default()`. Extraction fails with a `StateError` naming the
/// missing or mistyped key.
///
/// Use `#[state(crate = "cobalt_core")]` on the struct when depending on the
/// core crate directly.
#[proc_macro_derive(FromState, attributes(state))]
pub fn derive_from_state(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    from_state::derive_from_state(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}
