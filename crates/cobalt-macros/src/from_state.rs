//! `#[derive(FromState)]` implementation.
//!
//! # Struct-level attribute
//!
//! | Key | Example | Description |
//! |-----|---------|-------------|
//! | `crate` | `#[state(crate = "cobalt_core")]` | Path of the crate exporting `FromState` (default `::cobalt`) |
//!
//! # Field-level attributes
//!
//! | Form | Behaviour |
//! |------|-----------|
//! | `#[state]` | Extract the key named after the field |
//! | `#[state(key = "args")]` | Extract the given key |
//! | `#[state(default)]` | As above, but a missing key yields `Default::default()` |
//! | no attribute | Field is `Default::default()` |

use proc_macro2::TokenStream;
use quote::quote;
use syn::{Attribute, Data, DeriveInput, Fields, LitStr, Path, spanned::Spanned};

// ============================================================================
// Attribute structures
// ============================================================================

/// What to do with one field.
enum FieldSource {
    /// Not mentioned in the state.
    Default,
    /// Read from `key`.
    Key { key: String, or_default: bool },
}

// ============================================================================
// Entry point
// ============================================================================

pub fn derive_from_state(input: &DeriveInput) -> syn::Result<TokenStream> {
    let name = &input.ident;
    let krate = parse_crate_path(&input.attrs)?;

    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new(
            input.span(),
            "FromState can only be derived for structs with named fields",
        ));
    };
    let Fields::Named(fields) = &data.fields else {
        return Err(syn::Error::new(
            data.fields.span(),
            "FromState can only be derived for structs with named fields",
        ));
    };

    let mut inits = Vec::new();
    for field in &fields.named {
        let Some(ident) = &field.ident else {
            continue;
        };
        let init = match parse_field_attrs(&field.attrs, &ident.to_string())? {
            FieldSource::Default => quote! { ::core::default::Default::default() },
            FieldSource::Key {
                key,
                or_default: false,
            } => quote! { state.extract(#key)? },
            FieldSource::Key {
                key,
                or_default: true,
            } => quote! { state.extract_or_default(#key)? },
        };
        inits.push(quote! { #ident: #init });
    }

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics #krate::FromState for #name #ty_generics #where_clause {
            fn from_state(state: &#krate::State) -> #krate::StateResult<Self> {
                ::core::result::Result::Ok(Self {
                    #(#inits),*
                })
            }
        }
    })
}

// ============================================================================
// Attribute parsing
// ============================================================================

fn parse_crate_path(attrs: &[Attribute]) -> syn::Result<Path> {
    let mut path: Option<Path> = None;
    for attr in attrs {
        if !attr.path().is_ident("state") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("crate") {
                path = Some(meta.value()?.parse::<LitStr>()?.parse()?);
                Ok(())
            } else {
                Err(meta.error("unknown `state` attribute, expected `crate`"))
            }
        })?;
    }
    Ok(path.unwrap_or_else(|| syn::parse_quote!(::cobalt)))
}

fn parse_field_attrs(attrs: &[Attribute], field_name: &str) -> syn::Result<FieldSource> {
    let mut source = FieldSource::Default;

    for attr in attrs {
        if !attr.path().is_ident("state") {
            continue;
        }
        let mut key: Option<String> = None;
        let mut or_default = false;

        // bare `#[state]`
        if matches!(attr.meta, syn::Meta::Path(_)) {
            source = FieldSource::Key {
                key: field_name.to_string(),
                or_default,
            };
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("key") {
                key = Some(meta.value()?.parse::<LitStr>()?.value());
                Ok(())
            } else if meta.path.is_ident("default") {
                or_default = true;
                Ok(())
            } else {
                Err(meta.error("unknown `state` attribute, expected `key` or `default`"))
            }
        })?;

        source = FieldSource::Key {
            key: key.unwrap_or_else(|| field_name.to_string()),
            or_default,
        };
    }

    Ok(source)
}
