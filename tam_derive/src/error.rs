//! Derive macro for error types.
//!
//! Generates `std::fmt::Display` and `std::error::Error` implementations, and a
//! `From` conversion for every variant whose single field carries `#[from]`.
//!
//! # Usage
//!
//! ```ignore
//! use tam_derive::Error;
//!
//! #[derive(Debug, Error)]
//! pub enum LoadError {
//!     #[error("cannot open {path}: {source}")]
//!     Open { path: String, #[source] source: std::io::Error },
//!
//!     #[error("read failed: {0}")]
//!     Io(#[from] std::io::Error),
//!
//!     #[error("code store full")]
//!     CodeStoreFull,
//! }
//! ```
//!
//! # Supported Features
//!
//! - Unit variants: `#[error("message")]`
//! - Tuple variants with positional args: `#[error("error: {0}")]`
//! - Struct variants with named args: `#[error("expected {expected}")]`
//! - `#[from]` on the only field of a variant: emits `From<Field>` and reports the
//!   field through `Error::source`
//! - `#[source]` on one field of a variant: reports it through `Error::source` without
//!   a `From` conversion
//!
//! Fields a message does not mention are left out of the generated `write!`, so a
//! variant may carry data that is only meant for callers.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{ToTokens, format_ident, quote};
use syn::{Data, DeriveInput, Fields, Lit, Meta, parse_macro_input};

/// Derives `Display`, `Error` and `From` for an enum or struct.
pub fn derive_error(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match expand_error_derive(&input) {
        Ok(tokens) => TokenStream::from(tokens),
        Err(err) => err.to_compile_error().into(),
    }
}

/// A field as seen by the generated code.
struct FieldInfo {
    /// Name bound in patterns and used as the format argument name.
    binding: syn::Ident,
    /// How the field is addressed on `self` (`0`, `name`).
    member: syn::Member,
    ty: syn::Type,
    from: bool,
    source: bool,
}

fn collect_fields(fields: &Fields) -> Vec<FieldInfo> {
    fields
        .iter()
        .enumerate()
        .map(|(i, field)| {
            let (binding, member) = match &field.ident {
                Some(ident) => (ident.clone(), syn::Member::Named(ident.clone())),
                None => (
                    format_ident!("f{}", i),
                    syn::Member::Unnamed(syn::Index::from(i)),
                ),
            };
            FieldInfo {
                binding,
                member,
                ty: field.ty.clone(),
                from: field.attrs.iter().any(|a| a.path().is_ident("from")),
                source: field.attrs.iter().any(|a| a.path().is_ident("source")),
            }
        })
        .collect()
}

fn expand_error_derive(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    match &input.data {
        Data::Enum(data_enum) => {
            let mut display_arms = Vec::with_capacity(data_enum.variants.len());
            let mut source_arms = Vec::new();
            let mut from_impls = Vec::new();

            for variant in &data_enum.variants {
                let variant_name = &variant.ident;
                let fields = collect_fields(&variant.fields);
                let message = rename_positional(
                    &extract_error_message(&variant.attrs, variant_name, "variant")?,
                    fields.len(),
                );
                let used: Vec<bool> = fields
                    .iter()
                    .map(|f| mentions(&message, &f.binding))
                    .collect();
                let args = fields
                    .iter()
                    .zip(&used)
                    .filter(|(_, used)| **used)
                    .map(|(f, _)| {
                        let binding = &f.binding;
                        quote! { #binding = #binding }
                    });
                let pattern = variant_pattern(&variant.fields, &fields, &used);
                display_arms.push(quote! {
                    Self::#variant_name #pattern => write!(f, #message #(, #args)*),
                });

                if let Some(from_field) = from_field(variant, &fields)? {
                    let ty = &from_field.ty;
                    let binding = &from_field.binding;
                    let construct = match &variant.fields {
                        Fields::Named(_) => quote! { Self::#variant_name { #binding: source } },
                        _ => quote! { Self::#variant_name(source) },
                    };
                    from_impls.push(quote! {
                        impl #impl_generics ::std::convert::From<#ty> for #name #ty_generics #where_clause {
                            fn from(source: #ty) -> Self {
                                #construct
                            }
                        }
                    });
                }

                if let Some(source_field) = source_field(variant, &fields)? {
                    let binding = &source_field.binding;
                    let only_source: Vec<bool> = fields
                        .iter()
                        .map(|f| f.binding == source_field.binding)
                        .collect();
                    let source_pattern = variant_pattern(&variant.fields, &fields, &only_source);
                    source_arms.push(quote! {
                        Self::#variant_name #source_pattern => ::std::option::Option::Some(#binding as &(dyn ::std::error::Error + 'static)),
                    });
                }
            }

            let source_fn = if source_arms.is_empty() {
                quote! {}
            } else {
                quote! {
                    fn source(&self) -> ::std::option::Option<&(dyn ::std::error::Error + 'static)> {
                        match self {
                            #(#source_arms)*
                            #[allow(unreachable_patterns)]
                            _ => ::std::option::Option::None,
                        }
                    }
                }
            };

            Ok(quote! {
                impl #impl_generics ::std::fmt::Display for #name #ty_generics #where_clause {
                    fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                        match self {
                            #(#display_arms)*
                        }
                    }
                }

                impl #impl_generics ::std::error::Error for #name #ty_generics #where_clause {
                    #source_fn
                }

                #(#from_impls)*
            })
        }
        Data::Struct(data_struct) => {
            let fields = collect_fields(&data_struct.fields);
            let message = rename_positional(
                &extract_error_message(&input.attrs, &input.ident, "type")?,
                fields.len(),
            );
            let args = fields
                .iter()
                .filter(|f| mentions(&message, &f.binding))
                .map(|f| {
                    let binding = &f.binding;
                    let member = &f.member;
                    quote! { #binding = self.#member }
                });

            Ok(quote! {
                impl #impl_generics ::std::fmt::Display for #name #ty_generics #where_clause {
                    fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                        write!(f, #message #(, #args)*)
                    }
                }

                impl #impl_generics ::std::error::Error for #name #ty_generics #where_clause {}
            })
        }
        Data::Union(_) => Err(syn::Error::new_spanned(
            input,
            "Error derive does not support unions",
        )),
    }
}

/// Builds the match pattern for a variant, binding only the fields the message uses.
fn variant_pattern(kind: &Fields, fields: &[FieldInfo], used: &[bool]) -> TokenStream2 {
    match kind {
        Fields::Unit => quote! {},
        Fields::Unnamed(_) => {
            let slots = fields.iter().zip(used).map(|(f, used)| {
                if *used {
                    f.binding.to_token_stream()
                } else {
                    quote! { _ }
                }
            });
            quote! { ( #(#slots),* ) }
        }
        Fields::Named(_) => {
            let bound = fields
                .iter()
                .zip(used)
                .filter(|(_, used)| **used)
                .map(|(f, _)| &f.binding);
            quote! { { #(#bound,)* .. } }
        }
    }
}

/// Returns the `#[from]` field of a variant, rejecting it on multi-field variants.
fn from_field<'a>(
    variant: &syn::Variant,
    fields: &'a [FieldInfo],
) -> syn::Result<Option<&'a FieldInfo>> {
    let marked: Vec<&FieldInfo> = fields.iter().filter(|f| f.from).collect();
    match (marked.as_slice(), fields.len()) {
        ([], _) => Ok(None),
        ([field], 1) => Ok(Some(field)),
        _ => Err(syn::Error::new_spanned(
            variant,
            "#[from] is only supported on a variant with exactly one field",
        )),
    }
}

/// Returns the field reported by `Error::source`: the one marked `#[source]` or `#[from]`.
fn source_field<'a>(
    variant: &syn::Variant,
    fields: &'a [FieldInfo],
) -> syn::Result<Option<&'a FieldInfo>> {
    let marked: Vec<&FieldInfo> = fields.iter().filter(|f| f.from || f.source).collect();
    match marked.as_slice() {
        [] => Ok(None),
        [field] => Ok(Some(field)),
        _ => Err(syn::Error::new_spanned(
            variant,
            "only one field of a variant may be marked #[source] or #[from]",
        )),
    }
}

/// Whether the message interpolates `binding` (plain or with a format spec).
fn mentions(message: &str, binding: &syn::Ident) -> bool {
    let plain = format!("{{{}}}", binding);
    let with_spec = format!("{{{}:", binding);
    message.contains(&plain) || message.contains(&with_spec)
}

/// Extracts the message from an `#[error("...")]` attribute.
fn extract_error_message<T: ToTokens>(
    attrs: &[syn::Attribute],
    target: &T,
    kind: &str,
) -> syn::Result<String> {
    for attr in attrs {
        if !attr.path().is_ident("error") {
            continue;
        }

        let Meta::List(meta_list) = &attr.meta else {
            return Err(syn::Error::new_spanned(
                &attr.meta,
                "invalid #[error] attribute; use #[error(\"message\")] to describe the error",
            ));
        };

        return match syn::parse2::<Lit>(meta_list.tokens.clone()) {
            Ok(Lit::Str(lit_str)) => Ok(lit_str.value()),
            Ok(_) => Err(syn::Error::new_spanned(
                &attr.meta,
                "invalid #[error] attribute: message must be a string literal, e.g. #[error(\"bad opcode {0}\")]",
            )),
            Err(_) => Err(syn::Error::new_spanned(
                &attr.meta,
                "failed to parse #[error] attribute; expected a string literal",
            )),
        };
    }

    Err(syn::Error::new_spanned(
        target,
        format!(
            "missing #[error(\"...\")] attribute on {kind} `{}`",
            target.to_token_stream()
        ),
    ))
}

/// Rewrites positional placeholders `{0}`, `{1:?}` to the generated bindings `{f0}`, `{f1:?}`.
fn rename_positional(message: &str, field_count: usize) -> String {
    let mut result = message.to_string();
    for i in (0..field_count).rev() {
        result = result
            .replace(&format!("{{{i}}}"), &format!("{{f{i}}}"))
            .replace(&format!("{{{i}:"), &format!("{{f{i}:"));
    }
    result
}
