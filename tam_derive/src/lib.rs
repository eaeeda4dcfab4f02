//! Derive macros for the tam crate.
//!
//! Provides:
//! - `#[derive(Error)]` - `Display`, `std::error::Error` and `From` boilerplate for
//!   the toolchain's error enums (thiserror replacement)

mod error;

use proc_macro::TokenStream;

/// Implements `Display` and `Error` for error types, plus `From` for `#[from]` fields.
///
/// A field marked `#[source]` or `#[from]` is returned by `Error::source`.
#[proc_macro_derive(Error, attributes(error, from, source))]
pub fn derive_error(input: TokenStream) -> TokenStream {
    error::derive_error(input)
}
