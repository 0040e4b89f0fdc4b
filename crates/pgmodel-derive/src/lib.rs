//! Derive macros for pgmodel
//!
//! Provides `#[derive(FromRow)]`.

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

mod from_row;

/// Derive `FromRow` for a struct with named fields.
///
/// Each field is read from the column of the same name unless an explicit
/// mapping is given.
///
/// # Example
///
/// ```ignore
/// use pgmodel::FromRow;
///
/// #[derive(FromRow)]
/// struct Todo {
///     id: i64,
///     title: String,
///     #[orm(column = "is_done")]
///     completed: bool,
/// }
/// ```
///
/// # Attributes
///
/// - `#[orm(column = "name")]` - Map field to a different column name
#[proc_macro_derive(FromRow, attributes(orm))]
pub fn derive_from_row(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    from_row::expand(input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}
