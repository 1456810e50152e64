#![warn(clippy::pedantic)]
#![allow(clippy::too_many_lines)]

mod derive_entity;
mod derive_fields;
mod func_construct_filter;
mod func_construct_update;
mod prelude;
mod utils;

use proc_macro::TokenStream;

/// Runs an expansion, turning its error into a `compile_error!` invocation.
fn expand(
    input: TokenStream,
    expansion: impl FnOnce(proc_macro2::TokenStream) -> syn::Result<proc_macro2::TokenStream>,
) -> TokenStream {
    match expansion(input.into()) {
        Ok(output) => output.into(),
        Err(error) => error.into_compile_error().into(),
    }
}

/// Implements `merlin::Entity` and generates a helper module with typed
/// filters, updates and a `Fields` enum.
///
/// Container attributes: `#[entity(name = "...", collection = "...")]`.
/// Field attributes: `#[entity(skip, required = bool, type = "...", min = ..,
/// max = .., min_length = .., max_length = .., pattern = "...")]`.
#[proc_macro_derive(Entity, attributes(entity))]
pub fn entity(input: TokenStream) -> TokenStream {
    expand(input, derive_entity::derive_entity)
}

#[proc_macro_derive(Fields)]
pub fn fields(input: TokenStream) -> TokenStream {
    expand(input, derive_fields::derive_fields)
}

#[proc_macro]
pub fn construct_filter(input: TokenStream) -> TokenStream {
    expand(input, func_construct_filter::func_construct_filter)
}

#[proc_macro]
pub fn construct_update(input: TokenStream) -> TokenStream {
    expand(input, func_construct_update::func_construct_update)
}
