use crate::{
    prelude::*,
    utils::{fields_enum, stored_fields},
};

/// Generates only the `Fields` enum, for structs that are stored as part of
/// an entity rather than on their own.
pub fn derive_fields(item: TokenStream) -> Result<TokenStream> {
    let input = parse2::<DeriveInput>(item)?;

    let mod_ident = Ident::new(&input.ident.to_string().to_snake_case(), Span::call_site());
    let vis = input.vis.clone();
    let fields_enum = fields_enum(&stored_fields(input)?);

    Ok(quote! {
        #vis mod #mod_ident {
            #fields_enum
        }
    })
}
