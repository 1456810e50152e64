use crate::{
    prelude::*,
    utils::{FieldArg, ModuleArgs},
};

pub fn func_construct_update(input: TokenStream) -> Result<TokenStream> {
    let ModuleArgs { module, fields } = parse2(input)?;
    let krate = krate();

    let fields = fields.iter().map(|FieldArg { ident, value }| {
        quote! {
            #ident: #krate::Field::Set(#value)
        }
    });

    Ok(quote! {
        #module::TypedUpdate {
            #( #fields, )*
            ..::std::default::Default::default()
        }
    })
}
