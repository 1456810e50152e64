use crate::prelude::*;
use proc_macro_crate::{FoundCrate, crate_name};

/// A named struct field together with the record key it is stored under.
pub struct StoredField {
    pub ident: Ident,
    pub key: LitStr,
    pub field: Field,
}

/// Named fields of `input` in declaration order; anything but a struct with
/// named fields is rejected at the offending span.
pub fn stored_fields(input: DeriveInput) -> Result<Vec<StoredField>> {
    let span = input.span();

    let fields = match input.data {
        Data::Struct(data) => match data.fields {
            Fields::Named(named) => named.named,
            other => return Err(Error::new_spanned(other, "expected named fields")),
        },
        _ => return Err(Error::new(span, "expected struct")),
    };

    fields
        .into_iter()
        .map(|field| {
            let ident = field
                .ident
                .clone()
                .ok_or_else(|| Error::new_spanned(&field, "expected a named field"))?;

            let key = LitStr::new(
                &serde_rename(&field).unwrap_or_else(|| ident.to_string()),
                ident.span(),
            );

            Ok(StoredField { ident, key, field })
        })
        .collect()
}

fn serde_rename(field: &Field) -> Option<String> {
    #[derive(FromAttributes)]
    #[darling(attributes(serde), allow_unknown_fields)]
    struct Serde {
        rename: String,
    }

    Serde::from_attributes(&field.attrs)
        .ok()
        .map(|serde| serde.rename)
}

/// `Fields` enum with one variant per stored field, displayed as its key.
pub fn fields_enum<'a>(fields: impl IntoIterator<Item = &'a StoredField>) -> TokenStream {
    let (variants, keys): (Vec<_>, Vec<_>) = fields
        .into_iter()
        .map(|stored| {
            let variant = Ident::new(
                &stored.ident.to_string().to_upper_camel_case(),
                stored.ident.span(),
            );

            (variant, &stored.key)
        })
        .unzip();

    quote! {
        #[derive(
            ::std::fmt::Debug,
            ::std::clone::Clone,
            ::std::marker::Copy,
            ::std::cmp::PartialEq,
            ::std::cmp::Eq,
        )]
        pub enum Fields {
            #( #variants ),*
        }

        impl Fields {
            pub const fn key(self) -> &'static str {
                match self {
                    #( Self::#variants => #keys ),*
                }
            }
        }

        impl ::std::fmt::Display for Fields {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.key())
            }
        }

        impl ::std::convert::From<Fields> for ::std::string::String {
            fn from(value: Fields) -> Self {
                ::std::string::String::from(value.key())
            }
        }
    }
}

/// Path to the `merlin` crate as seen from the expansion site.
pub fn krate() -> TokenStream {
    match crate_name("merlin") {
        Ok(FoundCrate::Name(name)) => {
            let ident = Ident::new(&name, Span::call_site());
            quote! { ::#ident }
        }
        Ok(FoundCrate::Itself) | Err(_) => quote! { ::merlin },
    }
}

/// Arguments of the `filter!`/`update!` helpers: `module, field: value, ...`.
pub struct ModuleArgs {
    pub module: Ident,
    pub fields: Punctuated<FieldArg, Token![,]>,
}

pub struct FieldArg {
    pub ident: Ident,
    pub value: Expr,
}

impl Parse for ModuleArgs {
    fn parse(input: ParseStream) -> Result<Self> {
        let module = input.parse()?;
        input.parse::<Token![,]>()?;

        Ok(Self {
            module,
            fields: Punctuated::parse_terminated(input)?,
        })
    }
}

impl Parse for FieldArg {
    fn parse(input: ParseStream) -> Result<Self> {
        let ident = input.parse()?;
        input.parse::<Token![:]>()?;

        Ok(Self {
            ident,
            value: input.parse()?,
        })
    }
}
