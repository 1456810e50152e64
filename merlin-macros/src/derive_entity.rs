use crate::{
    prelude::*,
    utils::{StoredField, fields_enum, stored_fields},
};

#[derive(FromAttributes, Default)]
#[darling(attributes(entity), default)]
struct Attributes {
    name: Option<String>,
    collection: Option<String>,
}

#[derive(FromAttributes, Default)]
#[darling(attributes(entity), default)]
struct FieldAttributes {
    /// Leave the field out of the generated schema.
    skip: bool,
    required: Option<bool>,
    #[darling(rename = "type")]
    ty: Option<String>,
    min: Option<f64>,
    max: Option<f64>,
    min_length: Option<usize>,
    max_length: Option<usize>,
    pattern: Option<String>,
}

pub fn derive_entity(item: TokenStream) -> Result<TokenStream> {
    let input = parse2::<DeriveInput>(item)?;

    let attributes = Attributes::from_attributes(&input.attrs)?;

    let vis = input.vis.clone();
    let ident = input.ident.clone();

    let fields = stored_fields(input)?
        .into_iter()
        .map(|stored| -> Result<FieldConfig> {
            let field_attributes = FieldAttributes::from_attributes(&stored.field.attrs)?;

            let rule = if field_attributes.skip || stored.ident == "id" {
                None
            } else {
                Some(build_rule(&stored.field.ty, &field_attributes)?)
            };

            Ok(FieldConfig { stored, rule })
        })
        .collect::<Result<Vec<_>>>()?;

    let model_name = attributes.name.unwrap_or_else(|| {
        let name = ident.to_string();
        name.strip_suffix("Entity")
            .filter(|stripped| !stripped.is_empty())
            .map_or(name.clone(), str::to_owned)
    });

    Ok(build(
        &vis,
        &ident,
        &model_name,
        attributes.collection.as_deref(),
        &fields,
    ))
}

struct FieldConfig {
    stored: StoredField,
    rule: Option<TokenStream>,
}

/// `T` when `ty` is `Option<T>`.
fn option_inner(ty: &Type) -> Option<&Type> {
    let Type::Path(type_path) = ty else {
        return None;
    };

    let segment = type_path.path.segments.last()?;
    if segment.ident != "Option" {
        return None;
    }

    let PathArguments::AngleBracketed(arguments) = &segment.arguments else {
        return None;
    };

    match arguments.args.first()? {
        GenericArgument::Type(inner) => Some(inner),
        _ => None,
    }
}

/// The rule type tag for a Rust type, by its last path segment.
fn rule_type(ty: &Type) -> &'static str {
    let Type::Path(type_path) = ty else {
        return match ty {
            Type::Reference(reference) => rule_type(&reference.elem),
            Type::Array(_) | Type::Slice(_) => "Array",
            _ => "Any",
        };
    };

    let Some(segment) = type_path.path.segments.last() else {
        return "Any";
    };

    match segment.ident.to_string().as_str() {
        "String" | "str" | "Cow" => "String",
        "i8" | "i16" | "i32" | "i64" | "i128" | "isize" | "u8" | "u16" | "u32" | "u64"
        | "u128" | "usize" => "Integer",
        "f32" | "f64" => "Number",
        "bool" => "Boolean",
        "Vec" | "VecDeque" | "HashSet" | "BTreeSet" => "Array",
        "HashMap" | "BTreeMap" | "Map" => "Object",
        "DateTime" | "NaiveDateTime" | "NaiveDate" => "Date",
        _ => "Any",
    }
}

fn rule_type_from_tag(tag: &str) -> Option<&'static str> {
    Some(match tag {
        "string" => "String",
        "number" => "Number",
        "integer" => "Integer",
        "boolean" => "Boolean",
        "object" => "Object",
        "array" => "Array",
        "date" => "Date",
        "id" => "Id",
        "any" => "Any",
        _ => return None,
    })
}

fn build_rule(ty: &Type, attributes: &FieldAttributes) -> Result<TokenStream> {
    let krate = krate();

    let optional = option_inner(ty);
    let value_ty = optional.unwrap_or(ty);

    let rule_ty = match &attributes.ty {
        Some(tag) => rule_type_from_tag(tag).ok_or_else(|| {
            Error::new_spanned(ty, format!("unknown rule type `{tag}`"))
        })?,
        None => rule_type(value_ty),
    };
    let rule_ty = Ident::new(rule_ty, Span::call_site());

    let mut modifiers = vec![];

    if attributes.required.unwrap_or(optional.is_none()) {
        modifiers.push(quote! { .required() });
    }
    if let Some(min) = attributes.min {
        modifiers.push(quote! { .min(#min) });
    }
    if let Some(max) = attributes.max {
        modifiers.push(quote! { .max(#max) });
    }
    if let Some(min_length) = attributes.min_length {
        modifiers.push(quote! { .min_length(#min_length) });
    }
    if let Some(max_length) = attributes.max_length {
        modifiers.push(quote! { .max_length(#max_length) });
    }
    if let Some(pattern) = &attributes.pattern {
        modifiers.push(quote! { .pattern(#pattern) });
    }

    Ok(quote! {
        #krate::SchemaRule::new(#krate::RuleType::#rule_ty) #( #modifiers )*
    })
}

fn build(
    vis: &Visibility,
    ident: &Ident,
    model_name: &str,
    collection_name: Option<&str>,
    fields: &[FieldConfig],
) -> TokenStream {
    let krate = krate();

    let mod_ident = Ident::new(&ident.to_string().to_snake_case(), Span::call_site());

    let collection_name = match collection_name {
        Some(name) => quote! { ::std::option::Option::Some(#name) },
        None => quote! { ::std::option::Option::None },
    };

    let field_idents = fields.iter().map(|config| &config.stored.ident).collect_vec();
    let field_types = fields.iter().map(|config| &config.stored.field.ty).collect_vec();
    let field_lits = fields.iter().map(|config| &config.stored.key).collect_vec();

    // `&str` operands for `String` fields
    let filter_field_types = field_types.iter().map(|ty| match ty {
        Type::Path(type_path) if type_path.qself.is_none() && type_path.path.is_ident("String") => {
            parse_quote! { str }
        }
        _ => (*ty).clone(),
    });

    let rules = fields.iter().filter_map(|config| {
        let rule = config.rule.as_ref()?;
        let key = &config.stored.key;

        Some(quote! {
            schema.rule(#key, #rule);
        })
    });

    let fields_enum = fields_enum(fields.iter().map(|config| &config.stored));

    quote! {
        #vis mod #mod_ident {
            use super::*;

            impl #krate::Entity for #ident {
                type Fields = Fields;

                const MODEL_NAME: &'static str = #model_name;

                const COLLECTION_NAME: ::std::option::Option<&'static str> = #collection_name;

                fn schema() -> #krate::Schema {
                    let mut schema = #krate::Schema::new();
                    #( #rules )*
                    schema
                }
            }

            #[derive(::std::fmt::Debug, ::std::default::Default)]
            pub struct TypedFilter<'a> {
                #(
                    pub #field_idents:
                        #krate::Field<#krate::FilterOperator<'a, #filter_field_types>>
                ),*
            }

            impl #krate::Filter for TypedFilter<'_> {
                fn to_filter(&self) -> #krate::serde_json::Value {
                    let mut filter = #krate::serde_json::Map::new();

                    #(
                        if let #krate::Field::Set(val) = &self.#field_idents {
                            filter.insert(
                                ::std::string::String::from(#field_lits),
                                #krate::FilterOperator::to_value(val),
                            );
                        }
                    )*

                    #krate::serde_json::Value::Object(filter)
                }
            }

            #[derive(::std::fmt::Debug, ::std::default::Default)]
            pub struct TypedUpdate {
                #(
                    pub #field_idents: #krate::Field<#field_types>
                ),*
            }

            impl #krate::Update for TypedUpdate {
                fn to_update(&self) -> #krate::serde_json::Value {
                    let mut set = #krate::serde_json::Map::new();

                    #(
                        if let #krate::Field::Set(val) = &self.#field_idents {
                            set.insert(
                                ::std::string::String::from(#field_lits),
                                #krate::serde_json::to_value(val)
                                    .unwrap_or(#krate::serde_json::Value::Null),
                            );
                        }
                    )*

                    let mut update = #krate::serde_json::Map::new();
                    update.insert(
                        ::std::string::String::from("$set"),
                        #krate::serde_json::Value::Object(set),
                    );

                    #krate::serde_json::Value::Object(update)
                }
            }

            #fields_enum

            #[allow(unused_macros)]
            macro_rules! filter {
                ($( $input: tt )*) => {
                   #krate::construct_filter!(#mod_ident, $( $input )*)
                };
            }

            #[allow(unused_imports)]
            pub(crate) use filter;

            #[allow(unused_macros)]
            macro_rules! update {
                ($( $input: tt )*) => {
                   #krate::construct_update!(#mod_ident, $( $input )*)
                };
            }

            #[allow(unused_imports)]
            pub(crate) use update;
        }

        #krate::__submit_entity!(#ident);
    }
}
