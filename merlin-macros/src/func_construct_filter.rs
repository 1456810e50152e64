use crate::{
    prelude::*,
    utils::{FieldArg, ModuleArgs},
};

const OPERATORS: &[&str] = &["Eq", "Ne", "Gt", "Gte", "Lt", "Lte", "In", "Nin"];

/// Splits `Op(operand)` into its parts when `Op` is a filter operator.
fn split_operator(expr: &Expr) -> Option<(Ident, &Expr)> {
    let Expr::Call(call) = expr else {
        return None;
    };
    let Expr::Path(path) = call.func.as_ref() else {
        return None;
    };

    let operator = path.path.get_ident()?;

    if call.args.len() != 1 || !OPERATORS.iter().any(|known| operator == known) {
        return None;
    }

    Some((operator.clone(), &call.args[0]))
}

pub fn func_construct_filter(input: TokenStream) -> Result<TokenStream> {
    let ModuleArgs { module, fields } = parse2(input)?;
    let krate = krate();

    let fields = fields.iter().map(|FieldArg { ident, value }| {
        // a bare value means equality
        let (operator, operand) =
            split_operator(value).unwrap_or_else(|| (Ident::new("Eq", value.span()), value));

        quote! {
            #ident: #krate::Field::Set(#krate::FilterOperator::#operator(#operand))
        }
    });

    Ok(quote! {
        #module::TypedFilter {
            #( #fields, )*
            ..::std::default::Default::default()
        }
    })
}
