use super::{RuleType, Schema, SchemaRule};
use schemars::schema::{
    ArrayValidation, InstanceType, NumberValidation, Schema as JsonSchema, SchemaObject,
    SingleOrVec, StringValidation,
};

impl Schema {
    /// Exports the field rules as a JSON Schema object, e.g. for a storage
    /// side validator.
    pub fn json_schema(&self) -> JsonSchema {
        let mut root = typed(InstanceType::Object);

        for (path, rule) in &self.rules {
            let segments = path.split('.').collect::<Vec<_>>();
            insert(&mut root, &segments, rule);
        }

        JsonSchema::Object(root)
    }
}

fn typed(instance_type: InstanceType) -> SchemaObject {
    SchemaObject {
        instance_type: Some(instance_type.into()),
        ..SchemaObject::default()
    }
}

fn insert(parent: &mut SchemaObject, segments: &[&str], rule: &SchemaRule) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };

    let object = parent.object();

    if rest.is_empty() {
        object
            .properties
            .insert((*head).to_owned(), JsonSchema::Object(rule_schema(rule)));

        if rule.required {
            object.required.insert((*head).to_owned());
        }

        return;
    }

    let child = object
        .properties
        .entry((*head).to_owned())
        .or_insert_with(|| JsonSchema::Object(typed(InstanceType::Object)));

    if let JsonSchema::Object(child) = child {
        insert(child, rest, rule);
    }
}

fn type_schema(ty: RuleType) -> SchemaObject {
    match ty {
        RuleType::String | RuleType::Id => typed(InstanceType::String),
        RuleType::Number => typed(InstanceType::Number),
        RuleType::Integer => typed(InstanceType::Integer),
        RuleType::Boolean => typed(InstanceType::Boolean),
        RuleType::Object => typed(InstanceType::Object),
        RuleType::Array => typed(InstanceType::Array),
        // timestamps or epoch milliseconds; no `format` keyword
        RuleType::Date => SchemaObject {
            instance_type: Some(SingleOrVec::Vec(vec![
                InstanceType::String,
                InstanceType::Integer,
            ])),
            ..SchemaObject::default()
        },
        RuleType::Any => SchemaObject::default(),
    }
}

fn rule_schema(rule: &SchemaRule) -> SchemaObject {
    let mut schema = type_schema(rule.ty);

    if rule.min.is_some() || rule.max.is_some() {
        schema.number = Some(Box::new(NumberValidation {
            minimum: rule.min,
            maximum: rule.max,
            ..NumberValidation::default()
        }));
    }

    let min_length = rule.min_length.and_then(|length| u32::try_from(length).ok());
    let max_length = rule.max_length.and_then(|length| u32::try_from(length).ok());

    match rule.ty {
        RuleType::Array => {
            schema.array = Some(Box::new(ArrayValidation {
                items: rule.items.map(|items| {
                    SingleOrVec::Single(Box::new(JsonSchema::Object(type_schema(items))))
                }),
                min_items: min_length,
                max_items: max_length,
                ..ArrayValidation::default()
            }));
        }
        _ if min_length.is_some() || max_length.is_some() || rule.pattern.is_some() => {
            schema.string = Some(Box::new(StringValidation {
                min_length,
                max_length,
                pattern: rule.pattern.clone(),
            }));
        }
        _ => {}
    }

    schema.enum_values.clone_from(&rule.one_of);

    schema
}
