//! The relation graph between model types.
//!
//! Every declaration produces two mirrored entries: a relation on the type
//! that stores the foreign key and a reference on the type the key points
//! to. Both are written under one lock, so readers never observe half a
//! declaration.

use crate::{Config, ModelType, Record, inflect, path};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RelationKind {
    OneToOne,
    OneToMany,
    ManyToOne,
}

/// One side of a relation edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    #[serde(rename = "type")]
    pub kind: RelationKind,
    /// The model type at the other end of the edge.
    pub model_name: String,
    /// Where the foreign id(s) are stored on the owning type.
    pub key_path: String,
    /// Where the foreign model(s) are attached on the owning type.
    pub field_path: String,
    /// Where the owning model is attached on the foreign type.
    pub foreign_field_path: String,
}

/// Naming overrides for a declaration. A bare `&str` is the `path`
/// shorthand.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationOptions {
    pub path: Option<String>,
    pub key_path: Option<String>,
    pub field_path: Option<String>,
    pub foreign_field_path: Option<String>,
}

impl RelationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key_path(mut self, key_path: impl Into<String>) -> Self {
        self.key_path = Some(key_path.into());
        self
    }

    pub fn field_path(mut self, field_path: impl Into<String>) -> Self {
        self.field_path = Some(field_path.into());
        self
    }

    pub fn foreign_field_path(mut self, foreign_field_path: impl Into<String>) -> Self {
        self.foreign_field_path = Some(foreign_field_path.into());
        self
    }
}

impl From<&str> for RelationOptions {
    fn from(path: &str) -> Self {
        Self {
            path: Some(path.to_owned()),
            ..Self::default()
        }
    }
}

impl From<String> for RelationOptions {
    fn from(path: String) -> Self {
        Self {
            path: Some(path),
            ..Self::default()
        }
    }
}

/// Which side of the edge the declaring type is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Side {
    /// `has_*`: the declaring type stores the key.
    Owner,
    /// `belongs_to_*`: the foreign type stores the key.
    Referenced,
}

/// Computes the descriptor stored on the owning type.
///
/// `owner` stores the key and `target` is the type it points to. For
/// [`Side::Referenced`] declarations `path` names where the owner is
/// attached on the declaring (target) type instead of the owner's field.
pub(crate) fn describe(
    config: &Config,
    side: Side,
    kind: RelationKind,
    owner: &str,
    target: &str,
    opts: RelationOptions,
) -> Descriptor {
    let target_field = inflect::lower_camel(target);
    let owner_field = inflect::lower_camel(owner);

    let (path, foreign_path) = match side {
        Side::Owner => (opts.path, None),
        Side::Referenced => (None, opts.path),
    };

    let (field_path, key_path) = match kind {
        RelationKind::OneToOne | RelationKind::ManyToOne => {
            let base = path.unwrap_or_else(|| target_field.clone());
            let key = config.singular_foreign_key(&base);
            (base, key)
        }
        RelationKind::OneToMany => match path {
            Some(path) => {
                let key = config.plural_foreign_key(&inflect::singularize(&path));
                (path, key)
            }
            None => (
                inflect::pluralize(&target_field),
                config.plural_foreign_key(&target_field),
            ),
        },
    };

    let foreign_field_path = foreign_path.unwrap_or_else(|| match kind {
        RelationKind::ManyToOne => inflect::pluralize(&owner_field),
        RelationKind::OneToOne | RelationKind::OneToMany => owner_field,
    });

    Descriptor {
        kind,
        model_name: target.to_owned(),
        key_path: opts.key_path.unwrap_or(key_path),
        field_path: opts.field_path.unwrap_or(field_path),
        foreign_field_path: opts.foreign_field_path.unwrap_or(foreign_field_path),
    }
}

#[derive(Debug, Default)]
pub(crate) struct RelationGraph {
    /// owner -> key path -> descriptor naming the target.
    relations: HashMap<String, BTreeMap<String, Descriptor>>,
    /// target -> owner -> key path -> descriptor naming the owner.
    references: HashMap<String, BTreeMap<String, BTreeMap<String, Descriptor>>>,
}

impl RelationGraph {
    /// Stores a relation on `owner` and its mirrored reference on the target.
    pub fn link(&mut self, owner: &str, relation: Descriptor) {
        let reference = Descriptor {
            model_name: owner.to_owned(),
            ..relation.clone()
        };

        self.references
            .entry(relation.model_name.clone())
            .or_default()
            .entry(owner.to_owned())
            .or_default()
            .insert(relation.key_path.clone(), reference);

        self.relations
            .entry(owner.to_owned())
            .or_default()
            .insert(relation.key_path.clone(), relation);
    }

    pub fn relations(&self, model: &str) -> BTreeMap<String, Descriptor> {
        self.relations.get(model).cloned().unwrap_or_default()
    }

    pub fn references(&self, model: &str) -> BTreeMap<String, BTreeMap<String, Descriptor>> {
        self.references.get(model).cloned().unwrap_or_default()
    }

    /// Every edge touching `model`, relations first.
    pub fn edges(&self, model: &str) -> Vec<(Edge, Descriptor)> {
        let relations = self
            .relations
            .get(model)
            .into_iter()
            .flat_map(BTreeMap::values)
            .map(|descriptor| (Edge::Relation, descriptor.clone()));

        let references = self
            .references
            .get(model)
            .into_iter()
            .flat_map(BTreeMap::values)
            .flat_map(BTreeMap::values)
            .map(|descriptor| (Edge::Reference, descriptor.clone()));

        relations.chain(references).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    /// The resolving type stores the key.
    Relation,
    /// The other type stores the key.
    Reference,
}

/// A field path resolved to the model type behind it.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub edge: Edge,
    pub descriptor: Descriptor,
    pub target: Arc<ModelType>,
}

impl Resolved {
    /// Where related models are attached on the resolving type.
    pub fn attach_path(&self) -> &str {
        match self.edge {
            Edge::Relation => &self.descriptor.field_path,
            Edge::Reference => &self.descriptor.foreign_field_path,
        }
    }

    /// Whether the path holds a collection rather than a single model.
    pub fn is_plural(&self) -> bool {
        matches!(
            (self.edge, self.descriptor.kind),
            (Edge::Relation, RelationKind::OneToMany) | (Edge::Reference, RelationKind::ManyToOne)
        )
    }

    /// The key the lookup is scoped by, or `None` when the record has none.
    pub fn lookup_key<'a>(&self, record: &'a Record, id_key: &str) -> Option<&'a Value> {
        let key = match self.edge {
            Edge::Relation => path::get(record, &self.descriptor.key_path),
            Edge::Reference => path::get(record, id_key),
        };

        key.filter(|key| !key.is_null())
    }

    /// The query selecting the related records of `record`, merged over the
    /// caller's `sub_query`.
    pub fn scoped_query(&self, record: &Record, id_key: &str, sub_query: Option<&Record>) -> Value {
        let mut query = sub_query.cloned().unwrap_or_default();
        let key = self.lookup_key(record, id_key).cloned().unwrap_or(Value::Null);

        match (self.edge, self.descriptor.kind) {
            (Edge::Relation, RelationKind::OneToMany) => {
                let keys = match key {
                    Value::Array(keys) => keys,
                    Value::Null => Vec::new(),
                    key => vec![key],
                };
                query.insert(id_key.to_owned(), json!({ "$in": keys }));
            }
            (Edge::Relation, _) => {
                query.insert(id_key.to_owned(), key);
            }
            (Edge::Reference, _) => {
                query.insert(self.descriptor.key_path.clone(), key);
            }
        }

        Value::Object(query)
    }
}
