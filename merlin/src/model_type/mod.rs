mod query;

use crate::{
    Config, Driver, Error, Model, Record, Result, Schema,
    hook_hub::{Hook, HookHub},
    model::INSTANCE_API,
    orchestrator::Inner,
    path,
    relation::{Descriptor, Edge, RelationKind, RelationOptions, Resolved, Side, describe},
};
use serde_json::Value;
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    sync::{Arc, Weak},
};

/// A default for a field that is absent on insert.
#[derive(Clone)]
pub enum DefaultValue {
    Value(Value),
    /// Evaluated once per inserted record.
    Generator(Arc<dyn Fn() -> Value + Send + Sync>),
}

impl DefaultValue {
    fn produce(&self) -> Value {
        match self {
            Self::Value(value) => value.clone(),
            Self::Generator(generate) => generate(),
        }
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Generator(_) => f.write_str("Generator"),
        }
    }
}

/// Everything needed to register a model type.
#[derive(Debug, Default)]
pub struct ModelDefinition {
    pub(crate) collection_name: Option<String>,
    pub(crate) schema: Option<Schema>,
    pub(crate) defaults: BTreeMap<String, DefaultValue>,
}

impl ModelDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_schema(schema: Schema) -> Self {
        Self::new().schema(schema)
    }

    /// Overrides the default collection name, the pluralized lower camel
    /// case model name.
    pub fn collection(mut self, name: impl Into<String>) -> Self {
        self.collection_name = Some(name.into());
        self
    }

    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn default_value(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.defaults
            .insert(path.into(), DefaultValue::Value(value.into()));
        self
    }

    pub fn default_with(
        mut self,
        path: impl Into<String>,
        generate: impl Fn() -> Value + Send + Sync + 'static,
    ) -> Self {
        self.defaults
            .insert(path.into(), DefaultValue::Generator(Arc::new(generate)));
        self
    }
}

/// A registered model type and its static surface.
pub struct ModelType {
    name: String,
    collection_name: String,
    merlin: Weak<Inner>,
    config: Arc<Config>,
    schema: Option<Arc<Schema>>,
    defaults: BTreeMap<String, DefaultValue>,
    reserved: BTreeSet<String>,
    hooks: HookHub,
}

impl ModelType {
    pub(crate) fn new(
        name: String,
        collection_name: String,
        merlin: Weak<Inner>,
        config: Arc<Config>,
        definition: ModelDefinition,
    ) -> Self {
        let mut reserved = INSTANCE_API
            .iter()
            .map(|name| (*name).to_owned())
            .collect::<BTreeSet<_>>();

        if let Some(schema) = &definition.schema {
            reserved.extend(schema.method_names().map(str::to_owned));
            reserved.extend(schema.virtual_paths().map(str::to_owned));
        }

        Self {
            name,
            collection_name,
            merlin,
            config,
            schema: definition.schema.map(Arc::new),
            defaults: definition.defaults,
            reserved,
            hooks: HookHub::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn schema(&self) -> Option<&Arc<Schema>> {
        self.schema.as_ref()
    }

    pub fn id_key(&self) -> &str {
        &self.config.id_key
    }

    /// Singular foreign key for `name`, or for this model when `None`.
    pub fn singular_foreign_key(&self, name: Option<&str>) -> String {
        let name = name.map_or_else(|| crate::inflect::lower_camel(&self.name), str::to_owned);
        self.config.singular_foreign_key(&name)
    }

    /// Plural foreign key for `name`, or for this model when `None`.
    pub fn plural_foreign_key(&self, name: Option<&str>) -> String {
        let name = name.map_or_else(|| crate::inflect::lower_camel(&self.name), str::to_owned);
        self.config.plural_foreign_key(&name)
    }

    pub fn hooks(&self) -> &HookHub {
        &self.hooks
    }

    pub fn on(&self, name: impl Into<String>, hook: Hook) {
        self.hooks.on(name, hook);
    }

    pub fn off(&self, name: &str, hook: &Hook) -> bool {
        self.hooks.off(name, hook)
    }

    /// Record keys that would shadow the instance API.
    pub fn reserved_names(&self) -> &BTreeSet<String> {
        &self.reserved
    }

    pub(crate) fn check_reserved(&self, record: &Record) -> Result<()> {
        match record.keys().find(|key| self.reserved.contains(*key)) {
            Some(key) => Err(Error::ReservedProperty(key.clone())),
            None => Ok(()),
        }
    }

    pub(crate) fn inner(&self) -> Result<Arc<Inner>> {
        self.merlin.upgrade().ok_or(Error::Detached)
    }

    pub(crate) fn driver(&self) -> Result<Arc<dyn Driver>> {
        self.inner()?.driver()
    }

    pub(crate) fn apply_defaults(&self, record: &mut Record) {
        for (path, default) in &self.defaults {
            if !path::contains(record, path) {
                path::set(record, path, default.produce());
            }
        }
    }

    /// The schema to validate writes with, unless validation is switched off.
    pub(crate) fn validating_schema(&self, opts: &crate::Options) -> Option<&Schema> {
        if opts.skip_schema_validation || self.config.skip_schema_validation {
            return None;
        }

        self.schema.as_deref()
    }

    /// Creates an unsaved model from `record`.
    pub fn build(self: &Arc<Self>, record: Value) -> Result<Model> {
        let Value::Object(record) = record else {
            return Err(Error::invalid_argument(format!(
                "a record must be an object, got `{record}`"
            )));
        };

        Model::hydrate(self.clone(), record, false)
    }

    /// Calls a static method declared on the schema.
    pub fn call_static(self: &Arc<Self>, name: &str, args: &[Value]) -> Result<Value> {
        let method = self
            .schema
            .as_ref()
            .and_then(|schema| schema.get_static(name))
            .cloned()
            .ok_or_else(|| {
                Error::invalid_argument(format!("{} has no static method `{name}`", self.name))
            })?;

        method(self, args)
    }

    pub fn relations(&self) -> Result<BTreeMap<String, Descriptor>> {
        Ok(self.inner()?.graph().relations(&self.name))
    }

    pub fn references(&self) -> Result<BTreeMap<String, BTreeMap<String, Descriptor>>> {
        Ok(self.inner()?.graph().references(&self.name))
    }

    /// This type stores a single key of `foreign`.
    pub fn has_one(&self, foreign: &str, opts: impl Into<RelationOptions>) -> Result<Descriptor> {
        self.declare(Side::Owner, RelationKind::OneToOne, foreign, opts.into())
    }

    /// This type stores an array of keys of `foreign`.
    pub fn has_many(&self, foreign: &str, opts: impl Into<RelationOptions>) -> Result<Descriptor> {
        self.declare(Side::Owner, RelationKind::OneToMany, foreign, opts.into())
    }

    /// Many records of this type store the key of one `foreign` record.
    pub fn many_have_one(
        &self,
        foreign: &str,
        opts: impl Into<RelationOptions>,
    ) -> Result<Descriptor> {
        self.declare(Side::Owner, RelationKind::ManyToOne, foreign, opts.into())
    }

    /// `foreign` stores a single key of this type.
    pub fn belongs_to_one(
        &self,
        foreign: &str,
        opts: impl Into<RelationOptions>,
    ) -> Result<Descriptor> {
        self.declare(Side::Referenced, RelationKind::OneToOne, foreign, opts.into())
    }

    /// `foreign` stores an array of keys of this type.
    pub fn belongs_to_many(
        &self,
        foreign: &str,
        opts: impl Into<RelationOptions>,
    ) -> Result<Descriptor> {
        self.declare(Side::Referenced, RelationKind::OneToMany, foreign, opts.into())
    }

    /// Many `foreign` records store the key of one record of this type.
    pub fn many_belong_to_one(
        &self,
        foreign: &str,
        opts: impl Into<RelationOptions>,
    ) -> Result<Descriptor> {
        self.declare(Side::Referenced, RelationKind::ManyToOne, foreign, opts.into())
    }

    fn declare(
        &self,
        side: Side,
        kind: RelationKind,
        foreign: &str,
        opts: RelationOptions,
    ) -> Result<Descriptor> {
        let inner = self.inner()?;
        inner.model(foreign)?;

        let (owner, target) = match side {
            Side::Owner => (self.name.as_str(), foreign),
            Side::Referenced => (foreign, self.name.as_str()),
        };

        let relation = describe(&self.config, side, kind, owner, target, opts);

        tracing::debug!(
            owner,
            target,
            kind = ?relation.kind,
            key_path = %relation.key_path,
            field_path = %relation.field_path,
            "declared relation"
        );

        inner.graph_mut().link(owner, relation.clone());

        Ok(relation)
    }

    /// Resolves a field path to the relation or reference attached there.
    pub fn resolve(&self, field_path: &str) -> Result<Resolved> {
        self.edges()?
            .into_iter()
            .find(|resolved| resolved.attach_path() == field_path)
            .ok_or_else(|| Error::PathNotFound {
                model: self.name.clone(),
                path: field_path.to_owned(),
            })
    }

    /// Every relation and reference of this type, relations first.
    pub fn edges(&self) -> Result<Vec<Resolved>> {
        let inner = self.inner()?;
        let edges = inner.graph().edges(&self.name);

        edges
            .into_iter()
            .map(|(edge, descriptor)| {
                Ok(Resolved {
                    edge,
                    target: inner.model(&descriptor.model_name)?,
                    descriptor,
                })
            })
            .collect()
    }

    /// Paths where related models are attached on records of this type.
    pub fn sub_record_paths(&self) -> Result<Vec<String>> {
        let inner = self.inner()?;
        let graph = inner.graph();

        Ok(graph
            .edges(&self.name)
            .into_iter()
            .map(|(edge, descriptor)| match edge {
                Edge::Relation => descriptor.field_path,
                Edge::Reference => descriptor.foreign_field_path,
            })
            .collect())
    }

    /// Removes populated sub-records from `record`, returning them by path.
    pub fn strip_sub_records(&self, record: &mut Record) -> Result<Record> {
        let mut stripped = Record::new();

        for path in self.sub_record_paths()? {
            if path::get(record, &path).is_some_and(|value| value.is_object() || value.is_array())
            {
                if let Some(value) = path::remove(record, &path) {
                    stripped.insert(path, value);
                }
            }
        }

        Ok(stripped)
    }

    /// Removes embedded sub-queries from `filter`, returning them by path. A
    /// sub-query is an object or `true` at a sub-record path.
    pub fn strip_sub_queries(&self, filter: &mut Record) -> Result<Record> {
        let mut sub_queries = Record::new();

        for path in self.sub_record_paths()? {
            let is_sub_query = filter
                .get(&path)
                .or_else(|| path::get(filter, &path))
                .is_some_and(|value| value.is_object() || *value == Value::Bool(true));

            if !is_sub_query {
                continue;
            }

            let value = match filter.remove(&path) {
                Some(value) => Some(value),
                None => path::remove(filter, &path),
            };

            if let Some(value) = value {
                sub_queries.insert(path, value);
            }
        }

        Ok(sub_queries)
    }
}

impl fmt::Debug for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelType")
            .field("name", &self.name)
            .field("collection_name", &self.collection_name)
            .field("schema", &self.schema)
            .field("defaults", &self.defaults)
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}
