//! Model instances: a record with change tracking, persistence and attached
//! related models.

use crate::{
    Delta, Entity, Error, ModelSet, ModelType, Options, Record, Result,
    hook_hub::{HookArgs, names},
    path,
    relation::{Descriptor, Edge, RelationKind},
};
use futures_util::{FutureExt, future::BoxFuture};
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    sync::Arc,
};

/// Names of the instance API. Records may not use them as keys.
pub const INSTANCE_API: &[&str] = &[
    "cache", "call", "clone", "delta", "get", "record", "remove", "reset", "save", "set", "status",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelStatus {
    /// No record data applied yet.
    Init,
    Ready,
}

/// Related data attached at a relation or reference path.
#[derive(Debug, Clone)]
pub enum SubModel {
    Model(Box<Model>),
    Set(ModelSet),
}

impl SubModel {
    pub fn models(&self) -> std::slice::Iter<'_, Model> {
        match self {
            Self::Model(model) => std::slice::from_ref(&**model).iter(),
            Self::Set(set) => set.iter(),
        }
    }

    pub fn models_mut(&mut self) -> std::slice::IterMut<'_, Model> {
        match self {
            Self::Model(model) => std::slice::from_mut(&mut **model).iter_mut(),
            Self::Set(set) => set.iter_mut(),
        }
    }

    /// The full record, or an array of them, sub-records included.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Model(model) => Value::Object(model.record_with_sub_records()),
            Self::Set(set) => Value::Array(
                set.records_with_sub_records()
                    .into_iter()
                    .map(Value::Object)
                    .collect(),
            ),
        }
    }

    /// Ids of the attached models that have one.
    pub fn ids(&self) -> Vec<Value> {
        self.models().filter_map(|model| model.id().cloned()).collect()
    }

    /// Points every attached model at the owner `id` through the key path
    /// of `descriptor`.
    pub(crate) fn link_to(&mut self, descriptor: &Descriptor, id: &Value) {
        let plural = descriptor.kind == RelationKind::OneToMany;

        for model in self.models_mut() {
            model.link(&descriptor.key_path, id, plural);
        }
    }

    pub fn save_all(&mut self) -> BoxFuture<'_, Result<()>> {
        async move {
            for model in self.models_mut() {
                model.save_all().await?;
            }
            Ok(())
        }
        .boxed()
    }

    /// Removes every persisted model, and what hangs off it.
    pub fn remove_all(&mut self) -> BoxFuture<'_, Result<()>> {
        async move {
            for model in self.models_mut() {
                if !model.is_new() {
                    model.remove_all().await?;
                }
            }
            Ok(())
        }
        .boxed()
    }
}

/// A record of a [`ModelType`] with its last synchronized state.
///
/// `record` holds the live fields and `cache` a copy of what was last read
/// from or written to the driver; [`delta`](Self::delta) is the difference.
/// Related data sits beside the record as [`SubModel`]s and never appears in
/// `record` itself.
#[derive(Clone)]
pub struct Model {
    model_type: Arc<ModelType>,
    cache: Record,
    record: Record,
    status: ModelStatus,
    new_model: bool,
    reserved: BTreeSet<String>,
    sub_models: BTreeMap<String, SubModel>,
}

impl Model {
    pub(crate) fn hydrate(
        model_type: Arc<ModelType>,
        record: Record,
        persisted: bool,
    ) -> Result<Self> {
        let mut model = Self {
            model_type,
            cache: Record::new(),
            record: Record::new(),
            status: ModelStatus::Init,
            new_model: !persisted,
            reserved: BTreeSet::new(),
            sub_models: BTreeMap::new(),
        };

        model.apply(record, persisted)?;

        Ok(model)
    }

    /// Replaces the record with `record`, moving related data at attach
    /// paths into sub-models. Reserved keys are kept under `__<key>`.
    fn apply(&mut self, mut record: Record, sync_cache: bool) -> Result<()> {
        if self.status == ModelStatus::Init {
            self.reserved = self.model_type.reserved_names().clone();
            self.status = ModelStatus::Ready;
        }

        let collisions = record
            .keys()
            .filter(|key| self.reserved.contains(*key))
            .cloned()
            .collect::<Vec<_>>();

        for key in collisions {
            if let Some(value) = record.remove(&key) {
                tracing::debug!(
                    model = %self.model_type.name(),
                    key = %key,
                    "escaped reserved key"
                );
                record.insert(format!("__{key}"), value);
            }
        }

        for resolved in self.model_type.edges()? {
            let attach_path = resolved.attach_path();

            let sub_model = match path::get(&record, attach_path) {
                Some(Value::Object(_) | Value::Array(_) | Value::Null) => {
                    path::remove(&mut record, attach_path)
                }
                _ => None,
            };

            let sub_model = match sub_model {
                Some(Value::Object(sub_record)) => {
                    let persisted = has_id(&sub_record, resolved.target.id_key());
                    SubModel::Model(Box::new(Self::hydrate(
                        resolved.target.clone(),
                        sub_record,
                        persisted,
                    )?))
                }
                Some(Value::Array(values)) => SubModel::Set(ModelSet::from_records(
                    resolved.target.clone(),
                    values,
                )?),
                _ => continue,
            };

            self.sub_models.insert(attach_path.to_owned(), sub_model);
        }

        if sync_cache {
            self.cache = record.clone();
        }
        self.record = record;

        Ok(())
    }

    pub fn model_type(&self) -> &Arc<ModelType> {
        &self.model_type
    }

    pub fn id(&self) -> Option<&Value> {
        path::get(&self.record, self.model_type.id_key()).filter(|id| !id.is_null())
    }

    fn require_id(&self) -> Result<Value> {
        self.id()
            .cloned()
            .ok_or_else(|| Error::MissingId(self.model_type.id_key().to_owned()))
    }

    /// The live fields, without related data.
    pub fn record(&self) -> &Record {
        &self.record
    }

    /// The live fields with every sub-model written back at its path.
    pub fn record_with_sub_records(&self) -> Record {
        let mut record = self.record.clone();

        for (path, sub_model) in &self.sub_models {
            path::set(&mut record, path, sub_model.to_value());
        }

        record
    }

    pub fn cache(&self) -> &Record {
        &self.cache
    }

    /// What changed since the last synchronization.
    pub fn delta(&self) -> Delta {
        Delta::between(&self.cache, &self.record)
    }

    /// Whether the model was never persisted, or was removed.
    pub fn is_new(&self) -> bool {
        self.new_model
    }

    pub fn status(&self) -> ModelStatus {
        self.status
    }

    /// Reads `path`: a virtual getter, then a sub-model, then the record.
    pub fn get(&self, path: &str) -> Option<Value> {
        if let Some(get) = self
            .model_type
            .schema()
            .and_then(|schema| schema.get_virtual(path))
            .and_then(|rule| rule.get.clone())
        {
            return Some(get(self));
        }

        if let Some(sub_model) = self.sub_models.get(path) {
            return Some(sub_model.to_value());
        }

        path::get(&self.record, path).cloned()
    }

    /// Writes `path` through its virtual setter, or into the record.
    pub fn set(&mut self, path: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();

        if let Some(rule) = self
            .model_type
            .schema()
            .and_then(|schema| schema.get_virtual(path))
        {
            let set = rule.set.clone().ok_or_else(|| {
                Error::invalid_argument(format!("virtual `{path}` has no setter"))
            })?;

            return set(self, value);
        }

        if self.reserved.contains(path) {
            return Err(Error::ReservedProperty(path.to_owned()));
        }

        path::set(&mut self.record, path, value);
        Ok(())
    }

    pub fn unset(&mut self, path: &str) -> Option<Value> {
        path::remove(&mut self.record, path)
    }

    /// Inserts a new model or updates a persisted one with its delta.
    ///
    /// When the schema has `save` hooks the write runs inside them; pre
    /// handlers receive the record and may replace it.
    pub async fn save(&mut self) -> Result<()> {
        let Some(schema) = self
            .model_type
            .schema()
            .filter(|schema| schema.has_hooks(names::SAVE))
            .cloned()
        else {
            return self.persist().await;
        };

        let args = HookArgs::new(vec![Value::Object(self.record.clone())]);

        schema
            .execute(names::SAVE, args, |mut args| async move {
                match args.take(0) {
                    Value::Object(record) => self.record = record,
                    other => {
                        return Err(Error::invalid_argument(format!(
                            "`save` handlers must leave a record, got `{other}`"
                        )));
                    }
                }

                self.persist().await?;
                Ok(HookArgs::new(vec![Value::Object(self.record.clone())]))
            })
            .await?;

        Ok(())
    }

    async fn persist(&mut self) -> Result<()> {
        if self.new_model {
            let stored = self
                .model_type
                .create_as::<Record>(Value::Object(self.record.clone()), Options::default())
                .await?;

            self.apply(stored, true)?;
            self.new_model = false;

            tracing::debug!(model = %self.model_type.name(), id = ?self.id(), "inserted model");
            return Ok(());
        }

        let delta = self.delta();
        if delta.is_empty() {
            return Ok(());
        }

        let id = self.require_id()?;
        self.model_type
            .update_by_id(id, delta, Options::default())?
            .await?;
        self.cache = self.record.clone();

        Ok(())
    }

    /// Removes the persisted record. The model keeps its fields, loses its
    /// id and becomes new again.
    pub async fn remove(&mut self) -> Result<()> {
        if self.new_model {
            return Err(Error::NewModel("remove"));
        }

        let Some(schema) = self
            .model_type
            .schema()
            .filter(|schema| schema.has_hooks(names::REMOVE))
            .cloned()
        else {
            return self.erase().await;
        };

        let args = HookArgs::new(vec![Value::Object(self.record.clone())]);

        schema
            .execute(names::REMOVE, args, |args| async move {
                self.erase().await?;
                Ok(args)
            })
            .await?;

        Ok(())
    }

    async fn erase(&mut self) -> Result<()> {
        let id = self.require_id()?;

        self.model_type
            .remove_by_id(id, Options::default())?
            .await?;

        path::remove(&mut self.record, self.model_type.id_key());
        self.cache.clear();
        self.new_model = true;

        Ok(())
    }

    /// Reloads the record by id, dropping local changes and sub-models.
    pub async fn reset(&mut self) -> Result<()> {
        let id = self.require_id()?;

        let record = self
            .model_type
            .find_by_id_as::<Record>(id, Options::default())
            .await?
            .ok_or(Error::NotFound)?;

        self.sub_models.clear();
        self.apply(record, true)
    }

    /// A new, unsaved model with a copy of every field and sub-record but
    /// without the id.
    pub fn clone_unattached(&self) -> Result<Self> {
        let mut record = self.record_with_sub_records();
        path::remove(&mut record, self.model_type.id_key());

        Self::hydrate(self.model_type.clone(), record, false)
    }

    /// Calls an instance method declared on the schema.
    pub fn call(&mut self, name: &str, args: &[Value]) -> Result<Value> {
        let method = self
            .model_type
            .schema()
            .and_then(|schema| schema.get_method(name))
            .cloned()
            .ok_or_else(|| {
                Error::invalid_argument(format!(
                    "{} has no method `{name}`",
                    self.model_type.name()
                ))
            })?;

        method(self, args)
    }

    pub fn sub_model(&self, path: &str) -> Option<&SubModel> {
        self.sub_models.get(path)
    }

    pub fn sub_model_mut(&mut self, path: &str) -> Option<&mut SubModel> {
        self.sub_models.get_mut(path)
    }

    pub fn sub_models(&self) -> &BTreeMap<String, SubModel> {
        &self.sub_models
    }

    /// Attaches `sub_model` at `path`, returning what was there before.
    pub fn attach(&mut self, path: impl Into<String>, sub_model: SubModel) -> Option<SubModel> {
        self.sub_models.insert(path.into(), sub_model)
    }

    pub fn detach(&mut self, path: &str) -> Option<SubModel> {
        self.sub_models.remove(path)
    }

    /// Loads the related data at the relation or reference `path` and
    /// attaches it.
    pub async fn load_related(&mut self, path: &str) -> Result<Option<&SubModel>> {
        let model_type = self.model_type.clone();
        let resolved = model_type.resolve(path)?;
        let id_key = model_type.id_key();

        let sub_model = if resolved.lookup_key(&self.record, id_key).is_none() {
            resolved
                .is_plural()
                .then(|| SubModel::Set(ModelSet::new(resolved.target.clone())))
        } else {
            let query = resolved.scoped_query(&self.record, id_key, None);

            if resolved.is_plural() {
                let set = resolved.target.find(query, Options::default()).all().await?;
                Some(SubModel::Set(set))
            } else {
                resolved
                    .target
                    .find_one(query, Options::default())
                    .await?
                    .map(|model| SubModel::Model(Box::new(model)))
            }
        };

        match sub_model {
            Some(sub_model) => {
                self.sub_models.insert(path.to_owned(), sub_model);
            }
            None => {
                self.sub_models.remove(path);
            }
        }

        Ok(self.sub_models.get(path))
    }

    /// Writes `id` into `key_path`, appending to an array when `plural`.
    fn link(&mut self, key_path: &str, id: &Value, plural: bool) {
        if !plural {
            path::set(&mut self.record, key_path, id.clone());
            return;
        }

        match path::get_mut(&mut self.record, key_path) {
            Some(Value::Array(ids)) => {
                if !ids.contains(id) {
                    ids.push(id.clone());
                }
            }
            _ => path::set(&mut self.record, key_path, Value::Array(vec![id.clone()])),
        }
    }

    /// Saves this model together with its sub-models.
    ///
    /// Sub-models at relation paths are saved first and their ids written
    /// into this record's key paths. Then this model is saved. Sub-models
    /// at reference paths come last, after this id is written into their
    /// key path. Stops at the first error.
    pub fn save_all(&mut self) -> BoxFuture<'_, Result<()>> {
        async move {
            let edges = self.model_type.edges()?;

            for resolved in edges.iter().filter(|resolved| resolved.edge == Edge::Relation) {
                let Some(sub_model) = self.sub_models.get_mut(resolved.attach_path()) else {
                    continue;
                };

                sub_model.save_all().await?;

                let ids = sub_model.ids();
                let key = match resolved.descriptor.kind {
                    RelationKind::OneToMany => Value::Array(ids),
                    RelationKind::OneToOne | RelationKind::ManyToOne => {
                        ids.into_iter().next().unwrap_or(Value::Null)
                    }
                };

                path::set(&mut self.record, &resolved.descriptor.key_path, key);
            }

            self.save().await?;
            let id = self.require_id()?;

            for resolved in edges.iter().filter(|resolved| resolved.edge == Edge::Reference) {
                let Some(sub_model) = self.sub_models.get_mut(resolved.attach_path()) else {
                    continue;
                };

                sub_model.link_to(&resolved.descriptor, &id);
                sub_model.save_all().await?;
            }

            Ok(())
        }
        .boxed()
    }

    /// Removes every persisted sub-model, then this model.
    pub fn remove_all(&mut self) -> BoxFuture<'_, Result<()>> {
        async move {
            for sub_model in self.sub_models.values_mut() {
                sub_model.remove_all().await?;
            }

            self.remove().await
        }
        .boxed()
    }

    /// Decodes the record, sub-records included, into an entity struct.
    pub fn decode<E: Entity>(&self) -> Result<E> {
        Ok(serde_json::from_value(Value::Object(
            self.record_with_sub_records(),
        ))?)
    }
}

fn has_id(record: &Record, id_key: &str) -> bool {
    path::get(record, id_key).is_some_and(|id| !id.is_null())
}

impl Serialize for Model {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.record_with_sub_records().serialize(serializer)
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("model_type", &self.model_type.name())
            .field("record", &self.record)
            .field("new_model", &self.new_model)
            .field("sub_models", &self.sub_models)
            .finish_non_exhaustive()
    }
}
