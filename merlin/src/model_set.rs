use crate::{Error, Model, ModelType, Options, Record, Result, path};
use futures_util::{FutureExt, future::BoxFuture};
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::{ops::Index, sync::Arc};

/// An ordered collection of models of one type.
#[derive(Debug, Clone)]
pub struct ModelSet {
    model_type: Arc<ModelType>,
    models: Vec<Model>,
}

impl ModelSet {
    pub fn new(model_type: Arc<ModelType>) -> Self {
        Self {
            model_type,
            models: Vec::new(),
        }
    }

    pub(crate) fn from_models(model_type: Arc<ModelType>, models: Vec<Model>) -> Self {
        Self { model_type, models }
    }

    /// Builds a set from plain records. Records carrying an id count as
    /// persisted.
    pub fn from_records(
        model_type: Arc<ModelType>,
        records: impl IntoIterator<Item = Value>,
    ) -> Result<Self> {
        let mut set = Self::new(model_type);

        for record in records {
            set.push_record(record)?;
        }

        Ok(set)
    }

    pub fn model_type(&self) -> &Arc<ModelType> {
        &self.model_type
    }

    /// Appends `model`, which must be of this set's type.
    pub fn push(&mut self, model: Model) -> Result<()> {
        if !Arc::ptr_eq(model.model_type(), &self.model_type) {
            return Err(Error::invalid_argument(format!(
                "cannot add a {} to a set of {}",
                model.model_type().name(),
                self.model_type.name()
            )));
        }

        self.models.push(model);
        Ok(())
    }

    /// Materializes `record` and appends it.
    pub fn push_record(&mut self, record: Value) -> Result<()> {
        let Value::Object(record) = record else {
            return Err(Error::invalid_argument(format!(
                "a record must be an object, got `{record}`"
            )));
        };

        let persisted =
            path::get(&record, self.model_type.id_key()).is_some_and(|id| !id.is_null());
        let model = Model::hydrate(self.model_type.clone(), record, persisted)?;

        self.models.push(model);
        Ok(())
    }

    /// Inserts `record` and appends the stored model.
    pub async fn create(&mut self, record: Value, opts: Options) -> Result<&Model> {
        let model = self.model_type.create(record, opts).await?;
        self.models.push(model);

        let index = self.models.len() - 1;
        Ok(&self.models[index])
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Model> {
        self.models.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Model> {
        self.models.get_mut(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Model> {
        self.models.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Model> {
        self.models.iter_mut()
    }

    pub fn records(&self) -> Vec<Record> {
        self.models.iter().map(|model| model.record().clone()).collect()
    }

    pub fn records_with_sub_records(&self) -> Vec<Record> {
        self.models
            .iter()
            .map(Model::record_with_sub_records)
            .collect()
    }

    /// Replaces the content with models built from `records`.
    pub fn set_records(&mut self, records: impl IntoIterator<Item = Value>) -> Result<()> {
        let replacement = Self::from_records(self.model_type.clone(), records)?;
        self.models = replacement.models;
        Ok(())
    }

    /// Saves every model in order, with its sub-models.
    pub fn save_all(&mut self) -> BoxFuture<'_, Result<()>> {
        async move {
            for model in &mut self.models {
                model.save_all().await?;
            }
            Ok(())
        }
        .boxed()
    }

    /// Removes every persisted model in order, with its sub-models.
    pub fn remove_all(&mut self) -> BoxFuture<'_, Result<()>> {
        async move {
            for model in &mut self.models {
                if !model.is_new() {
                    model.remove_all().await?;
                }
            }
            Ok(())
        }
        .boxed()
    }

    pub fn into_models(self) -> Vec<Model> {
        self.models
    }
}

impl Index<usize> for ModelSet {
    type Output = Model;

    fn index(&self, index: usize) -> &Model {
        &self.models[index]
    }
}

impl IntoIterator for ModelSet {
    type Item = Model;
    type IntoIter = std::vec::IntoIter<Model>;

    fn into_iter(self) -> Self::IntoIter {
        self.models.into_iter()
    }
}

impl<'a> IntoIterator for &'a ModelSet {
    type Item = &'a Model;
    type IntoIter = std::slice::Iter<'a, Model>;

    fn into_iter(self) -> Self::IntoIter {
        self.models.iter()
    }
}

impl Serialize for ModelSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(&self.models)
    }
}
