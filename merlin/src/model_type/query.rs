//! The static query surface: find, count, insert, update, remove, index.

use super::ModelType;
use crate::{
    Delta, Entity, Error, Filter, Model, Options, Query, Record, Result, Update,
    driver::{IntStream, RecordStream},
    hook_hub::{HookArgs, names},
    stream::{CountStream, Materialize, ModelStream, populate},
};
use futures_util::{
    Stream, StreamExt, TryStreamExt,
    stream::{self, BoxStream},
};
use serde_json::Value;
use std::{fmt::Display, sync::Arc};

fn into_record(value: Value) -> Result<Record> {
    match value {
        Value::Object(record) => Ok(record),
        other => Err(Error::invalid_argument(format!(
            "expected an object, got `{other}`"
        ))),
    }
}

fn limit_one(filter: Value) -> Result<Value> {
    let mut filter = into_record(filter)?;
    filter.insert("$limit".into(), Value::from(1));
    Ok(Value::Object(filter))
}

fn check_id(id: Value) -> Result<Value> {
    if id.is_string() || id.is_number() {
        Ok(id)
    } else {
        Err(Error::invalid_argument(format!(
            "an id must be a string or a number, got `{id}`"
        )))
    }
}

impl ModelType {
    fn by_id(&self, id: impl Into<Value>) -> Result<Value> {
        let mut filter = Record::new();
        filter.insert(self.id_key().to_owned(), check_id(id.into())?);
        Ok(Value::Object(filter))
    }

    /// Emits `query` and then the `before` hook, reading back whatever the
    /// handlers changed.
    async fn before_query(
        &self,
        before: &'static str,
        query: Query,
        opts: Options,
    ) -> Result<(Query, Options)> {
        let mut args = self
            .hooks
            .emit_async(names::QUERY, HookArgs::new(vec![query.to_value()]))
            .await?;
        let query = Query::from_hook_value(args.take(0))?;

        let mut args = self
            .hooks
            .emit_async(before, HookArgs::new(vec![query.to_value(), opts.to_value()]))
            .await?;

        Ok((
            Query::from_hook_value(args.take(0))?,
            Options::from_hook_value(args.take(1))?,
        ))
    }

    /// Runs the `after` hook once per record, in stream order.
    fn after_each_record(
        self: &Arc<Self>,
        after: &'static str,
        records: RecordStream,
        opts: &Options,
    ) -> RecordStream {
        let model_type = self.clone();
        let opts = opts.to_value();

        records
            .and_then(move |record| {
                let model_type = model_type.clone();
                let args = HookArgs::new(vec![Value::Object(record), opts.clone()]);

                async move {
                    tracing::trace!(model = %model_type.name, hook = after, "record hook");
                    let mut args = model_type.hooks.emit_async(after, args).await?;
                    into_record(args.take(0))
                }
            })
            .boxed()
    }

    /// Runs the `after` hook once per count, in stream order.
    fn after_each_count(
        self: &Arc<Self>,
        after: &'static str,
        counts: IntStream,
        opts: &Options,
    ) -> IntStream {
        let model_type = self.clone();
        let opts = opts.to_value();

        counts
            .and_then(move |count| {
                let model_type = model_type.clone();
                let args = HookArgs::new(vec![Value::from(count), opts.clone()]);

                async move {
                    let mut args = model_type.hooks.emit_async(after, args).await?;
                    args.take(0).as_u64().ok_or_else(|| {
                        Error::invalid_argument(format!("`{after}` handlers must leave a count"))
                    })
                }
            })
            .boxed()
    }

    async fn find_records(self: Arc<Self>, filter: Value, opts: Options) -> Result<RecordStream> {
        let driver = self.driver()?;
        let mut filter = into_record(filter)?;
        let sub_queries = self.strip_sub_queries(&mut filter)?;

        let (query, opts) = self
            .before_query(names::BEFORE_FIND, Query::new(Value::Object(filter))?, opts)
            .await?;

        tracing::debug!(
            model = %self.name,
            collection = %self.collection_name,
            query = ?query,
            sub_queries = sub_queries.len(),
            "find"
        );

        let records = driver.find(&self.collection_name, &opts, &query);
        let records = self.after_each_record(names::AFTER_FIND, records, &opts);

        if sub_queries.is_empty() || !self.config.auto_populate_by_query {
            return Ok(records);
        }

        Ok(populate::populate(self, records, sub_queries))
    }

    /// Finds records matching `query`, materialized as `T`.
    ///
    /// Objects (or `true`) at relation paths of the filter are sub-queries:
    /// they are removed from the filter sent to the driver and used to
    /// populate related records instead.
    pub fn find_as<T: Materialize>(
        self: &Arc<Self>,
        query: impl Filter,
        opts: Options,
    ) -> ModelStream<T> {
        let opts = Options {
            raw_mode: T::RAW,
            ..opts
        };
        let filter = query.to_filter();
        let model_type = self.clone();

        let records = stream::once(model_type.find_records(filter, opts))
            .try_flatten()
            .boxed();

        ModelStream::new(self.clone(), records)
    }

    pub fn find(self: &Arc<Self>, query: impl Filter, opts: Options) -> ModelStream<Model> {
        self.find_as(query, opts)
    }

    /// Every record of the collection.
    pub fn all(self: &Arc<Self>, opts: Options) -> ModelStream<Model> {
        self.find(Value::Object(Record::new()), opts)
    }

    /// The first record matching `query`. The driver sees a limit of one.
    pub async fn find_one_as<T: Materialize>(
        self: &Arc<Self>,
        query: impl Filter,
        opts: Options,
    ) -> Result<Option<T>> {
        let filter = limit_one(query.to_filter())?;
        self.find_as(filter, opts).first().await
    }

    pub async fn find_one(
        self: &Arc<Self>,
        query: impl Filter,
        opts: Options,
    ) -> Result<Option<Model>> {
        self.find_one_as(query, opts).await
    }

    pub async fn find_by_id_as<T: Materialize>(
        self: &Arc<Self>,
        id: impl Into<Value>,
        opts: Options,
    ) -> Result<Option<T>> {
        let filter = self.by_id(id)?;
        self.find_one_as(filter, opts).await
    }

    pub async fn find_by_id(
        self: &Arc<Self>,
        id: impl Into<Value>,
        opts: Options,
    ) -> Result<Option<Model>> {
        self.find_by_id_as(id, opts).await
    }

    /// Finds records and decodes them into entity structs.
    pub async fn find_entities<E: Entity>(
        self: &Arc<Self>,
        query: impl Filter,
        opts: Options,
    ) -> Result<Vec<E>> {
        self.find_as::<Record>(query, opts)
            .all()
            .await?
            .into_iter()
            .map(|record| Ok(serde_json::from_value(Value::Object(record))?))
            .collect()
    }

    pub fn count(self: &Arc<Self>, query: impl Filter, opts: Options) -> CountStream {
        let model_type = self.clone();
        let filter = query.to_filter();

        let counts = stream::once(async move {
            let driver = model_type.driver()?;
            let query = Query::new(filter)?;
            let (query, opts) = model_type
                .before_query(names::BEFORE_COUNT, query, opts)
                .await?;

            tracing::debug!(model = %model_type.name, query = ?query, "count");

            let counts = driver.count(&model_type.collection_name, &opts, &query);
            Ok::<_, Error>(model_type.after_each_count(names::AFTER_COUNT, counts, &opts))
        })
        .try_flatten()
        .boxed();

        CountStream::new(counts)
    }

    async fn prepare_insert(&self, mut record: Record, opts: &Options) -> Result<Record> {
        if self.config.prune_sub_records {
            self.strip_sub_records(&mut record)?;
        }

        self.apply_defaults(&mut record);

        if let Some(schema) = self.validating_schema(opts) {
            schema.validate(&record)?;
        }

        let mut args = self
            .hooks
            .emit_async(
                names::BEFORE_INSERT,
                HookArgs::new(vec![Value::Object(record), opts.to_value()]),
            )
            .await?;

        into_record(args.take(0))
    }

    fn insert_records<T: Materialize>(
        self: &Arc<Self>,
        records: BoxStream<'static, Result<Record>>,
        opts: Options,
    ) -> ModelStream<T> {
        let opts = Options {
            raw_mode: T::RAW,
            ..opts
        };
        let model_type = self.clone();

        let inserted = stream::once(async move {
            let driver = model_type.driver()?;

            let prepared = {
                let model_type = model_type.clone();
                let opts = opts.clone();

                records
                    .and_then(move |record| {
                        let model_type = model_type.clone();
                        let opts = opts.clone();
                        async move { model_type.prepare_insert(record, &opts).await }
                    })
                    .boxed()
            };

            tracing::debug!(
                model = %model_type.name,
                collection = %model_type.collection_name,
                "insert"
            );

            let inserted = driver.insert(&model_type.collection_name, &opts, prepared);
            Ok::<_, Error>(model_type.after_each_record(names::AFTER_INSERT, inserted, &opts))
        })
        .try_flatten()
        .boxed();

        ModelStream::new(self.clone(), inserted)
    }

    /// Inserts `records` one by one: sub-records are pruned, defaults
    /// applied and the schema checked before the driver sees a record.
    pub fn insert_as<T: Materialize>(
        self: &Arc<Self>,
        records: impl IntoIterator<Item = Value>,
        opts: Options,
    ) -> ModelStream<T> {
        let records = records.into_iter().map(into_record).collect::<Vec<_>>();
        self.insert_records(stream::iter(records).boxed(), opts)
    }

    pub fn insert(
        self: &Arc<Self>,
        records: impl IntoIterator<Item = Value>,
        opts: Options,
    ) -> ModelStream<Model> {
        self.insert_as(records, opts)
    }

    pub fn insert_stream<T: Materialize>(
        self: &Arc<Self>,
        records: impl Stream<Item = Record> + Send + 'static,
        opts: Options,
    ) -> ModelStream<T> {
        self.insert_records(records.map(Ok).boxed(), opts)
    }

    /// Inserts a single record and returns it as stored.
    pub async fn create_as<T: Materialize>(
        self: &Arc<Self>,
        record: Value,
        opts: Options,
    ) -> Result<T> {
        self.insert_as(Some(record), opts)
            .first()
            .await?
            .ok_or(Error::NotFound)
    }

    pub async fn create(self: &Arc<Self>, record: Value, opts: Options) -> Result<Model> {
        self.create_as(record, opts).await
    }

    pub async fn create_entity<E: Entity>(
        self: &Arc<Self>,
        entity: &E,
        opts: Options,
    ) -> Result<Model> {
        self.create(serde_json::to_value(entity)?, opts).await
    }

    /// Updates every record matching `query` with `delta`.
    ///
    /// Fails right away, without touching the driver, when `query` embeds
    /// sub-queries.
    pub fn update(
        self: &Arc<Self>,
        query: impl Filter,
        delta: impl Update,
        opts: Options,
    ) -> Result<CountStream> {
        let mut filter = into_record(query.to_filter())?;

        if !self.strip_sub_queries(&mut filter)?.is_empty() {
            return Err(Error::SubQuery("update"));
        }

        let query = Query::new(Value::Object(filter))?;
        let delta = Delta::new(delta.to_update())?;
        let model_type = self.clone();

        let counts = stream::once(async move {
            let driver = model_type.driver()?;

            let mut args = model_type
                .hooks
                .emit_async(
                    names::BEFORE_UPDATE,
                    HookArgs::new(vec![query.to_value(), delta.diff, opts.to_value()]),
                )
                .await?;

            let query = Query::from_hook_value(args.take(0))?;
            let delta = Delta::new(args.take(1))?;
            let opts = Options::from_hook_value(args.take(2))?;

            if let Some(schema) = model_type.validating_schema(&opts) {
                schema.validate_partial(&delta.patch())?;
            }

            tracing::debug!(
                model = %model_type.name,
                query = ?query,
                delta = ?delta.diff,
                "update"
            );

            let counts = driver.update(&model_type.collection_name, &opts, &query, &delta);
            Ok::<_, Error>(model_type.after_each_count(names::AFTER_UPDATE, counts, &opts))
        })
        .try_flatten()
        .boxed();

        Ok(CountStream::new(counts))
    }

    pub fn update_one(
        self: &Arc<Self>,
        query: impl Filter,
        delta: impl Update,
        opts: Options,
    ) -> Result<CountStream> {
        self.update(limit_one(query.to_filter())?, delta, opts)
    }

    pub fn update_by_id(
        self: &Arc<Self>,
        id: impl Into<Value>,
        delta: impl Update,
        opts: Options,
    ) -> Result<CountStream> {
        self.update_one(self.by_id(id)?, delta, opts)
    }

    /// Removes every record matching `query`.
    ///
    /// Fails right away, without touching the driver, when `query` embeds
    /// sub-queries.
    pub fn remove(self: &Arc<Self>, query: impl Filter, opts: Options) -> Result<CountStream> {
        let mut filter = into_record(query.to_filter())?;

        if !self.strip_sub_queries(&mut filter)?.is_empty() {
            return Err(Error::SubQuery("remove"));
        }

        let query = Query::new(Value::Object(filter))?;
        let model_type = self.clone();

        let counts = stream::once(async move {
            let driver = model_type.driver()?;
            let (query, opts) = model_type
                .before_query(names::BEFORE_REMOVE, query, opts)
                .await?;

            tracing::debug!(model = %model_type.name, query = ?query, "remove");

            let counts = driver.remove(&model_type.collection_name, &opts, &query);
            Ok::<_, Error>(model_type.after_each_count(names::AFTER_REMOVE, counts, &opts))
        })
        .try_flatten()
        .boxed();

        Ok(CountStream::new(counts))
    }

    pub fn remove_one(self: &Arc<Self>, query: impl Filter, opts: Options) -> Result<CountStream> {
        self.remove(limit_one(query.to_filter())?, opts)
    }

    pub fn remove_by_id(
        self: &Arc<Self>,
        id: impl Into<Value>,
        opts: Options,
    ) -> Result<CountStream> {
        self.remove_one(self.by_id(id)?, opts)
    }

    /// Asks the driver to index `field_path`.
    pub async fn index(&self, field_path: impl Display, opts: Options) -> Result<()> {
        let field_path = field_path.to_string();
        let driver = self.driver()?;

        let mut args = self
            .hooks
            .emit_async(
                names::INDEX,
                HookArgs::new(vec![Value::from(field_path), opts.to_value()]),
            )
            .await?;

        let field_path = args
            .take(0)
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| Error::invalid_argument("`index` handlers must leave a field path"))?;
        let opts = Options::from_hook_value(args.take(1))?;

        tracing::debug!(model = %self.name, field_path = %field_path, "index");

        driver.index(&self.collection_name, &opts, &field_path).await
    }
}
