//! A [`Driver`] backed by `MongoDB`.
//!
//! The model id key is stored as `_id`. Id strings that parse as an
//! [`ObjectId`] are sent as one, and every `ObjectId` read back becomes its
//! hex string.

use super::{Driver, IntStream, RecordStream};
use crate::{Config, Delta, Error, Options, Query, Record, Result};
use async_trait::async_trait;
use futures_util::{
    StreamExt, TryStreamExt,
    future,
    stream::{self, BoxStream},
};
use mongodb::{
    Client, Collection, Database, IndexModel,
    bson::{self, Bson, Document, doc, oid::ObjectId},
};
use serde_json::Value;
use std::sync::{PoisonError, RwLock};

const MONGO_ID: &str = "_id";

pub struct MongoDriver {
    id_key: String,
    client: RwLock<Option<Client>>,
    database: RwLock<Option<Database>>,
}

impl MongoDriver {
    /// A driver for the default id key. Orchestrators configured with another
    /// `id_key` need [`MongoDriver::for_config`].
    pub fn new() -> Self {
        Self::for_config(&Config::default())
    }

    /// A driver that stores `config.id_key` as `_id`.
    pub fn for_config(config: &Config) -> Self {
        Self::with_id_key(config.id_key.clone())
    }

    /// A driver for models whose id lives under `id_key`.
    pub fn with_id_key(id_key: impl Into<String>) -> Self {
        Self {
            id_key: id_key.into(),
            client: RwLock::new(None),
            database: RwLock::new(None),
        }
    }

    pub fn database(&self) -> Result<Database> {
        self.database
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| Error::configuration("the mongodb driver is not connected"))
    }

    fn collection(&self, name: &str) -> Result<Collection<Document>> {
        Ok(self.database()?.collection(name))
    }
}

impl Default for MongoDriver {
    fn default() -> Self {
        Self::new()
    }
}

/// Turns id strings, also inside arrays and operator objects, into
/// [`ObjectId`]s where they parse as one.
fn to_object_ids(value: Bson) -> Bson {
    match value {
        Bson::String(id) => ObjectId::parse_str(&id).map_or(Bson::String(id), Bson::ObjectId),
        Bson::Array(items) => Bson::Array(items.into_iter().map(to_object_ids).collect()),
        Bson::Document(document) => Bson::Document(
            document
                .into_iter()
                .map(|(key, value)| (key, to_object_ids(value)))
                .collect(),
        ),
        other => other,
    }
}

fn from_bson(value: Bson) -> Value {
    match value {
        Bson::ObjectId(id) => Value::String(id.to_hex()),
        Bson::Document(document) => Value::Object(
            document
                .into_iter()
                .map(|(key, value)| (key, from_bson(value)))
                .collect(),
        ),
        Bson::Array(items) => Value::Array(items.into_iter().map(from_bson).collect()),
        other => other.into_relaxed_extjson(),
    }
}

fn from_document(document: Document, id_key: &str) -> Record {
    document
        .into_iter()
        .map(|(key, value)| {
            let key = if key == MONGO_ID { id_key.to_owned() } else { key };
            (key, from_bson(value))
        })
        .collect()
}

/// Converts `record` into a document, storing `id_key` as `_id`.
fn to_document(record: &Record, id_key: &str) -> Result<Document> {
    let mut document = Document::new();

    for (key, value) in record {
        let value = bson::to_bson(value).map_err(Error::driver)?;

        if key == id_key {
            document.insert(MONGO_ID, to_object_ids(value));
        } else {
            document.insert(key.clone(), value);
        }
    }

    Ok(document)
}

fn delta_document(delta: &Delta, id_key: &str) -> Result<Document> {
    let Value::Object(diff) = &delta.diff else {
        return Err(Error::invalid_argument(format!(
            "a delta must be an object, got `{}`",
            delta.diff
        )));
    };

    let mut document = Document::new();

    for (operator, fields) in diff {
        let fields = match fields {
            Value::Object(fields) => Bson::Document(to_document(fields, id_key)?),
            other => bson::to_bson(other).map_err(Error::driver)?,
        };
        document.insert(operator.clone(), fields);
    }

    Ok(document)
}

fn failed<T: Send + 'static>(error: Error) -> BoxStream<'static, Result<T>> {
    stream::once(future::ready(Err(error))).boxed()
}

#[async_trait]
impl Driver for MongoDriver {
    async fn connect(&self, url: &str, opts: &Options) -> Result<()> {
        let client = Client::with_uri_str(url).await.map_err(Error::driver)?;

        let database = match opts.get("database").and_then(Value::as_str) {
            Some(name) => client.database(name),
            None => client.default_database().ok_or_else(|| {
                Error::configuration("no database in the connection string or `database` option")
            })?,
        };

        tracing::debug!(database = database.name(), "connected to mongodb");

        *self.database.write().unwrap_or_else(PoisonError::into_inner) = Some(database);
        *self.client.write().unwrap_or_else(PoisonError::into_inner) = Some(client);

        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.database
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let client = self
            .client
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(client) = client {
            client.shutdown().await;
        }

        Ok(())
    }

    async fn index(&self, collection: &str, _opts: &Options, field_path: &str) -> Result<()> {
        let collection = self.collection(collection)?;

        let field_path = if field_path == self.id_key {
            MONGO_ID
        } else {
            field_path
        };

        collection
            .create_index(IndexModel::builder().keys(doc! { field_path: 1 }).build())
            .await
            .map_err(Error::driver)?;

        Ok(())
    }

    fn count(&self, collection: &str, _opts: &Options, query: &Query) -> IntStream {
        let (collection, filter) = match self
            .collection(collection)
            .and_then(|collection| Ok((collection, to_document(&query.query, &self.id_key)?)))
        {
            Ok(prepared) => prepared,
            Err(error) => return failed(error),
        };

        stream::once(async move {
            collection
                .count_documents(filter)
                .await
                .map_err(Error::driver)
        })
        .boxed()
    }

    fn find(&self, collection: &str, _opts: &Options, query: &Query) -> RecordStream {
        let (collection, filter, sort) = match self.collection(collection).and_then(|collection| {
            let sort = query
                .opts
                .sort
                .as_ref()
                .map(|sort| to_document(sort, &self.id_key))
                .transpose()?;

            Ok((collection, to_document(&query.query, &self.id_key)?, sort))
        }) {
            Ok(prepared) => prepared,
            Err(error) => return failed(error),
        };

        let limit = query.opts.limit;
        let skip = query.opts.skip;
        let id_key = self.id_key.clone();

        stream::once(async move {
            let mut find = collection.find(filter);

            if let Some(limit) = limit {
                find = find.limit(i64::try_from(limit).unwrap_or(i64::MAX));
            }
            if let Some(skip) = skip {
                find = find.skip(skip);
            }
            if let Some(sort) = sort {
                find = find.sort(sort);
            }

            let cursor = find.await.map_err(Error::driver)?;

            Ok::<_, Error>(
                cursor
                    .map_err(Error::driver)
                    .map_ok(move |document| from_document(document, &id_key)),
            )
        })
        .try_flatten()
        .boxed()
    }

    fn insert(&self, collection: &str, _opts: &Options, records: RecordStream) -> RecordStream {
        let collection = match self.collection(collection) {
            Ok(collection) => collection,
            Err(error) => return failed(error),
        };

        let id_key = self.id_key.clone();

        records
            .and_then(move |mut record| {
                let collection = collection.clone();
                let document = to_document(&record, &id_key);
                let id_key = id_key.clone();

                async move {
                    let result = collection
                        .insert_one(document?)
                        .await
                        .map_err(Error::driver)?;

                    record.insert(id_key, from_bson(result.inserted_id));
                    Ok(record)
                }
            })
            .boxed()
    }

    fn update(&self, collection: &str, _opts: &Options, query: &Query, delta: &Delta) -> IntStream {
        let (collection, filter, update) = match self.collection(collection).and_then(|collection| {
            Ok((
                collection,
                to_document(&query.query, &self.id_key)?,
                delta_document(delta, &self.id_key)?,
            ))
        }) {
            Ok(prepared) => prepared,
            Err(error) => return failed(error),
        };

        let single = query.opts.limit == Some(1);

        stream::once(async move {
            let result = if single {
                collection.update_one(filter, update).await
            } else {
                collection.update_many(filter, update).await
            };

            Ok(result.map_err(Error::driver)?.modified_count)
        })
        .boxed()
    }

    fn remove(&self, collection: &str, _opts: &Options, query: &Query) -> IntStream {
        let (collection, filter) = match self
            .collection(collection)
            .and_then(|collection| Ok((collection, to_document(&query.query, &self.id_key)?)))
        {
            Ok(prepared) => prepared,
            Err(error) => return failed(error),
        };

        let single = query.opts.limit == Some(1);

        stream::once(async move {
            let result = if single {
                collection.delete_one(filter).await
            } else {
                collection.delete_many(filter).await
            };

            Ok(result.map_err(Error::driver)?.deleted_count)
        })
        .boxed()
    }
}
