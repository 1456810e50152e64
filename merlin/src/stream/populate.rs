//! Attaches related records to every record of a find.

use crate::{
    ModelType, Options, Record, Result,
    driver::RecordStream,
    path,
    relation::Resolved,
};
use futures_util::{StreamExt, TryStreamExt, future};
use serde_json::Value;
use std::sync::Arc;

/// Wraps `records` so that each one leaves with every relation and
/// reference of `model_type` attached. `sub_queries` maps attach paths to
/// extra filters for the lookup at that path.
///
/// Records keep their order. The lookups of one record run concurrently and
/// the first failure drops the others.
pub(crate) fn populate(
    model_type: Arc<ModelType>,
    records: RecordStream,
    sub_queries: Record,
) -> RecordStream {
    let sub_queries = Arc::new(sub_queries);

    records
        .and_then(move |record| {
            let model_type = model_type.clone();
            let sub_queries = sub_queries.clone();

            async move { populate_record(&model_type, record, &sub_queries).await }
        })
        .boxed()
}

async fn populate_record(
    model_type: &ModelType,
    mut record: Record,
    sub_queries: &Record,
) -> Result<Record> {
    let edges = model_type.edges()?;
    let id_key = model_type.id_key();

    let lookups = edges.iter().map(|resolved| {
        let sub_query = match sub_queries.get(resolved.attach_path()) {
            Some(Value::Object(sub_query)) => Some(sub_query),
            _ => None,
        };

        lookup(resolved, &record, id_key, sub_query)
    });

    let related = future::try_join_all(lookups).await?;

    for (resolved, value) in edges.iter().zip(related) {
        path::set(&mut record, resolved.attach_path(), value);
    }

    Ok(record)
}

async fn lookup(
    resolved: &Resolved,
    record: &Record,
    id_key: &str,
    sub_query: Option<&Record>,
) -> Result<Value> {
    if resolved.lookup_key(record, id_key).is_none() {
        return Ok(if resolved.is_plural() {
            Value::Array(Vec::new())
        } else {
            Value::Null
        });
    }

    let query = resolved.scoped_query(record, id_key, sub_query);

    tracing::debug!(
        target_model = %resolved.target.name(),
        path = %resolved.attach_path(),
        query = %query,
        "populate"
    );

    if resolved.is_plural() {
        let records = resolved
            .target
            .find_as::<Record>(query, Options::default())
            .all()
            .await?;

        Ok(Value::Array(records.into_iter().map(Value::Object).collect()))
    } else {
        let record = resolved
            .target
            .find_one_as::<Record>(query, Options::default())
            .await?;

        Ok(record.map_or(Value::Null, Value::Object))
    }
}
