//! The storage contract.
//!
//! A driver moves records in and out of named collections. It sees queries
//! and deltas as plain value objects and knows nothing about model types,
//! hooks or relations.

#[cfg(feature = "mongodb")]
pub mod mongo;

use crate::{Delta, Options, Query, Record, Result};
use async_trait::async_trait;
use futures_util::stream::BoxStream;

pub type RecordStream = BoxStream<'static, Result<Record>>;
pub type IntStream = BoxStream<'static, Result<u64>>;

#[async_trait]
pub trait Driver: Send + Sync + 'static {
    async fn connect(&self, url: &str, opts: &Options) -> Result<()>;

    async fn disconnect(&self) -> Result<()>;

    async fn index(&self, collection: &str, opts: &Options, field_path: &str) -> Result<()>;

    fn count(&self, collection: &str, opts: &Options, query: &Query) -> IntStream;

    fn find(&self, collection: &str, opts: &Options, query: &Query) -> RecordStream;

    /// Inserts every record of `records` and yields them as stored,
    /// including generated ids.
    fn insert(&self, collection: &str, opts: &Options, records: RecordStream) -> RecordStream;

    /// Yields the number of updated records.
    fn update(&self, collection: &str, opts: &Options, query: &Query, delta: &Delta) -> IntStream;

    /// Yields the number of removed records.
    fn remove(&self, collection: &str, opts: &Options, query: &Query) -> IntStream;
}
