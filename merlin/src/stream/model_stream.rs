use crate::{Model, ModelSet, ModelType, Record, Result, driver::RecordStream};
use futures_util::{
    FutureExt, Stream, StreamExt, TryStreamExt,
    future::{self, BoxFuture},
    stream::BoxStream,
};
use std::{
    fmt,
    future::IntoFuture,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

/// What a query stream yields: models, or plain records in raw mode.
pub trait Materialize: Sized + Send + 'static {
    type Collection: Send + 'static;

    /// Whether the driver is told it runs in raw mode.
    const RAW: bool;

    fn materialize(model_type: &Arc<ModelType>, record: Record) -> Result<Self>;

    fn collect(model_type: &Arc<ModelType>, items: Vec<Self>) -> Self::Collection;
}

impl Materialize for Model {
    type Collection = ModelSet;

    const RAW: bool = false;

    fn materialize(model_type: &Arc<ModelType>, record: Record) -> Result<Self> {
        model_type.check_reserved(&record)?;
        Model::hydrate(model_type.clone(), record, true)
    }

    fn collect(model_type: &Arc<ModelType>, items: Vec<Self>) -> ModelSet {
        ModelSet::from_models(model_type.clone(), items)
    }
}

impl Materialize for Record {
    type Collection = Vec<Record>;

    const RAW: bool = true;

    fn materialize(model_type: &Arc<ModelType>, record: Record) -> Result<Self> {
        model_type.check_reserved(&record)?;
        Ok(record)
    }

    fn collect(_: &Arc<ModelType>, items: Vec<Self>) -> Vec<Record> {
        items
    }
}

/// A stream of query results.
///
/// Every consuming method takes the stream by value, so a stream is
/// consumed in exactly one way. Awaiting the stream is the same as
/// [`all`](Self::all). Dropping it cancels whatever is still in flight.
pub struct ModelStream<T = Model> {
    model_type: Arc<ModelType>,
    inner: BoxStream<'static, Result<T>>,
}

impl<T: Materialize> ModelStream<T> {
    pub(crate) fn new(model_type: Arc<ModelType>, records: RecordStream) -> Self {
        let target = model_type.clone();

        let inner = records
            .and_then(move |record| future::ready(T::materialize(&target, record)))
            .boxed();

        Self { model_type, inner }
    }

    pub fn model_type(&self) -> &Arc<ModelType> {
        &self.model_type
    }

    /// Calls `f` with every item as it arrives.
    pub async fn for_each(self, mut f: impl FnMut(T) + Send) -> Result<()> {
        self.inner
            .try_for_each(|item| {
                f(item);
                future::ready(Ok(()))
            })
            .await
    }

    /// The first item; the rest of the stream is dropped.
    pub async fn first(mut self) -> Result<Option<T>> {
        self.inner.try_next().await
    }

    /// The item at `index`, counting from zero.
    pub async fn at(mut self, index: usize) -> Result<Option<T>> {
        let mut position = 0;

        while let Some(item) = self.inner.try_next().await? {
            if position == index {
                return Ok(Some(item));
            }
            position += 1;
        }

        Ok(None)
    }

    pub async fn last(mut self) -> Result<Option<T>> {
        let mut last = None;

        while let Some(item) = self.inner.try_next().await? {
            last = Some(item);
        }

        Ok(last)
    }

    /// Every item, collected into a [`ModelSet`] or a `Vec<Record>`.
    pub async fn all(self) -> Result<T::Collection> {
        let Self { model_type, inner } = self;
        let items = inner.try_collect::<Vec<_>>().await?;

        Ok(T::collect(&model_type, items))
    }
}

impl<T> Stream for ModelStream<T> {
    type Item = Result<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl<T: Materialize> IntoFuture for ModelStream<T> {
    type Output = Result<T::Collection>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        self.all().boxed()
    }
}

impl<T> fmt::Debug for ModelStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelStream")
            .field("model", &self.model_type.name())
            .finish_non_exhaustive()
    }
}
