use crate::{Result, driver::IntStream};
use futures_util::{
    FutureExt, TryStreamExt,
    future::{self, BoxFuture},
};
use std::{fmt, future::IntoFuture};

/// Sums the counts reported by a driver. Await it, or call
/// [`count`](Self::count).
pub struct CountStream {
    inner: IntStream,
}

impl CountStream {
    pub(crate) fn new(inner: IntStream) -> Self {
        Self { inner }
    }

    /// Resolves once the driver is done, with the sum of every count it
    /// reported.
    pub async fn count(self) -> Result<u64> {
        self.inner
            .try_fold(0, |total, count| future::ready(Ok(total + count)))
            .await
    }
}

impl IntoFuture for CountStream {
    type Output = Result<u64>;
    type IntoFuture = BoxFuture<'static, Result<u64>>;

    fn into_future(self) -> Self::IntoFuture {
        self.count().boxed()
    }
}

impl fmt::Debug for CountStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CountStream").finish_non_exhaustive()
    }
}
