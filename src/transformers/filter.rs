use crate::stage::{Predicate, StageStream};
use futures::StreamExt;
use futures::future;

/// Keeps items satisfying `predicate`. Failures always pass through.
pub(crate) fn apply<T: Send + 'static>(
  upstream: StageStream<T>,
  predicate: Predicate<T>,
) -> StageStream<T> {
  upstream
    .filter(move |item| {
      future::ready(match item {
        Ok(item) => predicate(item),
        Err(_) => true,
      })
    })
    .boxed()
}
