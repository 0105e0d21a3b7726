//! # Producers
//!
//! A [`Producer`] is the data source at the root of a pipeline. Each execution
//! opens the producer once and every lane of that execution pulls from the same
//! opened stream, one `next()` at a time, so no source item is ever delivered
//! twice.
//!
//! Built-in producers cover the common cases:
//!
//! - [`IterProducer`]: a re-iterable in-memory collection.
//! - [`FnProducer`]: a factory returning a fresh stream per execution.
//! - [`TryFnProducer`]: like [`FnProducer`], for streams of `Result`s.
//! - [`StreamProducer`]: a single stream that can only be executed once.

use crate::close::CloseHandler;
use crate::error::{BoxError, PipelineError};
use crate::stage::StageStream;
use futures::stream::{self, Fuse};
use futures::{Stream, StreamExt};
use std::sync::{Arc, Mutex};

/// Trait for the data source at the root of a pipeline.
///
/// `produce` is called once per execution and must return a fresh stream.
/// A producer owning a resource such as a file or a socket releases it from
/// [`Producer::close_handler`].
/// Per-item failures are reported as `Err` items; they flow through the
/// pipeline like stage failures and can be caught.
pub trait Producer: Send + Sync + 'static {
  /// The type of the items produced.
  type Output: Send + 'static;

  /// Opens a new stream of items.
  fn produce(&self) -> StageStream<Self::Output>;

  /// Cleanup for the stream returned by the last call to `produce`.
  ///
  /// Called once each time the producer is opened. The handler joins the close
  /// registry of that execution and runs exactly once with it, however many
  /// lanes share the opened stream.
  fn close_handler(&self) -> Option<CloseHandler> {
    None
  }
}

/// Produces the items of a cloneable collection.
#[derive(Debug, Clone)]
pub struct IterProducer<I> {
  items: I,
}

impl<I> IterProducer<I> {
  /// Creates a producer that iterates a clone of `items` on every execution.
  pub fn new(items: I) -> Self {
    Self { items }
  }
}

impl<I> Producer for IterProducer<I>
where
  I: IntoIterator + Clone + Send + Sync + 'static,
  I::IntoIter: Send + 'static,
  I::Item: Send + 'static,
{
  type Output = I::Item;

  fn produce(&self) -> StageStream<Self::Output> {
    Box::pin(stream::iter(self.items.clone()).map(Ok))
  }
}

/// Produces the items of a stream built by a factory.
pub struct FnProducer<F> {
  factory: F,
}

impl<F> FnProducer<F> {
  /// Creates a producer calling `factory` on every execution.
  pub fn new(factory: F) -> Self {
    Self { factory }
  }
}

impl<F, S> Producer for FnProducer<F>
where
  F: Fn() -> S + Send + Sync + 'static,
  S: Stream + Send + 'static,
  S::Item: Send + 'static,
{
  type Output = S::Item;

  fn produce(&self) -> StageStream<Self::Output> {
    Box::pin((self.factory)().map(Ok))
  }
}

/// Produces the items of a fallible stream built by a factory.
pub struct TryFnProducer<F> {
  factory: F,
}

impl<F> TryFnProducer<F> {
  /// Creates a producer calling `factory` on every execution.
  pub fn new(factory: F) -> Self {
    Self { factory }
  }
}

impl<F, S, T, E> Producer for TryFnProducer<F>
where
  F: Fn() -> S + Send + Sync + 'static,
  S: Stream<Item = Result<T, E>> + Send + 'static,
  T: Send + 'static,
  E: Into<BoxError>,
{
  type Output = T;

  fn produce(&self) -> StageStream<Self::Output> {
    Box::pin(
      (self.factory)().map(|item| item.map_err(|e| PipelineError::source_failure(e.into()))),
    )
  }
}

/// Produces the items of one stream, for a single execution.
///
/// Executing the pipeline a second time yields [`PipelineError::SourceReused`].
pub struct StreamProducer<T> {
  stream: Mutex<Option<StageStream<T>>>,
}

impl<T: Send + 'static> StreamProducer<T> {
  /// Wraps `stream`.
  pub fn new<S>(stream: S) -> Self
  where
    S: Stream<Item = T> + Send + 'static,
  {
    Self {
      stream: Mutex::new(Some(Box::pin(stream.map(Ok)))),
    }
  }
}

impl<T: Send + 'static> Producer for StreamProducer<T> {
  type Output = T;

  fn produce(&self) -> StageStream<T> {
    let taken = self
      .stream
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
      .take();
    match taken {
      Some(stream) => stream,
      None => Box::pin(stream::once(async { Err(PipelineError::SourceReused) })),
    }
  }
}

/// An opened source shared by every lane of one execution.
pub(crate) type SharedStream<T> = Arc<tokio::sync::Mutex<Fuse<StageStream<T>>>>;

/// Makes `stream` pullable from several lanes.
///
/// The stream is fused so lanes arriving after exhaustion keep seeing the end.
pub(crate) fn share<T: Send + 'static>(stream: StageStream<T>) -> SharedStream<T> {
  Arc::new(tokio::sync::Mutex::new(stream.fuse()))
}

/// A lane's view of a shared stream.
///
/// Only the `next()` call is serialised; whatever the lane does with the item
/// runs concurrently with the other lanes.
pub(crate) fn pull_shared<T: Send + 'static>(shared: SharedStream<T>) -> StageStream<T> {
  Box::pin(async_stream::stream! {
    loop {
      let next = {
        let mut source = shared.lock().await;
        source.next().await
      };
      match next {
        Some(item) => yield item,
        None => break,
      }
    }
  })
}
