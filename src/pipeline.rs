//! # Pipeline Builder
//!
//! [`Pipeline<T>`] is a cheap, cloneable handle on an immutable descriptor
//! chain. Every combinator returns a new handle whose upstream is the receiver,
//! so a shared prefix can feed several different pipelines:
//!
//! ```rust
//! use lazyweave::Pipeline;
//!
//! let numbers = Pipeline::from_iter(1..=10);
//! let evens = numbers.filter(|x| x % 2 == 0);
//! let squares = numbers.map(|x| x * x);
//! # let _ = (evens, squares);
//! ```
//!
//! Nothing runs until the chain is compiled with [`Pipeline::sequential`],
//! [`Pipeline::concurrent`] or [`Pipeline::execute`]. Invalid parameters are
//! rejected when the combinator is called, never while iterating.

use crate::close::{CloseHandler, close_handler};
use crate::config::ExecutionConfig;
use crate::error::{BoxError, PipelineError, Result};
use crate::executable::Executable;
use crate::producer::{FnProducer, IterProducer, Producer, StreamProducer, TryFnProducer};
use crate::stage::{Concurrency, Descriptor, Grouping, Stage, StageFn, StageKind};
use crate::transformers::flatten::{FlattenOp, NestedStream};
use crate::transformers::group::GroupOp;
use crate::transformers::map::MapOp;
use crate::transformers::observe::Observation;
use crate::transformers::throttle;
use futures::future::{self, FutureExt};
use futures::{Future, Stream, StreamExt};
use std::fmt;
use std::sync::Arc;

/// Handle on an immutable chain of stages producing items of type `T`.
pub struct Pipeline<T> {
  stage: Arc<Stage<T>>,
  close_handlers: Arc<Vec<CloseHandler>>,
}

impl<T> Clone for Pipeline<T> {
  fn clone(&self) -> Self {
    Self {
      stage: Arc::clone(&self.stage),
      close_handlers: Arc::clone(&self.close_handlers),
    }
  }
}

impl<T: Send + 'static> fmt::Debug for Pipeline<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Pipeline")
      .field("stages", &self.stage_kinds())
      .field("close_handlers", &self.close_handlers.len())
      .finish()
  }
}

impl<T: Send + 'static> Descriptor for Pipeline<T> {
  fn kind(&self) -> StageKind {
    self.stage.kind()
  }

  fn upstream(&self) -> Option<&dyn Descriptor> {
    self.stage.upstream()
  }
}

fn lift<I, O, F>(f: F) -> StageFn<I, O>
where
  F: Fn(I) -> std::result::Result<O, BoxError> + Send + Sync + 'static,
  O: Send + 'static,
{
  Arc::new(move |item| future::ready(f(item)).boxed())
}

fn lift_async<I, O, E, F, Fut>(f: F) -> StageFn<I, O>
where
  F: Fn(I) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = std::result::Result<O, E>> + Send + 'static,
  E: Into<BoxError>,
{
  Arc::new(move |item| {
    f(item)
      .map(|result| result.map_err(Into::<BoxError>::into))
      .boxed()
  })
}

fn effect_async<T, E, F, Fut>(f: F) -> StageFn<T, T>
where
  T: Clone + Send + 'static,
  F: Fn(T) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = std::result::Result<(), E>> + Send + 'static,
  E: Into<BoxError>,
{
  Arc::new(move |item: T| {
    let effect = f(item.clone());
    async move {
      effect.await.map_err(Into::<BoxError>::into)?;
      Ok::<T, BoxError>(item)
    }
    .boxed()
  })
}

impl<T: Send + 'static> Pipeline<T> {
  fn root(stage: Stage<T>) -> Self {
    Self {
      stage: Arc::new(stage),
      close_handlers: Arc::new(Vec::new()),
    }
  }

  fn wrap<U>(&self, stage: Stage<U>) -> Pipeline<U> {
    Pipeline {
      stage: Arc::new(stage),
      close_handlers: Arc::clone(&self.close_handlers),
    }
  }

  /// Wraps any [`Producer`] as the source of a new pipeline.
  pub fn from_source<P>(producer: P) -> Self
  where
    P: Producer<Output = T>,
  {
    Self::root(Stage::Source(Arc::new(producer)))
  }

  /// Source over a re-iterable collection.
  #[allow(clippy::should_implement_trait)]
  pub fn from_iter<I>(items: I) -> Self
  where
    I: IntoIterator<Item = T> + Clone + Send + Sync + 'static,
    I::IntoIter: Send + 'static,
  {
    Self::from_source(IterProducer::new(items))
  }

  /// Source over a fresh stream built by `factory` for every execution.
  pub fn from_fn<F, S>(factory: F) -> Self
  where
    F: Fn() -> S + Send + Sync + 'static,
    S: Stream<Item = T> + Send + 'static,
  {
    Self::from_source(FnProducer::new(factory))
  }

  /// Source over a fallible stream; `Err` items become
  /// [`PipelineError::Source`] failures.
  pub fn from_try_fn<F, S, E>(factory: F) -> Self
  where
    F: Fn() -> S + Send + Sync + 'static,
    S: Stream<Item = std::result::Result<T, E>> + Send + 'static,
    E: Into<BoxError>,
  {
    Self::from_source(TryFnProducer::new(factory))
  }

  /// Source over a single stream. Only the first execution sees its items.
  pub fn from_stream<S>(stream: S) -> Self
  where
    S: Stream<Item = T> + Send + 'static,
  {
    Self::from_source(StreamProducer::new(stream))
  }

  pub(crate) fn stage(&self) -> &Stage<T> {
    &self.stage
  }

  pub(crate) fn close_handlers(&self) -> &[CloseHandler] {
    &self.close_handlers
  }

  /// Kind of the tip stage.
  pub fn kind(&self) -> StageKind {
    self.stage.kind()
  }

  /// Kinds of every stage in the chain, source first.
  pub fn stage_kinds(&self) -> Vec<StageKind> {
    let mut kinds = Vec::new();
    let mut current: Option<&dyn Descriptor> = Some(self);
    while let Some(descriptor) = current {
      kinds.push(descriptor.kind());
      current = descriptor.upstream();
    }
    kinds.reverse();
    kinds
  }

  /// Registers a cleanup callback run when an execution of this pipeline
  /// closes.
  ///
  /// Every execution gets a fresh close registry, so the callback runs once
  /// per execution: executing the same pipeline twice runs it twice.
  pub fn on_close<F, E>(&self, handler: F) -> Self
  where
    F: Fn() -> std::result::Result<(), E> + Send + Sync + 'static,
    E: Into<BoxError>,
  {
    let mut handlers = self.close_handlers.as_ref().clone();
    handlers.push(close_handler(handler));
    Self {
      stage: Arc::clone(&self.stage),
      close_handlers: Arc::new(handlers),
    }
  }

  /// Applies `f` to every item.
  pub fn map<U, F>(&self, f: F) -> Pipeline<U>
  where
    U: Send + 'static,
    F: Fn(T) -> U + Send + Sync + 'static,
  {
    self.map_with(lift(move |item| Ok(f(item))), Concurrency::serial())
  }

  /// Applies a fallible `f` to every item. Failures become
  /// [`PipelineError::Stage`] items.
  pub fn try_map<U, E, F>(&self, f: F) -> Pipeline<U>
  where
    U: Send + 'static,
    E: Into<BoxError>,
    F: Fn(T) -> std::result::Result<U, E> + Send + Sync + 'static,
  {
    self.map_with(
      lift(move |item| f(item).map_err(Into::into)),
      Concurrency::serial(),
    )
  }

  /// Applies an asynchronous, fallible `f` to every item, one call at a time.
  pub fn map_async<U, E, F, Fut>(&self, f: F) -> Pipeline<U>
  where
    U: Send + 'static,
    E: Into<BoxError>,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<U, E>> + Send + 'static,
  {
    self.map_with(lift_async(f), Concurrency::serial())
  }

  /// Applies an asynchronous, fallible `f` with up to `concurrency.width()`
  /// calls in flight.
  pub fn map_concurrent<U, E, F, Fut>(&self, concurrency: Concurrency, f: F) -> Result<Pipeline<U>>
  where
    U: Send + 'static,
    E: Into<BoxError>,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<U, E>> + Send + 'static,
  {
    let concurrency = concurrency.validate(StageKind::Map)?;
    Ok(self.map_with(lift_async(f), concurrency))
  }

  fn map_with<U: Send + 'static>(&self, f: StageFn<T, U>, concurrency: Concurrency) -> Pipeline<U> {
    self.wrap(Stage::Map(Arc::new(MapOp::new(self.clone(), f, concurrency))))
  }

  /// Runs `f` on every item for its side effect and forwards the item.
  pub fn foreach<F>(&self, f: F) -> Self
  where
    F: Fn(&T) + Send + Sync + 'static,
  {
    self.foreach_with(
      lift(move |item| {
        f(&item);
        Ok(item)
      }),
      Concurrency::serial(),
    )
  }

  /// Runs a fallible `f` on every item and forwards the item if it succeeds.
  pub fn try_foreach<E, F>(&self, f: F) -> Self
  where
    E: Into<BoxError>,
    F: Fn(&T) -> std::result::Result<(), E> + Send + Sync + 'static,
  {
    self.foreach_with(
      lift(move |item| f(&item).map(|()| item).map_err(Into::into)),
      Concurrency::serial(),
    )
  }

  /// Runs an asynchronous effect on every item, one call at a time.
  pub fn foreach_async<E, F, Fut>(&self, f: F) -> Self
  where
    T: Clone,
    E: Into<BoxError>,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<(), E>> + Send + 'static,
  {
    self.foreach_with(effect_async(f), Concurrency::serial())
  }

  /// Runs an asynchronous effect with up to `concurrency.width()` calls in
  /// flight.
  pub fn foreach_concurrent<E, F, Fut>(&self, concurrency: Concurrency, f: F) -> Result<Self>
  where
    T: Clone,
    E: Into<BoxError>,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<(), E>> + Send + 'static,
  {
    let concurrency = concurrency.validate(StageKind::ForEach)?;
    Ok(self.foreach_with(effect_async(f), concurrency))
  }

  fn foreach_with(&self, effect: StageFn<T, T>, concurrency: Concurrency) -> Self {
    self.wrap(Stage::ForEach {
      upstream: self.clone(),
      effect,
      concurrency,
    })
  }

  /// Keeps only the items satisfying `predicate`.
  pub fn filter<F>(&self, predicate: F) -> Self
  where
    F: Fn(&T) -> bool + Send + Sync + 'static,
  {
    self.wrap(Stage::Filter {
      upstream: self.clone(),
      predicate: Arc::new(predicate),
    })
  }

  /// Drops failures matching `when` and keeps pulling.
  pub fn catch<F>(&self, when: F) -> Self
  where
    F: Fn(&PipelineError) -> bool + Send + Sync + 'static,
  {
    self.catch_with(when, false)
  }

  /// Drops failures matching `when`, keeps pulling, and raises the first of
  /// them once upstream is exhausted.
  pub fn catch_deferred<F>(&self, when: F) -> Self
  where
    F: Fn(&PipelineError) -> bool + Send + Sync + 'static,
  {
    self.catch_with(when, true)
  }

  fn catch_with<F>(&self, when: F, raise_after_exhaustion: bool) -> Self
  where
    F: Fn(&PipelineError) -> bool + Send + Sync + 'static,
  {
    self.wrap(Stage::Catch {
      upstream: self.clone(),
      when: Arc::new(when),
      raise_after_exhaustion,
    })
  }

  /// Concatenates items that are themselves collections.
  pub fn flatten(&self) -> Pipeline<T::Item>
  where
    T: IntoIterator,
    T::IntoIter: Send + 'static,
    T::Item: Send + 'static,
  {
    self.flatten_with(open_iter::<T>(), 1)
  }

  /// Drains up to `width` collections at a time, yielding in completion order.
  pub fn flatten_concurrent(&self, width: usize) -> Result<Pipeline<T::Item>>
  where
    T: IntoIterator,
    T::IntoIter: Send + 'static,
    T::Item: Send + 'static,
  {
    let width = Concurrency::unordered(width)
      .validate(StageKind::Flatten)?
      .width();
    Ok(self.flatten_with(open_iter::<T>(), width))
  }

  /// Concatenates items that are themselves streams.
  pub fn flatten_streams(&self) -> Pipeline<T::Item>
  where
    T: Stream,
    T::Item: Send + 'static,
  {
    self.flatten_with(open_stream::<T>(), 1)
  }

  /// Drains up to `width` streams at a time, yielding in completion order.
  pub fn flatten_streams_concurrent(&self, width: usize) -> Result<Pipeline<T::Item>>
  where
    T: Stream,
    T::Item: Send + 'static,
  {
    let width = Concurrency::unordered(width)
      .validate(StageKind::Flatten)?
      .width();
    Ok(self.flatten_with(open_stream::<T>(), width))
  }

  fn flatten_with<U: Send + 'static>(
    &self,
    open: Arc<dyn Fn(T) -> NestedStream<U> + Send + Sync>,
    width: usize,
  ) -> Pipeline<U> {
    self.wrap(Stage::Flatten(Arc::new(FlattenOp::new(
      self.clone(),
      open,
      width,
    ))))
  }

  /// Batches items according to `grouping`.
  pub fn group(&self, grouping: Grouping<T>) -> Result<Pipeline<Vec<T>>> {
    let grouping = grouping.validate()?;
    Ok(self.wrap(Stage::Group(Arc::new(GroupOp::new(
      self.clone(),
      grouping,
    )))))
  }

  /// Stops after `count` items.
  pub fn truncate(&self, count: usize) -> Self {
    self.wrap(Stage::Truncate {
      upstream: self.clone(),
      count: Some(count),
      when: None,
    })
  }

  /// Stops at the first item satisfying `predicate`, excluding that item.
  pub fn truncate_when<F>(&self, predicate: F) -> Self
  where
    F: Fn(&T) -> bool + Send + Sync + 'static,
  {
    self.wrap(Stage::Truncate {
      upstream: self.clone(),
      count: None,
      when: Some(Arc::new(predicate)),
    })
  }

  /// Yields at most `frequency` items per second.
  pub fn throttle(&self, frequency: f64) -> Result<Self> {
    let interval = throttle::interval_for(frequency)?;
    Ok(self.wrap(Stage::Throttle {
      upstream: self.clone(),
      interval,
    }))
  }

  /// Same as [`Pipeline::throttle`].
  pub fn slow(&self, frequency: f64) -> Result<Self> {
    self.throttle(frequency)
  }

  /// Counts the items and failures passing through into `observation`.
  pub fn observe(&self, observation: &Observation) -> Self {
    self.wrap(Stage::Observe {
      upstream: self.clone(),
      observation: observation.clone(),
    })
  }

  /// Compiles the chain into one lazy, strictly ordered sequence.
  pub fn sequential(&self) -> Executable<T> {
    Executable::sequential(self)
  }

  /// Compiles the chain into `width` independent lanes sharing the source.
  ///
  /// Items are yielded in completion order, not source order. Every lane runs
  /// its own copy of each stage, so per-stage state such as group buffers,
  /// truncate counters and throttle timers is per lane.
  pub fn concurrent(&self, width: usize) -> Result<Executable<T>> {
    self.execute(&ExecutionConfig::concurrent(width))
  }

  /// Compiles the chain as described by `config`.
  pub fn execute(&self, config: &ExecutionConfig) -> Result<Executable<T>> {
    Executable::open(self, config)
  }
}

fn open_iter<T>() -> Arc<dyn Fn(T) -> NestedStream<T::Item> + Send + Sync>
where
  T: IntoIterator,
  T::IntoIter: Send + 'static,
  T::Item: Send + 'static,
{
  Arc::new(|collection: T| futures::stream::iter(collection).boxed())
}

fn open_stream<T>() -> Arc<dyn Fn(T) -> NestedStream<T::Item> + Send + Sync>
where
  T: Stream + Send + 'static,
  T::Item: Send + 'static,
{
  Arc::new(|stream: T| stream.boxed())
}
