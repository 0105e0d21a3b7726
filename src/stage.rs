//! # Operator Descriptors
//!
//! A pipeline is an immutable chain of descriptors. Each descriptor is one
//! [`Stage`] holding its kind-specific parameters and a shared reference to the
//! descriptor upstream of it. Combinators never mutate a descriptor; they wrap
//! the receiver in a new one. The same chain can therefore be compiled any
//! number of times, once per execution or once per concurrent lane.
//!
//! Stages whose output type differs from their input type (map, flatten,
//! group) keep the upstream behind the erased [`Operator`] trait so that
//! [`Stage`] stays a closed sum type compiled by one exhaustive `match`.

use crate::compile::CompileContext;
use crate::error::{BoxError, PipelineError, Result};
use crate::pipeline::Pipeline;
use crate::producer::Producer;
use crate::transformers::observe::Observation;
use futures::Stream;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// The compiled form of any stage: a lazy stream of items or per-item failures.
///
/// A failure item does not end the stream; the executable decides when to stop.
pub type StageStream<T> = Pin<Box<dyn Stream<Item = Result<T>> + Send>>;

/// A stage function under the uniform "may suspend" call contract.
pub(crate) type StageFn<I, O> =
  Arc<dyn Fn(I) -> BoxFuture<'static, std::result::Result<O, BoxError>> + Send + Sync>;

/// A synchronous item predicate.
pub(crate) type Predicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// A predicate selecting which failures a catch stage absorbs.
pub(crate) type ErrorFilter = Arc<dyn Fn(&PipelineError) -> bool + Send + Sync>;

/// Tag identifying what a descriptor does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
  /// The data source at the root of the chain.
  Source,
  /// One-to-one transformation.
  Map,
  /// Drops items failing a predicate.
  Filter,
  /// Runs an effect and forwards the original item.
  ForEach,
  /// Absorbs matching failures.
  Catch,
  /// Concatenates nested sequences.
  Flatten,
  /// Batches items by count, time window and key.
  Group,
  /// Stops after a count or at a predicate.
  Truncate,
  /// Enforces a minimum spacing between items.
  Throttle,
  /// Counts items for progress reporting.
  Observe,
}

impl fmt::Display for StageKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      StageKind::Source => "source",
      StageKind::Map => "map",
      StageKind::Filter => "filter",
      StageKind::ForEach => "foreach",
      StageKind::Catch => "catch",
      StageKind::Flatten => "flatten",
      StageKind::Group => "group",
      StageKind::Truncate => "truncate",
      StageKind::Throttle => "throttle",
      StageKind::Observe => "observe",
    };
    f.write_str(name)
  }
}

/// Whether a concurrent stage yields in input order or completion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Order {
  /// Results are re-sequenced into the order their inputs were pulled.
  Input,
  /// Results are yielded as soon as they complete.
  Completion,
}

/// Concurrency of a map or foreach stage.
///
/// At most `width` stage-function calls are in flight at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Concurrency {
  width: usize,
  order: Order,
}

impl Concurrency {
  /// One call at a time.
  pub fn serial() -> Self {
    Self {
      width: 1,
      order: Order::Input,
    }
  }

  /// Up to `width` calls in flight, results re-sequenced into input order.
  pub fn ordered(width: usize) -> Self {
    Self {
      width,
      order: Order::Input,
    }
  }

  /// Up to `width` calls in flight, results yielded in completion order.
  pub fn unordered(width: usize) -> Self {
    Self {
      width,
      order: Order::Completion,
    }
  }

  /// Maximum number of calls in flight.
  pub fn width(&self) -> usize {
    self.width
  }

  /// Output ordering.
  pub fn order(&self) -> Order {
    self.order
  }

  pub(crate) fn validate(self, stage: StageKind) -> Result<Self> {
    if self.width == 0 {
      return Err(PipelineError::config(
        stage,
        "concurrency width must be at least 1",
      ));
    }
    Ok(self)
  }
}

impl Default for Concurrency {
  fn default() -> Self {
    Self::serial()
  }
}

/// Parameters of a group stage.
///
/// A batch is emitted when it reaches `size` items, when `interval` has elapsed
/// since its first item was buffered, or when an item's key differs from the
/// key of the items already buffered, whichever happens first.
pub struct Grouping<T> {
  pub(crate) size: Option<usize>,
  pub(crate) interval: Option<Duration>,
  pub(crate) same_key: Option<Arc<dyn Fn(&T, &T) -> bool + Send + Sync>>,
}

impl<T> Grouping<T> {
  /// Batches of up to `size` items.
  pub fn by_size(size: usize) -> Self {
    Self {
      size: Some(size),
      interval: None,
      same_key: None,
    }
  }

  /// Batches spanning at most `interval` from their first item.
  pub fn by_interval(interval: Duration) -> Self {
    Self {
      size: None,
      interval: Some(interval),
      same_key: None,
    }
  }

  /// Sets the maximum batch size.
  pub fn with_size(mut self, size: usize) -> Self {
    self.size = Some(size);
    self
  }

  /// Sets the maximum time window of a batch.
  pub fn with_interval(mut self, interval: Duration) -> Self {
    self.interval = Some(interval);
    self
  }

  /// Only consecutive items with equal keys share a batch.
  pub fn keyed<K, F>(mut self, key: F) -> Self
  where
    T: 'static,
    K: PartialEq + 'static,
    F: Fn(&T) -> K + Send + Sync + 'static,
  {
    self.same_key = Some(Arc::new(move |a: &T, b: &T| key(a) == key(b)));
    self
  }

  pub(crate) fn validate(self) -> Result<Self> {
    match (self.size, self.interval) {
      (Some(0), _) => Err(PipelineError::config(
        StageKind::Group,
        "group size must be at least 1",
      )),
      (_, Some(interval)) if interval.is_zero() => Err(PipelineError::config(
        StageKind::Group,
        "group interval must be positive",
      )),
      (None, None) => Err(PipelineError::config(
        StageKind::Group,
        "group needs a size or an interval",
      )),
      _ => Ok(self),
    }
  }
}

impl<T> Clone for Grouping<T> {
  fn clone(&self) -> Self {
    Self {
      size: self.size,
      interval: self.interval,
      same_key: self.same_key.clone(),
    }
  }
}

impl<T> fmt::Debug for Grouping<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Grouping")
      .field("size", &self.size)
      .field("interval", &self.interval)
      .field("keyed", &self.same_key.is_some())
      .finish()
  }
}

/// Read-only view of a descriptor, independent of its item type.
pub trait Descriptor: Send + Sync {
  /// What this descriptor does.
  fn kind(&self) -> StageKind;
  /// The descriptor this one pulls from, `None` for a source.
  fn upstream(&self) -> Option<&dyn Descriptor>;
}

/// A type-changing stage with its upstream erased.
pub(crate) trait Operator<T>: Send + Sync {
  fn upstream(&self) -> &dyn Descriptor;
  fn compile(&self, ctx: &CompileContext) -> StageStream<T>;
}

/// One pipeline stage and its upstream.
pub(crate) enum Stage<T> {
  Source(Arc<dyn Producer<Output = T>>),
  Map(Arc<dyn Operator<T>>),
  Filter {
    upstream: Pipeline<T>,
    predicate: Predicate<T>,
  },
  ForEach {
    upstream: Pipeline<T>,
    effect: StageFn<T, T>,
    concurrency: Concurrency,
  },
  Catch {
    upstream: Pipeline<T>,
    when: ErrorFilter,
    raise_after_exhaustion: bool,
  },
  Flatten(Arc<dyn Operator<T>>),
  Group(Arc<dyn Operator<T>>),
  Truncate {
    upstream: Pipeline<T>,
    count: Option<usize>,
    when: Option<Predicate<T>>,
  },
  Throttle {
    upstream: Pipeline<T>,
    interval: Duration,
  },
  Observe {
    upstream: Pipeline<T>,
    observation: Observation,
  },
}

impl<T> Stage<T> {
  pub(crate) fn kind(&self) -> StageKind {
    match self {
      Stage::Source(_) => StageKind::Source,
      Stage::Map(_) => StageKind::Map,
      Stage::Filter { .. } => StageKind::Filter,
      Stage::ForEach { .. } => StageKind::ForEach,
      Stage::Catch { .. } => StageKind::Catch,
      Stage::Flatten(_) => StageKind::Flatten,
      Stage::Group(_) => StageKind::Group,
      Stage::Truncate { .. } => StageKind::Truncate,
      Stage::Throttle { .. } => StageKind::Throttle,
      Stage::Observe { .. } => StageKind::Observe,
    }
  }

  pub(crate) fn upstream(&self) -> Option<&dyn Descriptor>
  where
    T: Send + 'static,
  {
    match self {
      Stage::Source(_) => None,
      Stage::Map(op) | Stage::Flatten(op) | Stage::Group(op) => Some(op.upstream()),
      Stage::Filter { upstream, .. }
      | Stage::ForEach { upstream, .. }
      | Stage::Catch { upstream, .. }
      | Stage::Truncate { upstream, .. }
      | Stage::Throttle { upstream, .. }
      | Stage::Observe { upstream, .. } => Some(upstream as &dyn Descriptor),
    }
  }
}
