//! # Compiler
//!
//! Turns a descriptor chain into one lazy [`StageStream`]. The upstream is
//! compiled first and the current stage wraps it, so every stage is a plain
//! decorator around the stream below it.
//!
//! A [`CompileContext`] lives for one execution. When the execution has
//! several lanes, every lane is compiled against the same context and the
//! context hands each of them a view of one opened source, so source items are
//! distributed across lanes and never duplicated.
//!
//! The context also collects the cleanup each opened source contributes, for
//! the execution's close registry.

use crate::close::CloseHandler;
use crate::pipeline::Pipeline;
use crate::producer::{Producer, SharedStream, pull_shared, share};
use crate::stage::{Stage, StageKind, StageStream};
use crate::transformers::{catch, filter, map, observe, throttle, truncate};
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::trace;

type OpenedSource = Arc<dyn Any + Send + Sync>;

pub(crate) struct CompileContext {
  shared_sources: bool,
  sources: Mutex<HashMap<usize, OpenedSource>>,
  close_handlers: Mutex<Vec<CloseHandler>>,
}

impl CompileContext {
  /// A context for a single lane. Sources are opened directly.
  pub(crate) fn sequential() -> Self {
    Self {
      shared_sources: false,
      sources: Mutex::new(HashMap::new()),
      close_handlers: Mutex::new(Vec::new()),
    }
  }

  /// A context for several lanes compiled from the same chain.
  pub(crate) fn shared() -> Self {
    Self {
      shared_sources: true,
      sources: Mutex::new(HashMap::new()),
      close_handlers: Mutex::new(Vec::new()),
    }
  }

  fn open_source<T: Send + 'static>(
    &self,
    producer: &Arc<dyn Producer<Output = T>>,
  ) -> StageStream<T> {
    if !self.shared_sources {
      return self.open(producer);
    }

    // The producer is kept alive by the chain for the whole execution, so its
    // address identifies it.
    let key = Arc::as_ptr(producer) as *const () as usize;
    let mut sources = self
      .sources
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner());
    let opened = sources
      .get(&key)
      .and_then(|opened| Arc::clone(opened).downcast().ok());
    let shared: SharedStream<T> = match opened {
      Some(shared) => shared,
      None => {
        trace!("opening shared source");
        let shared = share(self.open(producer));
        sources.insert(key, Arc::clone(&shared) as OpenedSource);
        shared
      }
    };
    pull_shared(shared)
  }

  fn open<T: Send + 'static>(&self, producer: &Arc<dyn Producer<Output = T>>) -> StageStream<T> {
    let stream = producer.produce();
    if let Some(handler) = producer.close_handler() {
      self
        .close_handlers
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .push(handler);
    }
    stream
  }

  /// Cleanup contributed by every source opened through this context.
  pub(crate) fn into_close_handlers(self) -> Vec<CloseHandler> {
    self
      .close_handlers
      .into_inner()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  /// Compiles `pipeline` and everything upstream of it.
  pub(crate) fn compile<T: Send + 'static>(&self, pipeline: &Pipeline<T>) -> StageStream<T> {
    let stage = pipeline.stage();
    trace!(stage = %stage.kind(), "compiling stage");
    match stage {
      Stage::Source(producer) => self.open_source(producer),
      Stage::Map(op) | Stage::Flatten(op) | Stage::Group(op) => op.compile(self),
      Stage::Filter {
        upstream,
        predicate,
      } => filter::apply(self.compile(upstream), Arc::clone(predicate)),
      Stage::ForEach {
        upstream,
        effect,
        concurrency,
      } => map::apply(
        self.compile(upstream),
        Arc::clone(effect),
        *concurrency,
        StageKind::ForEach,
      ),
      Stage::Catch {
        upstream,
        when,
        raise_after_exhaustion,
      } => catch::apply(
        self.compile(upstream),
        Arc::clone(when),
        *raise_after_exhaustion,
      ),
      Stage::Truncate {
        upstream,
        count,
        when,
      } => truncate::apply(self.compile(upstream), *count, when.clone()),
      Stage::Throttle { upstream, interval } => throttle::apply(self.compile(upstream), *interval),
      Stage::Observe {
        upstream,
        observation,
      } => observe::apply(self.compile(upstream), observation.clone()),
    }
  }
}
