//! Map and foreach bodies.
//!
//! Both call a [`StageFn`] per item; they differ only in what the function
//! returns. A foreach effect is lifted to a function returning its input, so
//! the same body serves both and `kind` only labels failures.

use crate::compile::CompileContext;
use crate::error::{PipelineError, Result};
use crate::pipeline::Pipeline;
use crate::stage::{Concurrency, Descriptor, Operator, Order, StageFn, StageKind, StageStream};
use futures::StreamExt;
use std::sync::Arc;

pub(crate) struct MapOp<I, O> {
  upstream: Pipeline<I>,
  f: StageFn<I, O>,
  concurrency: Concurrency,
}

impl<I, O> MapOp<I, O> {
  pub(crate) fn new(upstream: Pipeline<I>, f: StageFn<I, O>, concurrency: Concurrency) -> Self {
    Self {
      upstream,
      f,
      concurrency,
    }
  }
}

impl<I: Send + 'static, O: Send + 'static> Operator<O> for MapOp<I, O> {
  fn upstream(&self) -> &dyn Descriptor {
    &self.upstream
  }

  fn compile(&self, ctx: &CompileContext) -> StageStream<O> {
    apply(
      ctx.compile(&self.upstream),
      Arc::clone(&self.f),
      self.concurrency,
      StageKind::Map,
    )
  }
}

/// Calls `f` on every item, with at most `concurrency.width()` calls in flight.
///
/// Upstream failures are forwarded without calling `f`.
pub(crate) fn apply<I, O>(
  upstream: StageStream<I>,
  f: StageFn<I, O>,
  concurrency: Concurrency,
  kind: StageKind,
) -> StageStream<O>
where
  I: Send + 'static,
  O: Send + 'static,
{
  let call = move |item: Result<I>| {
    let f = Arc::clone(&f);
    async move {
      match item {
        Ok(item) => f(item)
          .await
          .map_err(|e| PipelineError::stage_failure(kind, e)),
        Err(error) => Err(error),
      }
    }
  };

  match (concurrency.width(), concurrency.order()) {
    (1, _) => upstream.then(call).boxed(),
    (width, Order::Input) => upstream.map(call).buffered(width).boxed(),
    (width, Order::Completion) => upstream.map(call).buffer_unordered(width).boxed(),
  }
}
