//! Flatten body.
//!
//! Every upstream item is opened into a nested stream which is drained before
//! the next upstream item is pulled. With a width above one, that loop runs in
//! several lanes sharing the upstream: whenever a lane finishes its nested
//! stream it pulls the next unopened one, so at most `width` nested streams
//! are open at a time and their items come out in completion order.

use crate::compile::CompileContext;
use crate::fan_in::{FanIn, LaneFailure};
use crate::pipeline::Pipeline;
use crate::producer::{pull_shared, share};
use crate::stage::{Descriptor, Operator, StageStream};
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;

/// An opened nested sequence.
pub(crate) type NestedStream<U> = Pin<Box<dyn Stream<Item = U> + Send>>;

pub(crate) type Open<T, U> = Arc<dyn Fn(T) -> NestedStream<U> + Send + Sync>;

pub(crate) struct FlattenOp<T, U> {
  upstream: Pipeline<T>,
  open: Open<T, U>,
  width: usize,
}

impl<T, U> FlattenOp<T, U> {
  pub(crate) fn new(upstream: Pipeline<T>, open: Open<T, U>, width: usize) -> Self {
    Self {
      upstream,
      open,
      width,
    }
  }
}

impl<T: Send + 'static, U: Send + 'static> Operator<U> for FlattenOp<T, U> {
  fn upstream(&self) -> &dyn Descriptor {
    &self.upstream
  }

  fn compile(&self, ctx: &CompileContext) -> StageStream<U> {
    apply(
      ctx.compile(&self.upstream),
      Arc::clone(&self.open),
      self.width,
    )
  }
}

pub(crate) fn apply<T, U>(upstream: StageStream<T>, open: Open<T, U>, width: usize) -> StageStream<U>
where
  T: Send + 'static,
  U: Send + 'static,
{
  if width <= 1 {
    return drain(upstream, open);
  }
  let shared = share(upstream);
  let lanes = (0..width)
    .map(|_| drain(pull_shared(Arc::clone(&shared)), Arc::clone(&open)))
    .collect();
  Box::pin(FanIn::new(lanes, LaneFailure::Forward))
}

fn drain<T, U>(mut upstream: StageStream<T>, open: Open<T, U>) -> StageStream<U>
where
  T: Send + 'static,
  U: Send + 'static,
{
  Box::pin(async_stream::stream! {
    while let Some(item) = upstream.next().await {
      match item {
        Ok(nested) => {
          let mut nested = open(nested);
          while let Some(item) = nested.next().await {
            yield Ok(item);
          }
        }
        Err(error) => yield Err(error),
      }
    }
  })
}
