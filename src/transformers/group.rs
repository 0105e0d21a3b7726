//! Group body.
//!
//! Buffers items into batches. A batch is flushed when it reaches its size,
//! when its time window closes, when a keyed item does not match the batch,
//! before an upstream failure is forwarded, and at the end of upstream.

use crate::compile::CompileContext;
use crate::pipeline::Pipeline;
use crate::stage::{Descriptor, Grouping, Operator, StageStream};
use futures::StreamExt;
use tokio::time::{Instant, timeout_at};
use tracing::trace;

pub(crate) struct GroupOp<T> {
  upstream: Pipeline<T>,
  grouping: Grouping<T>,
}

impl<T> GroupOp<T> {
  pub(crate) fn new(upstream: Pipeline<T>, grouping: Grouping<T>) -> Self {
    Self { upstream, grouping }
  }
}

impl<T: Send + 'static> Operator<Vec<T>> for GroupOp<T> {
  fn upstream(&self) -> &dyn Descriptor {
    &self.upstream
  }

  fn compile(&self, ctx: &CompileContext) -> StageStream<Vec<T>> {
    apply(ctx.compile(&self.upstream), self.grouping.clone())
  }
}

pub(crate) fn apply<T: Send + 'static>(
  mut upstream: StageStream<T>,
  grouping: Grouping<T>,
) -> StageStream<Vec<T>> {
  let Grouping {
    size,
    interval,
    same_key,
  } = grouping;

  Box::pin(async_stream::stream! {
    let mut batch: Vec<T> = Vec::new();
    // Set while the batch is non-empty and a window is configured.
    let mut deadline: Option<Instant> = None;

    loop {
      let next = match deadline {
        Some(at) => match timeout_at(at, upstream.next()).await {
          Ok(next) => next,
          Err(_) => {
            trace!(len = batch.len(), "group window closed");
            deadline = None;
            yield Ok(std::mem::take(&mut batch));
            continue;
          }
        },
        None => upstream.next().await,
      };

      match next {
        None => break,
        Some(Err(error)) => {
          if !batch.is_empty() {
            deadline = None;
            yield Ok(std::mem::take(&mut batch));
          }
          yield Err(error);
        }
        Some(Ok(item)) => {
          let key_changed = match (&same_key, batch.last()) {
            (Some(same_key), Some(last)) => !same_key(last, &item),
            _ => false,
          };
          if key_changed {
            trace!(len = batch.len(), "group key changed");
            deadline = None;
            yield Ok(std::mem::take(&mut batch));
          }
          if batch.is_empty() {
            deadline = interval.map(|interval| Instant::now() + interval);
          }
          batch.push(item);
          if size.is_some_and(|size| batch.len() >= size) {
            deadline = None;
            yield Ok(std::mem::take(&mut batch));
          }
        }
      }
    }

    if !batch.is_empty() {
      yield Ok(batch);
    }
  })
}
