//! # Fan-in Scheduler
//!
//! Drives several lanes at once and yields their items in completion order.
//!
//! Every live lane has exactly one outstanding request for its next item. When
//! a request completes with an item, the item is yielded and a new request is
//! issued on the same lane; when it completes with the end of the lane, the
//! lane is retired. With `N` lanes there are therefore never more than `N`
//! requests in flight, and a lane never has two requests overlapping.
//!
//! What happens to a failed item depends on where the scheduler sits:
//!
//! - Inside a stage ([`LaneFailure::Forward`]) the failure is an ordinary
//!   item. It is yielded downstream, where a catch stage may absorb it, and
//!   the lane keeps running.
//! - At the top of a concurrent execution ([`LaneFailure::Abort`]) nothing
//!   downstream can recover it. The outstanding requests of every other lane
//!   are dropped and the failure is yielded as [`PipelineError::Lane`].
//!   A [`PipelineError::Deferred`] failure is the exception: it was raised
//!   by a catch stage after its upstream ended, so it is held until every
//!   other lane has retired and only then yielded.

use crate::error::{PipelineError, Result};
use crate::stage::StageStream;
use futures::stream::{FusedStream, FuturesUnordered, StreamFuture};
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use tracing::{debug, trace, warn};

/// What to do with a failed item coming out of a lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LaneFailure {
  Forward,
  Abort,
}

struct Lane<T> {
  index: usize,
  stream: StageStream<T>,
}

impl<T> Stream for Lane<T> {
  type Item = Result<T>;

  fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
    self.stream.as_mut().poll_next(cx)
  }
}

pub(crate) struct FanIn<T> {
  pending: FuturesUnordered<StreamFuture<Lane<T>>>,
  on_failure: LaneFailure,
  // First deferred lane failure, reported once every lane has retired.
  deferred: Option<(usize, PipelineError)>,
  finished: bool,
}

impl<T> FanIn<T> {
  pub(crate) fn new(lanes: Vec<StageStream<T>>, on_failure: LaneFailure) -> Self {
    let pending = lanes
      .into_iter()
      .enumerate()
      .map(|(index, stream)| Lane { index, stream }.into_future())
      .collect();
    Self {
      pending,
      on_failure,
      deferred: None,
      finished: false,
    }
  }
}

impl<T> Stream for FanIn<T> {
  type Item = Result<T>;

  fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
    let this = self.get_mut();
    if this.finished {
      return Poll::Ready(None);
    }

    loop {
      match ready!(this.pending.poll_next_unpin(cx)) {
        None => {
          trace!("all lanes retired");
          this.finished = true;
          return Poll::Ready(this.deferred.take().map(|(lane, error)| {
            debug!(lane, %error, "reporting deferred lane failure");
            Err(PipelineError::Lane {
              lane,
              source: Box::new(error.into_undeferred()),
            })
          }));
        }
        Some((None, lane)) => {
          debug!(lane = lane.index, "lane exhausted");
        }
        Some((Some(Ok(item)), lane)) => {
          trace!(lane = lane.index, "reissuing lane request");
          this.pending.push(lane.into_future());
          return Poll::Ready(Some(Ok(item)));
        }
        Some((Some(Err(error)), lane)) => match this.on_failure {
          LaneFailure::Forward => {
            this.pending.push(lane.into_future());
            return Poll::Ready(Some(Err(error)));
          }
          LaneFailure::Abort if error.is_deferred() => {
            debug!(lane = lane.index, %error, "holding deferred failure until lanes retire");
            if this.deferred.is_none() {
              this.deferred = Some((lane.index, error));
            }
            this.pending.push(lane.into_future());
          }
          LaneFailure::Abort => {
            warn!(
              lane = lane.index,
              cancelled = this.pending.len(),
              %error,
              "lane failed, cancelling remaining lanes"
            );
            this.pending.clear();
            this.finished = true;
            return Poll::Ready(Some(Err(PipelineError::Lane {
              lane: lane.index,
              source: Box::new(error),
            })));
          }
        },
      }
    }
  }
}

impl<T> FusedStream for FanIn<T> {
  fn is_terminated(&self) -> bool {
    self.finished
  }
}
