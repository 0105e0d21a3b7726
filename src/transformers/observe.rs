//! Observe body.
//!
//! Forwards items unchanged while counting them into an [`Observation`]. One
//! observation is shared by every lane of an execution, so its counters report
//! totals for the whole pipeline. Progress is logged at `info` level when a
//! counter reaches a power of two, and once when an observed lane ends.

use crate::error::Result;
use crate::stage::StageStream;
use futures::Stream;
use pin_project::pin_project;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll, ready};
use tracing::info;

struct Counters {
  label: String,
  yields: AtomicUsize,
  errors: AtomicUsize,
}

/// Shared progress counters for an observe stage.
#[derive(Clone)]
pub struct Observation {
  counters: Arc<Counters>,
}

impl Observation {
  /// Creates zeroed counters reported under `label`.
  pub fn new(label: impl Into<String>) -> Self {
    Self {
      counters: Arc::new(Counters {
        label: label.into(),
        yields: AtomicUsize::new(0),
        errors: AtomicUsize::new(0),
      }),
    }
  }

  /// Label used in log records.
  pub fn label(&self) -> &str {
    &self.counters.label
  }

  /// Items seen so far.
  pub fn yields(&self) -> usize {
    self.counters.yields.load(Ordering::Relaxed)
  }

  /// Failures seen so far.
  pub fn errors(&self) -> usize {
    self.counters.errors.load(Ordering::Relaxed)
  }
}

impl fmt::Debug for Observation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Observation")
      .field("label", &self.label())
      .field("yields", &self.yields())
      .field("errors", &self.errors())
      .finish()
  }
}

#[pin_project]
struct Observed<S> {
  #[pin]
  inner: S,
  observation: Observation,
  done: bool,
}

impl<S, T> Stream for Observed<S>
where
  S: Stream<Item = Result<T>>,
{
  type Item = Result<T>;

  fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
    let this = self.project();
    let next = ready!(this.inner.poll_next(cx));
    let counters = &this.observation.counters;
    match &next {
      Some(Ok(_)) => {
        let yields = counters.yields.fetch_add(1, Ordering::Relaxed) + 1;
        if yields.is_power_of_two() {
          info!(
            label = %counters.label,
            yields,
            errors = counters.errors.load(Ordering::Relaxed),
            "observed"
          );
        }
      }
      Some(Err(_)) => {
        let errors = counters.errors.fetch_add(1, Ordering::Relaxed) + 1;
        if errors.is_power_of_two() {
          info!(
            label = %counters.label,
            yields = counters.yields.load(Ordering::Relaxed),
            errors,
            "observed"
          );
        }
      }
      None if !*this.done => {
        *this.done = true;
        info!(
          label = %counters.label,
          yields = counters.yields.load(Ordering::Relaxed),
          errors = counters.errors.load(Ordering::Relaxed),
          "observed stream finished"
        );
      }
      None => {}
    }
    Poll::Ready(next)
  }
}

pub(crate) fn apply<T: Send + 'static>(
  upstream: StageStream<T>,
  observation: Observation,
) -> StageStream<T> {
  Box::pin(Observed {
    inner: upstream,
    observation,
    done: false,
  })
}
