use crate::error::PipelineError;
use crate::stage::{ErrorFilter, StageStream};
use futures::StreamExt;
use tracing::trace;

/// Drops failures matching `when` and keeps pulling upstream.
///
/// With `raise_after_exhaustion`, the first dropped failure is yielded once
/// upstream ends, marked as [`PipelineError::Deferred`]. Failures not matching
/// `when` pass through untouched.
pub(crate) fn apply<T: Send + 'static>(
  mut upstream: StageStream<T>,
  when: ErrorFilter,
  raise_after_exhaustion: bool,
) -> StageStream<T> {
  Box::pin(async_stream::stream! {
    let mut deferred = None;
    while let Some(item) = upstream.next().await {
      match item {
        Err(error) if when(error.undeferred()) => {
          trace!(%error, "caught failure");
          if raise_after_exhaustion && deferred.is_none() {
            deferred = Some(error);
          }
        }
        other => yield other,
      }
    }
    if let Some(error) = deferred {
      yield Err(PipelineError::deferred(error));
    }
  })
}
