use crate::stage::{Predicate, StageStream};
use futures::StreamExt;

/// Stops after `count` items, or at the first item satisfying `when`.
///
/// The item that trips `when` is dropped and nothing after it is pulled.
/// Failures pass through and do not count towards `count`.
pub(crate) fn apply<T: Send + 'static>(
  mut upstream: StageStream<T>,
  count: Option<usize>,
  when: Option<Predicate<T>>,
) -> StageStream<T> {
  Box::pin(async_stream::stream! {
    let mut emitted = 0usize;
    loop {
      if count.is_some_and(|count| emitted >= count) {
        break;
      }
      let Some(item) = upstream.next().await else {
        break;
      };
      match item {
        Ok(item) => {
          if when.as_ref().is_some_and(|when| when(&item)) {
            break;
          }
          emitted += 1;
          yield Ok(item);
        }
        Err(error) => yield Err(error),
      }
    }
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::PipelineError;
  use futures::stream;
  use std::sync::Arc;
  use std::sync::atomic::{AtomicUsize, Ordering};

  fn counted(items: Vec<i32>, pulls: Arc<AtomicUsize>) -> StageStream<i32> {
    Box::pin(stream::iter(items).map(move |item| {
      pulls.fetch_add(1, Ordering::SeqCst);
      Ok(item)
    }))
  }

  #[tokio::test]
  async fn test_truncate_by_count() {
    let pulls = Arc::new(AtomicUsize::new(0));
    let output: Vec<i32> = apply(counted(vec![1, 2, 3, 4, 5], Arc::clone(&pulls)), Some(2), None)
      .map(|item| item.unwrap())
      .collect()
      .await;

    assert_eq!(output, vec![1, 2]);
    assert_eq!(pulls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_truncate_zero_pulls_nothing() {
    let pulls = Arc::new(AtomicUsize::new(0));
    let output: Vec<i32> = apply(counted(vec![1, 2], Arc::clone(&pulls)), Some(0), None)
      .map(|item| item.unwrap())
      .collect()
      .await;

    assert!(output.is_empty());
    assert_eq!(pulls.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn test_truncate_when_excludes_trigger() {
    let pulls = Arc::new(AtomicUsize::new(0));
    let when: Predicate<i32> = Arc::new(|x| *x > 5);
    let output: Vec<i32> = apply(
      counted(vec![1, 2, 3, 10, 4], Arc::clone(&pulls)),
      None,
      Some(when),
    )
    .map(|item| item.unwrap())
    .collect()
    .await;

    assert_eq!(output, vec![1, 2, 3]);
    assert_eq!(pulls.load(Ordering::SeqCst), 4);
  }

  #[tokio::test]
  async fn test_failures_are_not_counted() {
    let upstream: StageStream<i32> = Box::pin(stream::iter(vec![
      Ok(1),
      Err(PipelineError::SourceReused),
      Ok(2),
      Ok(3),
    ]));
    let output: Vec<_> = apply(upstream, Some(2), None).collect().await;

    assert_eq!(output.len(), 3);
    assert!(matches!(output[0], Ok(1)));
    assert!(output[1].is_err());
    assert!(matches!(output[2], Ok(2)));
  }
}
