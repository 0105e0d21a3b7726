use crate::error::{PipelineError, Result};
use crate::stage::{StageKind, StageStream};
use futures::StreamExt;
use std::time::Duration;
use tokio::time::{Instant, sleep_until};

/// Minimum spacing between items for a rate of `frequency` items per second.
pub(crate) fn interval_for(frequency: f64) -> Result<Duration> {
  if !frequency.is_finite() || frequency <= 0.0 {
    return Err(PipelineError::config(
      StageKind::Throttle,
      format!("frequency must be a positive number of items per second, got {frequency}"),
    ));
  }
  Duration::try_from_secs_f64(frequency.recip())
    .map_err(|e| PipelineError::config(StageKind::Throttle, e.to_string()))
}

/// Delays items so that consecutive ones are at least `interval` apart.
///
/// The first item is not delayed. Failures are forwarded immediately.
pub(crate) fn apply<T: Send + 'static>(
  mut upstream: StageStream<T>,
  interval: Duration,
) -> StageStream<T> {
  Box::pin(async_stream::stream! {
    let mut last: Option<Instant> = None;
    while let Some(item) = upstream.next().await {
      if item.is_ok() {
        if let Some(last) = last {
          sleep_until(last + interval).await;
        }
        last = Some(Instant::now());
      }
      yield item;
    }
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use futures::stream;

  #[test]
  fn test_interval_for_valid_frequency() {
    assert_eq!(interval_for(4.0).unwrap(), Duration::from_millis(250));
    assert_eq!(interval_for(0.5).unwrap(), Duration::from_secs(2));
  }

  #[test]
  fn test_interval_for_rejects_invalid_frequency() {
    for frequency in [0.0, -1.0, f64::NAN, f64::INFINITY] {
      let error = interval_for(frequency).unwrap_err();
      assert!(error.is_config());
      assert_eq!(error.stage_kind(), Some(StageKind::Throttle));
    }
  }

  #[test]
  fn test_interval_for_rejects_unrepresentable_interval() {
    assert!(interval_for(f64::MIN_POSITIVE).is_err());
  }

  #[tokio::test(start_paused = true)]
  async fn test_throttle_spaces_items() {
    let start = Instant::now();
    let input: StageStream<i32> = Box::pin(stream::iter((1..=4).map(Ok)));
    let stamps: Vec<(i32, Duration)> = apply(input, Duration::from_millis(100))
      .map(|item| (item.unwrap(), start.elapsed()))
      .collect()
      .await;

    let values: Vec<i32> = stamps.iter().map(|(value, _)| *value).collect();
    assert_eq!(values, vec![1, 2, 3, 4]);
    assert_eq!(stamps[0].1, Duration::ZERO);
    for pair in stamps.windows(2) {
      assert!(pair[1].1 - pair[0].1 >= Duration::from_millis(100));
    }
  }

  #[tokio::test(start_paused = true)]
  async fn test_throttle_does_not_delay_slow_upstream() {
    let start = Instant::now();
    let input: StageStream<i32> = Box::pin(async_stream::stream! {
      for i in 0..3 {
        tokio::time::sleep(Duration::from_millis(500)).await;
        yield Ok(i);
      }
    });
    let output: Vec<i32> = apply(input, Duration::from_millis(100))
      .map(|item| item.unwrap())
      .collect()
      .await;

    assert_eq!(output, vec![0, 1, 2]);
    assert_eq!(start.elapsed(), Duration::from_millis(1500));
  }
}
