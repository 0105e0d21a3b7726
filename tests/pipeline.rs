use futures::StreamExt;
use lazyweave::{
  Grouping, Observation, Pipeline, PipelineError, Producer, Pull, StageKind, StageStream,
};
use proptest::prelude::*;
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
  let _ = tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .with_test_writer()
    .try_init();
}

#[derive(Debug)]
struct ZeroDivision;

impl fmt::Display for ZeroDivision {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "division by zero")
  }
}

impl Error for ZeroDivision {}

// A producer that counts how many items were actually pulled from it.
struct CountingProducer {
  items: Vec<i32>,
  pulled: Arc<AtomicUsize>,
}

impl Producer for CountingProducer {
  type Output = i32;

  fn produce(&self) -> StageStream<i32> {
    let pulled = Arc::clone(&self.pulled);
    Box::pin(futures::stream::iter(self.items.clone()).map(move |item| {
      pulled.fetch_add(1, Ordering::SeqCst);
      Ok(item)
    }))
  }
}

#[tokio::test]
async fn test_group_emits_final_partial_batch() {
  init_tracing();
  let batches = Pipeline::from_iter(vec![1, 2, 3, 4, 5])
    .group(Grouping::by_size(2))
    .unwrap()
    .sequential()
    .collect_all()
    .await
    .unwrap();

  assert_eq!(batches, vec![vec![1, 2], vec![3, 4], vec![5]]);
}

#[tokio::test]
async fn test_truncate_when_excludes_trigger_and_stops_pulling() {
  init_tracing();
  let pulled = Arc::new(AtomicUsize::new(0));
  let output = Pipeline::from_source(CountingProducer {
    items: vec![1, 2, 3, 10, 4],
    pulled: Arc::clone(&pulled),
  })
  .truncate_when(|x| *x > 5)
  .sequential()
  .collect_all()
  .await
  .unwrap();

  assert_eq!(output, vec![1, 2, 3]);
  assert_eq!(pulled.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_catch_with_raise_after_exhaustion() {
  init_tracing();
  let mut executable = Pipeline::from_iter(vec![1, 0, 2])
    .try_map(|x: i32| {
      if x == 0 {
        Err(ZeroDivision)
      } else {
        Ok(10.0 / f64::from(x))
      }
    })
    .catch_deferred(|error| error.is::<ZeroDivision>())
    .sequential();

  assert!(matches!(executable.pull().await, Pull::Item(x) if x == 10.0));
  assert!(matches!(executable.pull().await, Pull::Item(x) if x == 5.0));
  match executable.pull().await {
    Pull::Failed(error) => {
      assert!(error.is::<ZeroDivision>());
      assert_eq!(error.stage_kind(), Some(StageKind::Map));
    }
    other => panic!("expected the deferred failure, got {other:?}"),
  }
  assert!(matches!(executable.pull().await, Pull::Failed(_)));
}

#[tokio::test]
async fn test_full_chain_with_observation() {
  init_tracing();
  let observation = Observation::new("words");
  let output = Pipeline::from_iter(vec!["a b", "", "c d e", "f"])
    .map(|line: &str| line.split_whitespace().map(str::to_owned).collect::<Vec<_>>())
    .flatten()
    .observe(&observation)
    .filter(|word| word != "d")
    .group(Grouping::by_size(2))
    .unwrap()
    .sequential()
    .collect_all()
    .await
    .unwrap();

  assert_eq!(
    output,
    vec![
      vec!["a".to_string(), "b".to_string()],
      vec!["c".to_string(), "e".to_string()],
      vec!["f".to_string()],
    ]
  );
  assert_eq!(observation.yields(), 6);
  assert_eq!(observation.errors(), 0);
}

#[tokio::test]
async fn test_unrecovered_failure_stops_consumption() {
  init_tracing();
  let pulled = Arc::new(AtomicUsize::new(0));
  let result = Pipeline::from_source(CountingProducer {
    items: vec![1, 2, 3, 4],
    pulled: Arc::clone(&pulled),
  })
  .try_map(|x| if x == 2 { Err(ZeroDivision) } else { Ok(x) })
  .sequential()
  .collect_all()
  .await;

  assert!(matches!(result, Err(PipelineError::Stage { .. })));
  assert_eq!(pulled.load(Ordering::SeqCst), 2);
}

proptest! {
  #[test]
  fn test_sequential_matches_iterator_semantics(
    items in prop::collection::vec(-1000i64..1000, 0..200),
    modulus in 1i64..7,
    limit in 0usize..250,
  ) {
    let expected: Vec<i64> = items
      .iter()
      .map(|x| x * 3)
      .filter(|x| x % modulus == 0)
      .take(limit)
      .collect();

    let runtime = tokio::runtime::Builder::new_current_thread()
      .enable_all()
      .build()
      .unwrap();
    let actual = runtime.block_on(
      Pipeline::from_iter(items)
        .map(|x| x * 3)
        .filter(move |x| x % modulus == 0)
        .truncate(limit)
        .sequential()
        .collect_all(),
    ).unwrap();

    prop_assert_eq!(actual, expected);
  }

  #[test]
  fn test_grouping_concatenates_back_to_input(
    items in prop::collection::vec(any::<u16>(), 0..100),
    size in 1usize..10,
  ) {
    let runtime = tokio::runtime::Builder::new_current_thread()
      .enable_all()
      .build()
      .unwrap();
    let batches = runtime.block_on(
      Pipeline::from_iter(items.clone())
        .group(Grouping::by_size(size))
        .unwrap()
        .sequential()
        .collect_all(),
    ).unwrap();

    prop_assert!(batches.iter().all(|batch| !batch.is_empty() && batch.len() <= size));
    prop_assert_eq!(batches.concat(), items);
  }
}
