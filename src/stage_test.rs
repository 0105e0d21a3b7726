//! # Stage Descriptor Test Suite

use crate::pipeline::Pipeline;
use crate::stage::{Concurrency, Descriptor, Grouping, Order, StageKind};
use crate::transformers::observe::Observation;
use proptest::prelude::*;
use std::time::Duration;

#[test]
fn test_stage_kind_display() {
  assert_eq!(StageKind::Source.to_string(), "source");
  assert_eq!(StageKind::ForEach.to_string(), "foreach");
  assert_eq!(StageKind::Throttle.to_string(), "throttle");
}

#[test]
fn test_stage_kind_serde() {
  let json = serde_json::to_string(&StageKind::ForEach).unwrap();
  assert_eq!(json, "\"for_each\"");
  let kind: StageKind = serde_json::from_str("\"truncate\"").unwrap();
  assert_eq!(kind, StageKind::Truncate);
}

#[test]
fn test_concurrency_constructors() {
  assert_eq!(Concurrency::default(), Concurrency::serial());
  assert_eq!(Concurrency::serial().width(), 1);
  assert_eq!(Concurrency::ordered(4).order(), Order::Input);
  assert_eq!(Concurrency::unordered(4).order(), Order::Completion);
  assert_eq!(Concurrency::unordered(4).width(), 4);
}

#[test]
fn test_concurrency_zero_width_is_rejected() {
  let error = Concurrency::unordered(0)
    .validate(StageKind::Map)
    .unwrap_err();
  assert!(error.is_config());
  assert_eq!(error.stage_kind(), Some(StageKind::Map));
}

#[test]
fn test_grouping_validation() {
  assert!(Grouping::<i32>::by_size(0).validate().is_err());
  assert!(Grouping::<i32>::by_interval(Duration::ZERO).validate().is_err());
  assert!(
    Grouping::<i32>::by_size(3)
      .with_interval(Duration::ZERO)
      .validate()
      .is_err()
  );
  assert!(Grouping::<i32>::by_size(1).validate().is_ok());
  assert!(
    Grouping::<i32>::by_interval(Duration::from_millis(5))
      .validate()
      .is_ok()
  );
}

#[test]
fn test_grouping_debug_hides_key_function() {
  let grouping = Grouping::<i32>::by_size(2).keyed(|x| *x % 2);
  let debug = format!("{grouping:?}");
  assert!(debug.contains("size: Some(2)"));
  assert!(debug.contains("keyed: true"));
}

#[test]
fn test_chain_is_walked_root_first() {
  let observation = Observation::new("chain");
  let pipeline = Pipeline::from_iter(vec![vec![1, 2], vec![3]])
    .flatten()
    .filter(|x| *x > 1)
    .map(|x| x * 2)
    .observe(&observation)
    .truncate(10);

  assert_eq!(pipeline.kind(), StageKind::Truncate);
  assert_eq!(
    pipeline.stage_kinds(),
    vec![
      StageKind::Source,
      StageKind::Flatten,
      StageKind::Filter,
      StageKind::Map,
      StageKind::Observe,
      StageKind::Truncate,
    ]
  );
}

#[test]
fn test_combinators_do_not_mutate_receiver() {
  let base = Pipeline::from_iter(1..=3);
  let filtered = base.filter(|x| *x > 1);
  let caught = base.catch(|_| true);

  assert_eq!(base.stage_kinds(), vec![StageKind::Source]);
  assert_eq!(filtered.upstream().map(|up| up.kind()), Some(StageKind::Source));
  assert_eq!(caught.kind(), StageKind::Catch);
}

proptest! {
  #[test]
  fn test_concurrency_validation_matches_width(width in 0usize..64) {
    let result = Concurrency::ordered(width).validate(StageKind::ForEach);
    prop_assert_eq!(result.is_ok(), width > 0);
  }

  #[test]
  fn test_grouping_validation_matches_size(size in 0usize..64) {
    let result = Grouping::<u8>::by_size(size).validate();
    prop_assert_eq!(result.is_ok(), size > 0);
  }
}
