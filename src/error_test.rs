//! # Error Test Suite
//!
//! Display formats, classification helpers and downcasting through lane
//! wrappers.

use crate::error::PipelineError;
use crate::stage::StageKind;
use std::error::Error;
use std::fmt;

#[derive(Debug)]
struct Boom;

impl fmt::Display for Boom {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "boom")
  }
}

impl Error for Boom {}

fn map_failure() -> PipelineError {
  PipelineError::stage_failure(StageKind::Map, Box::new(Boom))
}

#[test]
fn test_config_error() {
  let error = PipelineError::config(StageKind::Group, "group size must be at least 1");

  assert_eq!(
    error.to_string(),
    "invalid group configuration: group size must be at least 1"
  );
  assert!(error.is_config());
  assert_eq!(error.stage_kind(), Some(StageKind::Group));
  assert!(error.downcast_ref::<Boom>().is_none());
  assert!(error.source().is_none());
}

#[test]
fn test_execution_error() {
  let error = PipelineError::execution("no lanes");

  assert_eq!(error.to_string(), "invalid execution configuration: no lanes");
  assert!(error.is_config());
  assert_eq!(error.stage_kind(), None);
}

#[test]
fn test_stage_error_keeps_caller_error() {
  let error = map_failure();

  assert_eq!(error.to_string(), "map stage failed: boom");
  assert!(!error.is_config());
  assert!(error.is::<Boom>());
  assert!(!error.is::<std::io::Error>());
  assert_eq!(error.source().map(|source| source.to_string()), Some("boom".to_string()));
}

#[test]
fn test_foreach_stage_display() {
  let error = PipelineError::stage_failure(StageKind::ForEach, Box::new(Boom));
  assert_eq!(error.to_string(), "foreach stage failed: boom");
}

#[test]
fn test_source_error() {
  let error = PipelineError::source_failure(Box::new(std::io::Error::other("disk gone")));

  assert_eq!(error.to_string(), "source failed: disk gone");
  assert_eq!(error.stage_kind(), Some(StageKind::Source));
  assert!(error.is::<std::io::Error>());
}

#[test]
fn test_lane_error_looks_through_wrapper() {
  let error = PipelineError::Lane {
    lane: 2,
    source: Box::new(map_failure()),
  };

  assert_eq!(error.to_string(), "lane 2 failed: map stage failed: boom");
  assert_eq!(error.stage_kind(), Some(StageKind::Map));
  assert!(error.is::<Boom>());
  assert!(matches!(error.root(), PipelineError::Stage { .. }));
}

#[test]
fn test_close_error() {
  let error = PipelineError::close_failure(1, Box::new(Boom));

  assert_eq!(error.to_string(), "close handler #1 failed: boom");
  assert_eq!(error.stage_kind(), None);
  assert!(error.is::<Boom>());
}

#[test]
fn test_source_reused() {
  let error = PipelineError::SourceReused;

  assert_eq!(error.stage_kind(), Some(StageKind::Source));
  assert!(error.downcast_ref::<Boom>().is_none());
}

#[test]
fn test_clone_shares_caller_error() {
  let error = map_failure();
  let cloned = error.clone();

  assert_eq!(cloned.to_string(), error.to_string());
  assert!(cloned.is::<Boom>());
}

#[test]
fn test_deferred_marker_is_transparent() {
  let error = PipelineError::deferred(map_failure());

  assert_eq!(error.to_string(), "map stage failed: boom");
  assert!(error.is_deferred());
  assert!(error.is::<Boom>());
  assert_eq!(error.stage_kind(), Some(StageKind::Map));
  assert!(matches!(error.undeferred(), PipelineError::Stage { .. }));
  assert!(matches!(error.root(), PipelineError::Stage { .. }));

  let rewrapped = PipelineError::deferred(error.clone());
  assert!(!rewrapped.undeferred().is_deferred());
  assert!(matches!(error.into_undeferred(), PipelineError::Stage { .. }));
}
