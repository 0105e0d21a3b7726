//! # Error Handling
//!
//! Every failure a pipeline can report is a [`PipelineError`]. The variants
//! follow where the failure happened:
//!
//! - **Config** / **Execution**: a combinator or an execution was given an
//!   invalid parameter. Returned synchronously when the pipeline is built or
//!   compiled, never while iterating.
//! - **Source**: the producer feeding the pipeline failed to produce an item.
//! - **Stage**: a caller-supplied map/filter/effect function failed on one item.
//! - **Lane**: an unrecovered failure inside one lane of a concurrent execution.
//! - **Close**: a close handler failed.
//!
//! Source and stage failures flow through the pipeline as `Err` items. They can
//! be absorbed by a downstream `catch` stage; otherwise the executable stops at
//! the first one it sees.
//!
//! ## Example
//!
//! ```rust
//! use lazyweave::{Pipeline, PipelineError};
//!
//! #[derive(Debug)]
//! struct DivideByZero;
//!
//! impl std::fmt::Display for DivideByZero {
//!   fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!     write!(f, "division by zero")
//!   }
//! }
//!
//! impl std::error::Error for DivideByZero {}
//!
//! let pipeline = Pipeline::from_iter(vec![1, 0, 2])
//!   .try_map(|x: i32| if x == 0 { Err(DivideByZero) } else { Ok(10 / x) })
//!   .catch(|error: &PipelineError| error.is::<DivideByZero>());
//! # let _ = pipeline;
//! ```

use crate::stage::StageKind;
use std::error::Error;
use std::sync::Arc;
use thiserror::Error;

/// Boxed error accepted from caller-supplied functions and producers.
pub type BoxError = Box<dyn Error + Send + Sync>;

/// Reference-counted error so that [`PipelineError`] stays `Clone`.
pub type SharedError = Arc<dyn Error + Send + Sync>;

/// Result alias used throughout the crate.
pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

/// Error raised while building, running or closing a pipeline.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
  /// A combinator was constructed with an invalid parameter.
  #[error("invalid {stage} configuration: {reason}")]
  Config {
    /// The stage being configured.
    stage: StageKind,
    /// What was wrong with the parameter.
    reason: String,
  },
  /// An execution was requested with an invalid configuration.
  #[error("invalid execution configuration: {reason}")]
  Execution {
    /// What was wrong with the configuration.
    reason: String,
  },
  /// The producer feeding the pipeline failed.
  #[error("source failed: {source}")]
  Source {
    /// The producer's error.
    source: SharedError,
  },
  /// A stage function failed on one item.
  #[error("{stage} stage failed: {source}")]
  Stage {
    /// The kind of stage whose function failed.
    stage: StageKind,
    /// The function's error.
    source: SharedError,
  },
  /// A lane of a concurrent execution failed and its siblings were cancelled.
  #[error("lane {lane} failed: {source}")]
  Lane {
    /// Index of the failed lane.
    lane: usize,
    /// The failure the lane reported.
    source: Box<PipelineError>,
  },
  /// A close handler failed.
  #[error("close handler #{index} failed: {source}")]
  Close {
    /// Registration index of the failed handler.
    index: usize,
    /// The handler's error.
    source: SharedError,
  },
  /// A failure a deferred catch stage held back until its upstream ended.
  ///
  /// Marks the failure so a concurrent execution lets sibling lanes finish
  /// before reporting it. Executables unwrap it and never return it.
  #[error(transparent)]
  Deferred(Box<PipelineError>),
  /// A one-shot source was opened by a second execution.
  #[error("one-shot source was already consumed by a previous execution")]
  SourceReused,
}

impl PipelineError {
  /// Creates a [`PipelineError::Config`] for `stage`.
  pub fn config(stage: StageKind, reason: impl Into<String>) -> Self {
    Self::Config {
      stage,
      reason: reason.into(),
    }
  }

  pub(crate) fn execution(reason: impl Into<String>) -> Self {
    Self::Execution {
      reason: reason.into(),
    }
  }

  pub(crate) fn stage_failure(stage: StageKind, source: BoxError) -> Self {
    Self::Stage {
      stage,
      source: Arc::from(source),
    }
  }

  pub(crate) fn source_failure(source: BoxError) -> Self {
    Self::Source {
      source: Arc::from(source),
    }
  }

  pub(crate) fn close_failure(index: usize, source: BoxError) -> Self {
    Self::Close {
      index,
      source: Arc::from(source),
    }
  }

  pub(crate) fn deferred(error: PipelineError) -> Self {
    Self::Deferred(Box::new(error.into_undeferred()))
  }

  pub(crate) fn is_deferred(&self) -> bool {
    matches!(self, Self::Deferred(_))
  }

  /// The failure without its [`PipelineError::Deferred`] marker.
  pub fn undeferred(&self) -> &PipelineError {
    match self {
      Self::Deferred(inner) => inner,
      other => other,
    }
  }

  pub(crate) fn into_undeferred(self) -> PipelineError {
    match self {
      Self::Deferred(inner) => *inner,
      other => other,
    }
  }

  /// Returns `true` if this is a construction-time configuration error.
  pub fn is_config(&self) -> bool {
    matches!(
      self.undeferred(),
      Self::Config { .. } | Self::Execution { .. }
    )
  }

  /// The stage kind this error is attributed to, if any.
  ///
  /// Lane failures report the kind of the failure they wrap.
  pub fn stage_kind(&self) -> Option<StageKind> {
    match self {
      Self::Config { stage, .. } | Self::Stage { stage, .. } => Some(*stage),
      Self::Source { .. } | Self::SourceReused => Some(StageKind::Source),
      Self::Lane { source, .. } | Self::Deferred(source) => source.stage_kind(),
      Self::Execution { .. } | Self::Close { .. } => None,
    }
  }

  /// Returns the caller's original error if it is of type `E`.
  ///
  /// Looks through [`PipelineError::Lane`] and [`PipelineError::Deferred`]
  /// wrappers.
  pub fn downcast_ref<E: Error + 'static>(&self) -> Option<&E> {
    match self {
      Self::Source { source } | Self::Stage { source, .. } | Self::Close { source, .. } => {
        source.downcast_ref::<E>()
      }
      Self::Lane { source, .. } | Self::Deferred(source) => source.downcast_ref::<E>(),
      Self::Config { .. } | Self::Execution { .. } | Self::SourceReused => None,
    }
  }

  /// Returns `true` if the caller's original error is of type `E`.
  pub fn is<E: Error + 'static>(&self) -> bool {
    self.downcast_ref::<E>().is_some()
  }

  /// Strips any [`PipelineError::Lane`] and [`PipelineError::Deferred`]
  /// wrappers.
  pub fn root(&self) -> &PipelineError {
    match self {
      Self::Lane { source, .. } | Self::Deferred(source) => source.root(),
      other => other,
    }
  }
}
