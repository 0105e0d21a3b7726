//! # Execution Configuration
//!
//! Plain data describing how a pipeline should be compiled. It can be built in
//! code or loaded from any serde format:
//!
//! ```rust
//! use lazyweave::{ExecutionConfig, ExecutionMode};
//!
//! let config: ExecutionConfig =
//!   serde_json::from_str(r#"{ "mode": "concurrent", "width": 4, "name": "ingest" }"#).unwrap();
//! assert_eq!(config.mode(), ExecutionMode::Concurrent { width: 4 });
//! assert_eq!(config.name(), Some("ingest"));
//! ```

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};

/// Which compiler to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ExecutionMode {
  /// One lane, strict chain order.
  #[default]
  Sequential,
  /// `width` lanes over a shared source, completion order.
  Concurrent {
    /// Number of lanes.
    width: usize,
  },
}

/// How to compile and run a pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionConfig {
  #[serde(flatten)]
  mode: ExecutionMode,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  name: Option<String>,
}

impl ExecutionConfig {
  /// Sequential execution.
  pub fn sequential() -> Self {
    Self::default()
  }

  /// Concurrent execution over `width` lanes.
  pub fn concurrent(width: usize) -> Self {
    Self {
      mode: ExecutionMode::Concurrent { width },
      name: None,
    }
  }

  /// Names the execution in log records.
  pub fn with_name(mut self, name: impl Into<String>) -> Self {
    self.name = Some(name.into());
    self
  }

  /// The requested compiler.
  pub fn mode(&self) -> ExecutionMode {
    self.mode
  }

  /// The execution's name, if any.
  pub fn name(&self) -> Option<&str> {
    self.name.as_deref()
  }

  /// Number of lanes this configuration asks for.
  pub fn width(&self) -> usize {
    match self.mode {
      ExecutionMode::Sequential => 1,
      ExecutionMode::Concurrent { width } => width,
    }
  }

  /// Rejects a concurrent mode with no lanes.
  pub fn validate(&self) -> Result<()> {
    match self.mode {
      ExecutionMode::Concurrent { width: 0 } => Err(PipelineError::execution(
        "concurrent execution needs at least one lane",
      )),
      _ => Ok(()),
    }
  }
}
