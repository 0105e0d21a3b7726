//! # Close Registry
//!
//! Cleanup callbacks contributed while a pipeline is built. One registry exists
//! per execution, shared by all of its lanes, and it runs its handlers at most
//! once: the first call to [`CloseRegistry::close`] wins and later calls are
//! no-ops.
//!
//! Handlers run in registration order. A failing handler does not stop the
//! remaining ones; the first failure is returned and the others are logged.

use crate::error::{BoxError, PipelineError, Result};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// A zero-argument cleanup callback.
pub type CloseHandler = Arc<dyn Fn() -> std::result::Result<(), BoxError> + Send + Sync>;

/// Wraps a closure as a [`CloseHandler`].
pub fn close_handler<F, E>(handler: F) -> CloseHandler
where
  F: Fn() -> std::result::Result<(), E> + Send + Sync + 'static,
  E: Into<BoxError>,
{
  Arc::new(move || handler().map_err(Into::into))
}

#[derive(Default)]
struct RegistryState {
  handlers: Vec<CloseHandler>,
  // Handlers ever registered, including those that already ran.
  registered: usize,
  closed: bool,
}

/// Ordered set of cleanup callbacks that run exactly once.
#[derive(Clone, Default)]
pub struct CloseRegistry {
  state: Arc<Mutex<RegistryState>>,
}

impl CloseRegistry {
  /// Creates an empty registry.
  pub fn new() -> Self {
    Self::default()
  }

  pub(crate) fn with_handlers(handlers: &[CloseHandler]) -> Self {
    Self {
      state: Arc::new(Mutex::new(RegistryState {
        handlers: handlers.to_vec(),
        registered: handlers.len(),
        closed: false,
      })),
    }
  }

  fn lock(&self) -> MutexGuard<'_, RegistryState> {
    self
      .state
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  /// Registers a handler to run on close.
  ///
  /// If the registry is already closed the handler runs immediately and its
  /// failure, if any, is returned.
  pub fn register(&self, handler: CloseHandler) -> Result<()> {
    let index = {
      let mut state = self.lock();
      state.registered += 1;
      if !state.closed {
        state.handlers.push(handler);
        return Ok(());
      }
      state.registered - 1
    };
    debug!(index, "registry already closed, running late handler");
    handler().map_err(|e| PipelineError::close_failure(index, e))
  }

  /// Number of handlers still waiting to run.
  pub fn len(&self) -> usize {
    self.lock().handlers.len()
  }

  /// Returns `true` if no handler is waiting to run.
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Returns `true` once [`CloseRegistry::close`] has been called.
  pub fn is_closed(&self) -> bool {
    self.lock().closed
  }

  /// Runs every registered handler once, in registration order.
  ///
  /// Returns the first handler failure. Later failures are logged only.
  pub fn close(&self) -> Result<()> {
    let handlers = {
      let mut state = self.lock();
      if state.closed {
        return Ok(());
      }
      state.closed = true;
      std::mem::take(&mut state.handlers)
    };
    debug!(handlers = handlers.len(), "closing registry");

    let mut first_error = None;
    for (index, handler) in handlers.iter().enumerate() {
      if let Err(e) = handler() {
        let error = PipelineError::close_failure(index, e);
        if first_error.is_none() {
          first_error = Some(error);
        } else {
          warn!(%error, "close handler failed");
        }
      }
    }
    first_error.map_or(Ok(()), Err)
  }
}

impl fmt::Debug for CloseRegistry {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let state = self.lock();
    f.debug_struct("CloseRegistry")
      .field("handlers", &state.handlers.len())
      .field("closed", &state.closed)
      .finish()
  }
}
