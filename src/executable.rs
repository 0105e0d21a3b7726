//! # Executables
//!
//! An [`Executable`] is a compiled pipeline: one lazy sequence of items plus
//! the close registry of that execution. It can be consumed two ways:
//!
//! - as a [`futures::Stream`] of `Result<T, PipelineError>`, which reports an
//!   unrecovered failure once and then ends, or
//! - through [`Executable::pull`], which returns a [`Pull`] and keeps
//!   returning the same terminal signal once exhausted or failed.
//!
//! The registry runs exactly once, on whichever happens first: exhaustion, an
//! unrecovered failure, [`Executable::close`], or drop. Dropping the compiled
//! stream first cancels any outstanding lane requests, so a partially produced
//! item is discarded rather than delivered.

use crate::close::{CloseRegistry, close_handler};
use crate::compile::CompileContext;
use crate::config::{ExecutionConfig, ExecutionMode};
use crate::error::{BoxError, PipelineError, Result};
use crate::fan_in::{FanIn, LaneFailure};
use crate::pipeline::Pipeline;
use crate::stage::StageStream;
use futures::stream::FusedStream;
use futures::{Stream, StreamExt};
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use tracing::{debug, warn};

/// Result of one pull on a compiled sequence.
#[derive(Debug)]
pub enum Pull<T> {
  /// The next item.
  Item(T),
  /// The sequence ended normally.
  Exhausted,
  /// The sequence stopped on an unrecovered failure.
  Failed(PipelineError),
}

impl<T> Pull<T> {
  /// Returns `true` for [`Pull::Exhausted`] and [`Pull::Failed`].
  pub fn is_terminal(&self) -> bool {
    !matches!(self, Pull::Item(_))
  }
}

#[derive(Debug, Clone)]
enum Terminal {
  Exhausted,
  Failed(PipelineError),
}

impl Terminal {
  fn to_pull<T>(&self) -> Pull<T> {
    match self {
      Terminal::Exhausted => Pull::Exhausted,
      Terminal::Failed(error) => Pull::Failed(error.clone()),
    }
  }
}

/// A compiled, running pipeline.
pub struct Executable<T> {
  stream: Option<StageStream<T>>,
  terminal: Option<Terminal>,
  reported: bool,
  registry: CloseRegistry,
  name: Option<String>,
}

impl<T: Send + 'static> Executable<T> {
  pub(crate) fn sequential(pipeline: &Pipeline<T>) -> Self {
    debug!(mode = "sequential", "opening executable");
    let ctx = CompileContext::sequential();
    let stream = ctx.compile(pipeline);
    Self::new(stream, pipeline, ctx, None)
  }

  pub(crate) fn open(pipeline: &Pipeline<T>, config: &ExecutionConfig) -> Result<Self> {
    config.validate()?;
    let name = config.name().map(str::to_owned);
    let (stream, ctx) = match config.mode() {
      ExecutionMode::Sequential => {
        debug!(mode = "sequential", name = ?name, "opening executable");
        let ctx = CompileContext::sequential();
        (ctx.compile(pipeline), ctx)
      }
      ExecutionMode::Concurrent { width } => {
        debug!(mode = "concurrent", width, name = ?name, "opening executable");
        let ctx = CompileContext::shared();
        let lanes = (0..width).map(|_| ctx.compile(pipeline)).collect();
        let stream = Box::pin(FanIn::new(lanes, LaneFailure::Abort)) as StageStream<T>;
        (stream, ctx)
      }
    };
    Ok(Self::new(stream, pipeline, ctx, name))
  }

  // Handlers registered on the pipeline run before those of the opened sources.
  fn new(
    stream: StageStream<T>,
    pipeline: &Pipeline<T>,
    ctx: CompileContext,
    name: Option<String>,
  ) -> Self {
    let mut handlers = pipeline.close_handlers().to_vec();
    handlers.extend(ctx.into_close_handlers());
    Self {
      stream: Some(stream),
      terminal: None,
      reported: false,
      registry: CloseRegistry::with_handlers(&handlers),
      name,
    }
  }
}

impl<T> Executable<T> {
  /// Name given in the [`ExecutionConfig`], if any.
  pub fn name(&self) -> Option<&str> {
    self.name.as_deref()
  }

  /// The close registry of this execution.
  pub fn registry(&self) -> &CloseRegistry {
    &self.registry
  }

  /// Registers a cleanup callback on this execution.
  ///
  /// If the execution has already closed, the handler runs immediately.
  pub fn on_close<F, E>(&self, handler: F) -> Result<()>
  where
    F: Fn() -> std::result::Result<(), E> + Send + Sync + 'static,
    E: Into<BoxError>,
  {
    self.registry.register(close_handler(handler))
  }

  /// Pulls the next item.
  ///
  /// Once this returns [`Pull::Exhausted`] or [`Pull::Failed`], every later
  /// call returns the same signal.
  pub async fn pull(&mut self) -> Pull<T> {
    futures::future::poll_fn(|cx| self.poll_pull(cx)).await
  }

  /// Drains the execution into a `Vec`, stopping at the first failure.
  pub async fn collect_all(mut self) -> Result<Vec<T>> {
    let mut items = Vec::new();
    loop {
      match self.pull().await {
        Pull::Item(item) => items.push(item),
        Pull::Exhausted => return Ok(items),
        Pull::Failed(error) => return Err(error),
      }
    }
  }

  /// Cancels outstanding work and runs the close registry.
  ///
  /// Safe to call any number of times; handlers run only on the first call.
  pub fn close(&mut self) -> Result<()> {
    self.stream = None;
    if self.terminal.is_none() {
      self.terminal = Some(Terminal::Exhausted);
    }
    self.registry.close()
  }

  fn poll_pull(&mut self, cx: &mut Context<'_>) -> Poll<Pull<T>> {
    if let Some(terminal) = &self.terminal {
      return Poll::Ready(terminal.to_pull());
    }
    let next = match self.stream.as_mut() {
      Some(stream) => ready!(stream.poll_next_unpin(cx)),
      None => None,
    };
    let terminal = match next {
      Some(Ok(item)) => return Poll::Ready(Pull::Item(item)),
      Some(Err(error)) => {
        self.stream = None;
        if let Err(close_error) = self.registry.close() {
          warn!(error = %close_error, "close handler failed after pipeline failure");
        }
        Terminal::Failed(error.into_undeferred())
      }
      None => {
        self.stream = None;
        match self.registry.close() {
          Ok(()) => Terminal::Exhausted,
          Err(error) => Terminal::Failed(error),
        }
      }
    };
    debug!(name = ?self.name, failed = matches!(terminal, Terminal::Failed(_)), "executable finished");
    let pull = terminal.to_pull();
    self.terminal = Some(terminal);
    Poll::Ready(pull)
  }
}

impl<T> Stream for Executable<T> {
  type Item = Result<T>;

  fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
    let this = self.get_mut();
    if this.reported {
      return Poll::Ready(None);
    }
    match ready!(this.poll_pull(cx)) {
      Pull::Item(item) => Poll::Ready(Some(Ok(item))),
      Pull::Exhausted => {
        this.reported = true;
        Poll::Ready(None)
      }
      Pull::Failed(error) => {
        this.reported = true;
        Poll::Ready(Some(Err(error)))
      }
    }
  }
}

impl<T> FusedStream for Executable<T> {
  fn is_terminated(&self) -> bool {
    self.reported
  }
}

impl<T> Drop for Executable<T> {
  fn drop(&mut self) {
    self.stream = None;
    if let Err(error) = self.registry.close() {
      warn!(%error, "close handler failed while dropping executable");
    }
  }
}

impl<T> fmt::Debug for Executable<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Executable")
      .field("name", &self.name)
      .field("terminal", &self.terminal)
      .field("registry", &self.registry)
      .finish()
  }
}
