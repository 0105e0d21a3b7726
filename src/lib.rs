//! # Lazyweave
//!
//! Lazy, composable stream pipelines with sequential or bounded-concurrency
//! execution.
//!
//! A [`Pipeline`] is an immutable chain of stage descriptors rooted at a
//! [`Producer`]. Combinators such as [`Pipeline::map`], [`Pipeline::filter`]
//! and [`Pipeline::group`] wrap the chain in a new descriptor and never run
//! anything. Execution starts when the chain is compiled:
//!
//! - [`Pipeline::sequential`] threads every item through every stage in chain
//!   order.
//! - [`Pipeline::concurrent`] compiles the chain into `width` independent
//!   lanes that share one source and yields items in completion order.
//!
//! The compiled [`Executable`] is a [`futures::Stream`] and owns the close
//! registry of that execution, which runs exactly once on exhaustion, failure,
//! explicit close or drop.
//!
//! ## Quick Start
//!
//! ```rust
//! use lazyweave::{Grouping, Pipeline};
//!
//! # tokio_test::block_on(async {
//! let batches = Pipeline::from_iter(1..=5)
//!   .map(|x| x * 10)
//!   .group(Grouping::by_size(2))?
//!   .sequential()
//!   .collect_all()
//!   .await?;
//!
//! assert_eq!(batches, vec![vec![10, 20], vec![30, 40], vec![50]]);
//! # Ok::<(), lazyweave::PipelineError>(())
//! # }).unwrap();
//! ```
//!
//! ## Failures
//!
//! Invalid combinator parameters are rejected when the combinator is called.
//! Failures while running flow downstream as items: a [`Pipeline::catch`]
//! stage can absorb them, otherwise the executable stops at the first one. See
//! [`PipelineError`].

#![deny(missing_docs)]

/// Close registry run once per execution.
pub mod close;
/// Execution configuration.
pub mod config;
/// Error types.
pub mod error;
/// Compiled pipelines.
pub mod executable;
/// The combinator API.
pub mod pipeline;
/// Pipeline sources.
pub mod producer;
/// Stage descriptors and their parameters.
pub mod stage;
/// Operator bodies.
pub mod transformers;

mod compile;
mod fan_in;

pub use close::{CloseHandler, CloseRegistry, close_handler};
pub use config::{ExecutionConfig, ExecutionMode};
pub use error::{BoxError, PipelineError, Result, SharedError};
pub use executable::{Executable, Pull};
pub use pipeline::Pipeline;
pub use producer::{FnProducer, IterProducer, Producer, StreamProducer, TryFnProducer};
pub use stage::{Concurrency, Descriptor, Grouping, Order, StageKind, StageStream};
pub use transformers::observe::Observation;

#[cfg(test)]
mod error_test;
#[cfg(test)]
mod stage_test;
