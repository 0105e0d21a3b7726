//! # Operator Bodies
//!
//! One module per stage kind. Each exposes an `apply` function that wraps an
//! already compiled upstream [`StageStream`](crate::stage::StageStream) with
//! the stage's behaviour. Type-changing stages (map, flatten, group) also
//! define the operator that erases their upstream.
//!
//! Failure items are never consumed silently: every body forwards upstream
//! failures in order unless it is a catch stage configured to absorb them.

pub(crate) mod catch;
pub(crate) mod filter;
pub(crate) mod flatten;
pub(crate) mod group;
pub(crate) mod map;
pub mod observe;
pub(crate) mod throttle;
pub(crate) mod truncate;
