// src/dag/mod.rs

//! Task graphs and readiness.
//!
//! - [`graph`] holds the per-instance task dependency graph.
//! - [`readiness`] decides whether a task's declared dependencies allow it
//!   to be submitted on this tick.

pub mod graph;
pub mod readiness;

pub use graph::TaskGraph;
pub use readiness::{Readiness, ReadinessCheck};
