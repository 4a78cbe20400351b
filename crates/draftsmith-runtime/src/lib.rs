//! Draftsmith runtime: the worker that drives claimed tasks through their
//! execution plans.
//!
//! The runtime owns three concerns:
//! - a [`StageRegistry`] mapping stage names to [`StageRunner`] implementations,
//! - the built-in runners for the five content stages ([`stages`]),
//! - the [`Worker`] loop that claims tasks, schedules ready stages, retries
//!   transient failures, and applies the quality gate.
//!
//! [`StageRunner`]: draftsmith_core::StageRunner

pub mod registry;
pub mod stages;
pub mod worker;

pub use registry::StageRegistry;
pub use worker::{PipelineEnd, Worker, WorkerConfig, WorkerError};
