// Copyright 2025 the Rowflow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tabular transforms over [`RowSet`](rowflow_core::RowSet)s.
//!
//! This crate provides:
//! - a stage IR ([`Stage`] and its option objects) covering group-by, equality joins, as-of
//!   merges, resampling, rolling windows and a few row-preserving stages,
//! - a lazy [`Pipeline`] that queues stages and runs them in one validated pass, and
//! - the stage engines themselves as plain functions ([`group_by`], [`join`], ...).
//!
//! Every stage is a full recompute: it reads one `RowSet` and produces a new one. Cells are
//! coerced to numbers or timestamps only where a stage needs them, under the
//! [`EngineOptions`](rowflow_core::EngineOptions) error policy.

mod aggregate;
mod asof;
mod error;
mod join;
mod pipeline;
mod rows;
mod stats;
mod transform;
mod window;

pub use aggregate::group_by;
pub use asof::merge_asof;
pub use error::{BoxError, EngineError, PipelineError};
pub use join::join;
pub use pipeline::{FnSink, Pipeline, RowSink, RowSource};
pub use rows::{filter, normalize, sort};
pub use transform::{
    AggregateFn, AggregateSpec, AsOfSpec, CompareOp, Direction, GroupBySpec, JoinKey, JoinSpec,
    JoinType, NormalizeMethod, NormalizeSpec, Operand, Predicate, ResampleSpec, RollingSpec,
    SortOrder, SortSpec, Stage, WindowMethod,
};
pub use window::{resample, rolling};
