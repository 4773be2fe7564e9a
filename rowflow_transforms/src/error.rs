// Copyright 2025 the Rowflow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error types for stage execution and pipeline materialization.

use rowflow_core::{RowSetError, TimeSpanError};
use thiserror::Error;

/// Boxed error returned by [`RowSource`](crate::RowSource) and [`RowSink`](crate::RowSink)
/// implementations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised while validating or running a single stage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// A referenced column is missing, or an output schema would be malformed.
    #[error(transparent)]
    Schema(#[from] RowSetError),
    /// A stage was configured with values it cannot run with.
    #[error("invalid {what}: {reason}")]
    InvalidSpec {
        /// What was being configured (`rolling window`, `aggregate`, ...).
        what: &'static str,
        /// Why it was rejected.
        reason: String,
    },
    /// A window or tolerance string could not be parsed.
    #[error(transparent)]
    TimeSpan(#[from] TimeSpanError),
    /// A cell that must be numeric could not be parsed.
    #[error("row {row}, column `{column}`: `{value}` is not a number")]
    NumericParse {
        /// Index of the offending row in the stage's input.
        row: usize,
        /// Column name.
        column: String,
        /// The cell text.
        value: String,
    },
    /// A cell that must be a timestamp could not be parsed.
    #[error("row {row}, column `{column}`: `{value}` is not a timestamp")]
    TimeParse {
        /// Index of the offending row in the stage's input.
        row: usize,
        /// Column name.
        column: String,
        /// The cell text.
        value: String,
    },
    /// A numeric aggregate had no values to work with.
    #[error("{function} of `{column}` has no numeric values in group [{group}]")]
    EmptyAggregate {
        /// Aggregate function name.
        function: &'static str,
        /// Source column.
        column: String,
        /// The group's key cells, comma separated.
        group: String,
    },
}

impl EngineError {
    pub(crate) fn invalid(what: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidSpec {
            what,
            reason: reason.into(),
        }
    }
}

/// Errors returned by a pipeline's terminal operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The pipeline source failed to produce rows.
    #[error("reading the pipeline source failed: {0}")]
    Source(BoxError),
    /// The deferred right-hand input of a binary stage failed to produce rows.
    #[error("reading the right-hand input of stage {stage} ({operation}) failed: {error}")]
    Operand {
        /// Zero-based stage position.
        stage: usize,
        /// Stage operation name.
        operation: &'static str,
        /// The source's error.
        error: BoxError,
    },
    /// A stage does not fit the schema flowing into it.
    ///
    /// Raised before any row is processed.
    #[error("stage {stage} ({operation}) is invalid: {source}")]
    Validation {
        /// Zero-based stage position.
        stage: usize,
        /// Stage operation name.
        operation: &'static str,
        /// What was wrong.
        source: EngineError,
    },
    /// A stage failed while processing rows.
    #[error("stage {stage} ({operation}) failed: {source}")]
    Stage {
        /// Zero-based stage position.
        stage: usize,
        /// Stage operation name.
        operation: &'static str,
        /// What went wrong, including the row and column where relevant.
        source: EngineError,
    },
    /// The sink rejected the result.
    #[error("writing the pipeline sink failed: {0}")]
    Sink(BoxError),
}

impl PipelineError {
    /// The engine error behind a validation or stage failure.
    pub fn engine_error(&self) -> Option<&EngineError> {
        match self {
            Self::Validation { source, .. } | Self::Stage { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Zero-based position of the stage that failed, if a stage failed.
    pub fn stage_index(&self) -> Option<usize> {
        match self {
            Self::Operand { stage, .. }
            | Self::Validation { stage, .. }
            | Self::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}
