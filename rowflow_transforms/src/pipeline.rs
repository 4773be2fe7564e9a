// Copyright 2025 the Rowflow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Lazy stage pipeline and its I/O seams.

use core::fmt;

use rowflow_core::{ColumnFrame, EngineOptions, RowSet, Schema};

use crate::error::{BoxError, EngineError, PipelineError};
use crate::transform::{
    AsOfSpec, GroupBySpec, JoinSpec, NormalizeSpec, Operand, Predicate, ResampleSpec,
    RollingSpec, SortSpec, Stage,
};
use crate::{aggregate, asof, join, rows, window};

/// Produces the rows a pipeline (or a deferred operand) starts from.
///
/// A pipeline calls [`RowSource::read`] exactly once per materialization.
pub trait RowSource {
    /// Reads every row.
    fn read(&mut self) -> Result<RowSet, BoxError>;
}

impl RowSource for RowSet {
    fn read(&mut self) -> Result<RowSet, BoxError> {
        Ok(core::mem::take(self))
    }
}

impl<F> RowSource for F
where
    F: FnMut() -> Result<RowSet, BoxError>,
{
    fn read(&mut self) -> Result<RowSet, BoxError> {
        self()
    }
}

/// Receives a pipeline's result.
pub trait RowSink {
    /// Writes every row.
    fn write(&mut self, rows: &RowSet) -> Result<(), BoxError>;
}

impl RowSink for Vec<RowSet> {
    fn write(&mut self, rows: &RowSet) -> Result<(), BoxError> {
        self.push(rows.clone());
        Ok(())
    }
}

/// Adapts a closure into a [`RowSink`].
pub struct FnSink<F>(pub F);

impl<F> RowSink for FnSink<F>
where
    F: FnMut(&RowSet) -> Result<(), BoxError>,
{
    fn write(&mut self, rows: &RowSet) -> Result<(), BoxError> {
        (self.0)(rows)
    }
}

impl<F> fmt::Debug for FnSink<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnSink(..)")
    }
}

impl Stage {
    /// Schema this stage produces from `input`, without touching any row.
    ///
    /// Binary stages need their right-hand input loaded first.
    pub fn output_schema(
        &self,
        input: &Schema,
        opts: &EngineOptions,
    ) -> Result<Schema, EngineError> {
        Ok(match self {
            Self::Filter(predicate) => {
                input.require(&predicate.column)?;
                input.clone()
            }
            Self::Sort(spec) => {
                input.require(&spec.column)?;
                input.clone()
            }
            Self::Normalize(specs) => {
                rows::plan_normalize(input, specs)?;
                input.clone()
            }
            Self::GroupBy(spec) => aggregate::plan(input, spec, opts)?.output,
            Self::Join { right, spec } => join::plan(input, right.rows()?.schema(), spec)?.output,
            Self::AsOf { right, spec } => asof::plan(input, right.rows()?.schema(), spec)?.output,
            Self::Resample(spec) => window::plan_resample(input, spec, opts)?.output,
            Self::Rolling(spec) => window::plan_rolling(input, spec, opts)?.output,
        })
    }

    /// Runs the stage over `input`.
    pub fn apply(&self, input: &RowSet, opts: &EngineOptions) -> Result<RowSet, EngineError> {
        match self {
            Self::Filter(predicate) => rows::filter(input, predicate, opts),
            Self::Sort(spec) => rows::sort(input, spec, opts),
            Self::Normalize(specs) => rows::normalize(input, specs, opts),
            Self::GroupBy(spec) => aggregate::group_by(input, spec, opts),
            Self::Join { right, spec } => join(input, right.rows()?, spec, opts),
            Self::AsOf { right, spec } => asof::merge_asof(input, right.rows()?, spec, opts),
            Self::Resample(spec) => window::resample(input, spec, opts),
            Self::Rolling(spec) => window::rolling(input, spec, opts),
        }
    }
}

/// An ordered list of stages over one source.
///
/// Builder methods only queue work. A terminal operation ([`Pipeline::materialize`],
/// [`Pipeline::to_columns`], [`Pipeline::write_to`]) reads the source once, reads each
/// deferred right-hand input once, validates every stage against the schema flowing into it
/// and only then folds the stages over the rows.
pub struct Pipeline {
    source: Box<dyn RowSource>,
    stages: Vec<Stage>,
    options: EngineOptions,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stages)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Starts a pipeline over rows already in memory.
    pub fn from_rows(rows: RowSet) -> Self {
        Self::from_source(rows)
    }

    /// Starts a pipeline over a source that is read at materialization.
    pub fn from_source(source: impl RowSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            stages: Vec::new(),
            options: EngineOptions::default(),
        }
    }

    /// Replaces the options handed to every stage.
    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    /// Queues an arbitrary stage.
    pub fn stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    /// Queues a [`Stage::Filter`].
    pub fn filter(self, predicate: Predicate) -> Self {
        self.stage(Stage::Filter(predicate))
    }

    /// Queues a [`Stage::Sort`].
    pub fn sort(self, spec: SortSpec) -> Self {
        self.stage(Stage::Sort(spec))
    }

    /// Queues a [`Stage::Normalize`].
    pub fn normalize(self, specs: Vec<NormalizeSpec>) -> Self {
        self.stage(Stage::Normalize(specs))
    }

    /// Queues a [`Stage::GroupBy`].
    pub fn group_by(self, spec: GroupBySpec) -> Self {
        self.stage(Stage::GroupBy(spec))
    }

    /// Queues a [`Stage::Join`] against `right`.
    pub fn join(self, right: impl Into<Operand>, spec: JoinSpec) -> Self {
        self.stage(Stage::Join {
            right: right.into(),
            spec,
        })
    }

    /// Queues a [`Stage::AsOf`] against `right`.
    pub fn merge_asof(self, right: impl Into<Operand>, spec: AsOfSpec) -> Self {
        self.stage(Stage::AsOf {
            right: right.into(),
            spec,
        })
    }

    /// Queues a [`Stage::Resample`].
    pub fn resample(self, spec: ResampleSpec) -> Self {
        self.stage(Stage::Resample(spec))
    }

    /// Queues a [`Stage::Rolling`].
    pub fn rolling(self, spec: RollingSpec) -> Self {
        self.stage(Stage::Rolling(spec))
    }

    /// Queued stages in execution order.
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Number of queued stages.
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Options handed to every stage.
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Runs the pipeline and returns the final rows.
    pub fn materialize(mut self) -> Result<RowSet, PipelineError> {
        let mut rows = self.source.read().map_err(PipelineError::Source)?;
        let input_rows = rows.len();

        for (stage, step) in self.stages.iter_mut().enumerate() {
            let operation = step.operation();
            if let Stage::Join { right, .. } | Stage::AsOf { right, .. } = step {
                right.load().map_err(|error| PipelineError::Operand {
                    stage,
                    operation,
                    error,
                })?;
            }
        }

        let mut schema = rows.schema().clone();
        for (stage, step) in self.stages.iter().enumerate() {
            schema = step
                .output_schema(&schema, &self.options)
                .map_err(|source| PipelineError::Validation {
                    stage,
                    operation: step.operation(),
                    source,
                })?;
        }

        for (stage, step) in self.stages.iter().enumerate() {
            let before = rows.len();
            rows = step
                .apply(&rows, &self.options)
                .map_err(|source| PipelineError::Stage {
                    stage,
                    operation: step.operation(),
                    source,
                })?;
            log::debug!(
                "stage {stage} ({}): {before} rows -> {} rows",
                step.operation(),
                rows.len()
            );
        }

        log::info!(
            "pipeline: {} stage(s), {input_rows} input rows -> {} output rows",
            self.stages.len(),
            rows.len()
        );
        Ok(rows)
    }

    /// Runs the pipeline and returns a columnar snapshot of the result.
    pub fn to_columns(self) -> Result<ColumnFrame, PipelineError> {
        Ok(ColumnFrame::from_rows(self.materialize()?))
    }

    /// Runs the pipeline, writes the result to `sink` once, and returns the number of rows
    /// written.
    pub fn write_to(self, sink: &mut impl RowSink) -> Result<usize, PipelineError> {
        let rows = self.materialize()?;
        sink.write(&rows).map_err(PipelineError::Sink)?;
        Ok(rows.len())
    }
}
