// Copyright 2025 the Rowflow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Core data model for Rowflow.
//!
//! This crate provides:
//! - [`RowSet`]: ordered, schema-uniform rows of text cells,
//! - on-demand coercion of cells to numbers ([`try_parse_numeric`]) and timestamps
//!   ([`try_parse_timestamp`]), with the number culture passed explicitly, and
//! - [`EngineOptions`], the configuration every transform stage receives.
//!
//! Cells are always strings. Nothing here knows about files; adapters fill and drain
//! [`RowSet`]s.

mod frame;
mod numeric;
mod options;
mod row;
mod time;

pub use frame::ColumnFrame;
pub use numeric::{NumberFormat, format_numeric, is_missing, try_parse_numeric};
pub use options::{ConfigError, EngineOptions};
pub use row::{ColumnRef, Row, RowSet, RowSetError, Schema};
pub use time::{
    TimeForm, TimeSpan, TimeSpanError, TimeUnit, Timestamp, format_timestamp,
    try_parse_timestamp,
};
