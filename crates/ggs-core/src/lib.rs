// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! Core shared types and traits for ggs-rs.

pub mod control;
pub mod diagnostics;
pub mod error;
pub mod execution_context;
pub mod observability;
pub mod repro;
pub mod results;
pub mod segmenter;
pub mod time_series;

pub use control::CancelToken;
pub use diagnostics::{DIAGNOSTICS_SCHEMA_VERSION, Diagnostics};
pub use error::SegError;
pub use execution_context::ExecutionContext;
pub use observability::{ProgressSink, TelemetrySink};
pub use repro::ReproMode;
pub use results::{SegmentationResult, validate_change_points};
pub use segmenter::OfflineSegmenter;
pub use time_series::{DTypeView, MemoryLayout, SeriesBuffer, TimeSeriesView};
