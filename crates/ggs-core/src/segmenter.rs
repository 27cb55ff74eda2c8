// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::{ExecutionContext, SegError, SegmentationResult, TimeSeriesView};

/// Offline segmenter contract: full series in, full result out.
pub trait OfflineSegmenter {
    fn segment(
        &self,
        x: &TimeSeriesView<'_>,
        ctx: &ExecutionContext<'_>,
    ) -> Result<SegmentationResult, SegError>;
}
