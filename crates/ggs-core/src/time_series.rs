// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::SegError;

/// Borrowed numeric data view over either f32 or f64 values.
#[derive(Clone, Copy, Debug)]
pub enum DTypeView<'a> {
    F32(&'a [f32]),
    F64(&'a [f64]),
}

/// Memory layout metadata for underlying data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemoryLayout {
    /// Row-major: observation `t` occupies `values[t*d .. (t+1)*d]`.
    CContiguous,
    /// Column-major: feature `j` occupies `values[j*n .. (j+1)*n]`.
    FContiguous,
}

/// Zero-copy `n x d` view over a borrowed numeric buffer.
#[derive(Clone, Copy, Debug)]
pub struct TimeSeriesView<'a> {
    pub values: DTypeView<'a>,
    pub n: usize,
    pub d: usize,
    pub layout: MemoryLayout,
}

impl<'a> TimeSeriesView<'a> {
    /// Constructs a validated `TimeSeriesView`.
    pub fn new(
        values: DTypeView<'a>,
        n: usize,
        d: usize,
        layout: MemoryLayout,
    ) -> Result<Self, SegError> {
        if n == 0 {
            return Err(SegError::invalid_input("n must be >= 1"));
        }
        if d == 0 {
            return Err(SegError::invalid_input("d must be >= 1"));
        }

        let expected_len = n
            .checked_mul(d)
            .ok_or_else(|| SegError::invalid_input("n*d overflow while validating shape"))?;

        let value_len = match values {
            DTypeView::F32(slice) => slice.len(),
            DTypeView::F64(slice) => slice.len(),
        };
        if value_len != expected_len {
            return Err(SegError::invalid_input(format!(
                "value length mismatch: got {value_len}, expected {expected_len} (n={n}, d={d})"
            )));
        }

        Ok(Self {
            values,
            n,
            d,
            layout,
        })
    }

    /// Convenience constructor for f32-backed data.
    pub fn from_f32(
        values: &'a [f32],
        n: usize,
        d: usize,
        layout: MemoryLayout,
    ) -> Result<Self, SegError> {
        Self::new(DTypeView::F32(values), n, d, layout)
    }

    /// Convenience constructor for f64-backed data.
    pub fn from_f64(
        values: &'a [f64],
        n: usize,
        d: usize,
        layout: MemoryLayout,
    ) -> Result<Self, SegError> {
        Self::new(DTypeView::F64(values), n, d, layout)
    }

    /// Single-feature view over a plain slice.
    pub fn univariate(values: &'a [f64]) -> Result<Self, SegError> {
        Self::from_f64(values, values.len(), 1, MemoryLayout::CContiguous)
    }

    /// Returns true when `d == 1`.
    pub fn is_univariate(&self) -> bool {
        self.d == 1
    }

    /// Returns true when `d > 1`.
    pub fn is_multivariate(&self) -> bool {
        self.d > 1
    }

    /// Reads cell `(t, dim)` as f64.
    ///
    /// Panics when `t >= n` or `dim >= d`; shape is validated at construction.
    pub fn value(&self, t: usize, dim: usize) -> f64 {
        assert!(
            t < self.n && dim < self.d,
            "cell out of bounds: t={t}, dim={dim}, n={}, d={}",
            self.n,
            self.d
        );
        let idx = match self.layout {
            MemoryLayout::CContiguous => t * self.d + dim,
            MemoryLayout::FContiguous => dim * self.n + t,
        };
        match self.values {
            DTypeView::F32(values) => f64::from(values[idx]),
            DTypeView::F64(values) => values[idx],
        }
    }

    /// Copies observation `t` into `out` (length `d`).
    pub fn read_row(&self, t: usize, out: &mut [f64]) {
        debug_assert_eq!(out.len(), self.d);
        for (dim, slot) in out.iter_mut().enumerate() {
            *slot = self.value(t, dim);
        }
    }

    /// Fails on the first NaN or infinite cell, scanning observation by observation.
    pub fn ensure_finite(&self) -> Result<(), SegError> {
        for t in 0..self.n {
            for dim in 0..self.d {
                let value = self.value(t, dim);
                if !value.is_finite() {
                    return Err(SegError::invalid_input(format!(
                        "non-finite value {value} at t={t}, dim={dim}"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Owned row-major `f64` series, for callers converting from other containers.
#[derive(Clone, Debug, PartialEq)]
pub struct SeriesBuffer {
    values: Vec<f64>,
    n: usize,
    d: usize,
}

impl SeriesBuffer {
    /// Builds from observation rows; every row must have the same width.
    pub fn from_rows<R: AsRef<[f64]>>(rows: &[R]) -> Result<Self, SegError> {
        let Some(first) = rows.first() else {
            return Err(SegError::invalid_input("n must be >= 1"));
        };
        let d = first.as_ref().len();
        if d == 0 {
            return Err(SegError::invalid_input("d must be >= 1"));
        }

        let mut values = Vec::with_capacity(rows.len().saturating_mul(d));
        for (t, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            if row.len() != d {
                return Err(SegError::invalid_input(format!(
                    "ragged rows: row {t} has {} values, expected {d}",
                    row.len()
                )));
            }
            values.extend_from_slice(row);
        }

        Ok(Self {
            values,
            n: rows.len(),
            d,
        })
    }

    /// Builds from feature columns; every column must have the same length.
    pub fn from_columns<C: AsRef<[f64]>>(columns: &[C]) -> Result<Self, SegError> {
        let Some(first) = columns.first() else {
            return Err(SegError::invalid_input("d must be >= 1"));
        };
        let n = first.as_ref().len();
        if n == 0 {
            return Err(SegError::invalid_input("n must be >= 1"));
        }
        let d = columns.len();
        for (dim, column) in columns.iter().enumerate() {
            if column.as_ref().len() != n {
                return Err(SegError::invalid_input(format!(
                    "ragged columns: column {dim} has {} values, expected {n}",
                    column.as_ref().len()
                )));
            }
        }

        let mut values = Vec::with_capacity(n.saturating_mul(d));
        for t in 0..n {
            for column in columns {
                values.push(column.as_ref()[t]);
            }
        }
        Ok(Self { values, n, d })
    }

    pub fn univariate(values: &[f64]) -> Result<Self, SegError> {
        if values.is_empty() {
            return Err(SegError::invalid_input("n must be >= 1"));
        }
        Ok(Self {
            values: values.to_vec(),
            n: values.len(),
            d: 1,
        })
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn d(&self) -> usize {
        self.d
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    /// Borrows the buffer as a row-major view.
    pub fn view(&self) -> TimeSeriesView<'_> {
        TimeSeriesView {
            values: DTypeView::F64(&self.values),
            n: self.n,
            d: self.d,
            layout: MemoryLayout::CContiguous,
        }
    }
}
