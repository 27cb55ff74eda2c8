// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

/// Running sum with optional Kahan compensation.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct Accumulator {
    sum: f64,
    compensation: f64,
}

impl Accumulator {
    pub(crate) fn add(&mut self, value: f64, compensated: bool) {
        if !compensated {
            self.sum += value;
            return;
        }
        let y = value - self.compensation;
        let t = self.sum + y;
        self.compensation = (t - self.sum) - y;
        self.sum = t;
    }

    pub(crate) fn value(&self) -> f64 {
        self.sum
    }
}
