// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use ggs_core::SegError;

/// SplitMix64 generator; identical sequences on every platform for a given seed.
#[derive(Clone, Copy, Debug)]
pub(crate) struct StableRng {
    state: u64,
}

impl StableRng {
    pub(crate) fn new(seed: u64) -> Self {
        Self {
            state: seed.wrapping_add(0x9e3779b97f4a7c15),
        }
    }

    pub(crate) fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9e3779b97f4a7c15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
        z ^ (z >> 31)
    }

    pub(crate) fn gen_range(&mut self, upper_exclusive: usize) -> Result<usize, SegError> {
        if upper_exclusive == 0 {
            return Err(SegError::invalid_input(
                "StableRng.gen_range requires upper_exclusive >= 1; got 0",
            ));
        }

        let value = self.next_u64();
        let modulus = u64::try_from(upper_exclusive)
            .map_err(|_| SegError::resource_limit("rng upper_exclusive conversion overflow"))?;
        let sampled = value % modulus;
        usize::try_from(sampled)
            .map_err(|_| SegError::resource_limit("rng sampled index conversion overflow"))
    }

    /// Fisher-Yates shuffle, walking from the back.
    pub(crate) fn shuffle<T>(&mut self, items: &mut [T]) -> Result<(), SegError> {
        for i in (1..items.len()).rev() {
            let j = self.gen_range(i + 1)?;
            items.swap(i, j);
        }
        Ok(())
    }
}
