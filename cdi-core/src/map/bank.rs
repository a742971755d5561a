//! Double-buffered ignition map.
//!
//! Rebuilds always land in the shadow slot and become visible with a single
//! index flip, so a reader never observes a half-written table.

use crate::calibration::CalibrationSelectors;

use super::IgnitionMap;

#[derive(Clone, Debug)]
pub struct MapBank {
    slots: [IgnitionMap; 2],
    active: usize,
    built_from: CalibrationSelectors,
    generation: u32,
}

impl MapBank {
    /// Creates a bank whose active map is built for `selectors`.
    #[must_use]
    pub fn new(selectors: CalibrationSelectors) -> Self {
        Self {
            slots: [IgnitionMap::build(selectors), IgnitionMap::empty()],
            active: 0,
            built_from: selectors,
            generation: 0,
        }
    }

    #[must_use]
    pub fn active(&self) -> &IgnitionMap {
        &self.slots[self.active]
    }

    /// Selectors the active map was built from.
    #[must_use]
    pub const fn built_from(&self) -> CalibrationSelectors {
        self.built_from
    }

    /// Number of swaps since construction.
    #[must_use]
    pub const fn generation(&self) -> u32 {
        self.generation
    }

    /// Rebuilds into the shadow slot and swaps it in.
    pub fn rebuild(&mut self, selectors: CalibrationSelectors) {
        self.slots[self.active ^ 1].rebuild(selectors);
        self.swap(selectors);
    }

    /// Rebuilds only when the selectors moved since the last build.
    pub fn refresh(&mut self, selectors: CalibrationSelectors) -> bool {
        if selectors == self.built_from {
            return false;
        }
        self.rebuild(selectors);
        true
    }

    /// Copies a map built elsewhere into the shadow slot and swaps it in.
    pub fn install(&mut self, map: &IgnitionMap, selectors: CalibrationSelectors) {
        self.slots[self.active ^ 1].copy_from(map);
        self.swap(selectors);
    }

    fn swap(&mut self, selectors: CalibrationSelectors) {
        self.active ^= 1;
        self.built_from = selectors;
        self.generation = self.generation.wrapping_add(1);
    }
}
