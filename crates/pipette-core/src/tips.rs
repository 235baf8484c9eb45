//! Per-pipette tip rack bookkeeping.
//!
//! The first rack may be partially used when the run starts. Its last
//! usable position is configured, and tips are taken from it backward (the
//! highest remaining position first) until it is empty. The remaining racks
//! are then consumed forward from A1, in the order they were supplied.
//!
//! After an operator refill every rack is full and the whole set is walked
//! forward from the first rack's A1.

use crate::error::{PipetteError, Result};
use crate::hardware::TipLocation;
use crate::types::Mount;
use crate::well::{self, WELL_COUNT};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct TipInventory {
    mount: Mount,
    racks: Vec<String>,
    consumed: u32,
    first_rack_last: u32,
    first_rack_mode: bool,
    max: u32,
    refilled: bool,
}

impl TipInventory {
    pub fn new(mount: Mount, racks: Vec<String>, first_rack_last: u32) -> Result<Self> {
        if racks.is_empty() {
            return Err(PipetteError::InvalidConfig(format!(
                "{mount} pipette has no tip racks"
            )));
        }
        if first_rack_last == 0 || first_rack_last > WELL_COUNT {
            return Err(PipetteError::InvalidTipIndex(first_rack_last));
        }
        let max = (racks.len() as u32 - 1) * WELL_COUNT + first_rack_last;
        Ok(Self {
            mount,
            racks,
            consumed: 0,
            first_rack_last,
            first_rack_mode: true,
            max,
            refilled: false,
        })
    }

    pub fn mount(&self) -> Mount {
        self.mount
    }

    pub fn consumed(&self) -> u32 {
        self.consumed
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn remaining(&self) -> u32 {
        self.max - self.consumed
    }

    pub fn in_first_rack_mode(&self) -> bool {
        self.first_rack_mode
    }

    pub fn racks(&self) -> &[String] {
        &self.racks
    }

    /// Take the next tip. `TipsExhausted` means the operator must refill and
    /// [`reset`](Self::reset) before retrying.
    pub fn acquire(&mut self) -> Result<TipLocation> {
        if self.consumed == self.max {
            return Err(PipetteError::TipsExhausted(self.mount));
        }
        self.consumed += 1;

        let (rack, index) = if self.first_rack_mode && self.consumed <= self.first_rack_last {
            let index = if self.first_rack_last == WELL_COUNT {
                // A full first rack is walked like any other.
                self.consumed
            } else {
                self.first_rack_last - self.consumed + 1
            };
            if self.consumed == self.first_rack_last {
                self.first_rack_mode = false;
                tracing::debug!(
                    mount = %self.mount,
                    "first tip rack is empty; continuing from A1 of the next rack"
                );
            }
            (0, index)
        } else {
            let (rack_offset, skipped) = if self.refilled {
                (0, 0)
            } else {
                (1, self.first_rack_last)
            };
            let k = self.consumed - skipped - 1;
            (rack_offset + (k / WELL_COUNT) as usize, k % WELL_COUNT + 1)
        };

        Ok(TipLocation {
            rack: self.racks[rack].clone(),
            well: well::to_label(index)?,
        })
    }

    /// The tip the initial verification step picks: the first rack's last
    /// usable position.
    pub fn verification_tip(&self) -> Result<TipLocation> {
        let index = if self.refilled { 1 } else { self.first_rack_last };
        Ok(TipLocation {
            rack: self.racks[0].clone(),
            well: well::to_label(index)?,
        })
    }

    /// All racks were refilled by the operator.
    pub fn reset(&mut self) {
        self.consumed = 0;
        self.first_rack_mode = false;
        self.refilled = true;
        self.max = self.racks.len() as u32 * WELL_COUNT;
    }
}
