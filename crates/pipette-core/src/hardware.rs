//! Seams to the physical robot.
//!
//! The engine never moves anything itself. It resolves wells through a
//! [`Deck`], drives one [`Actuator`] per mount, and talks to the operator
//! through a [`Host`]. The [`crate::sim`] module provides recording
//! implementations of all three.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Top-of-well offset used for blow-outs and above-well dispenses (mm).
pub const TOP_OFFSET: f64 = -5.0;

/// A well on the deck, as resolved by the [`Deck`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WellRef {
    pub slot: String,
    pub well: String,
}

impl WellRef {
    pub fn new(slot: impl Into<String>, well: impl Into<String>) -> Self {
        Self {
            slot: slot.into(),
            well: well.into(),
        }
    }

    /// Point `height` mm above the well bottom.
    pub fn bottom(&self, height: f64) -> Location {
        Location::Well {
            well: self.clone(),
            anchor: Anchor::Bottom(height),
        }
    }

    /// Point `offset` mm relative to the well top (negative is inside).
    pub fn top(&self, offset: f64) -> Location {
        Location::Well {
            well: self.clone(),
            anchor: Anchor::Top(offset),
        }
    }
}

impl fmt::Display for WellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in slot {}", self.well, self.slot)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "from", content = "mm", rename_all = "snake_case")]
pub enum Anchor {
    Bottom(f64),
    Top(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Location {
    Well { well: WellRef, anchor: Anchor },
    Trash,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Well {
                well,
                anchor: Anchor::Bottom(h),
            } => write!(f, "{}{} bottom+{h:.1}", well.slot, well.well),
            Location::Well {
                well,
                anchor: Anchor::Top(h),
            } => write!(f, "{}{} top{h:+.1}", well.slot, well.well),
            Location::Trash => f.write_str("trash"),
        }
    }
}

/// One tip position in a tip rack.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TipLocation {
    pub rack: String,
    pub well: String,
}

impl fmt::Display for TipLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.rack, self.well)
    }
}

/// Resolves plan coordinates to deck locations.
pub trait Deck {
    /// Resolve a (slot, well) pair. Fails when no labware is loaded in the
    /// slot or the well does not exist on it.
    fn resolve(&self, slot: &str, well: &str) -> Result<WellRef>;

    fn trash(&self) -> Location {
        Location::Trash
    }
}

/// A single-channel pipette on one mount.
///
/// Every method blocks until the motion completes. An error is a physical
/// failure and aborts the run; liquid already aspirated is not recovered.
pub trait Actuator {
    fn has_tip(&self) -> bool;

    /// Pick up a tip, at `tip` when given or at the next tip the robot tracks.
    fn pick_up_tip(&mut self, tip: Option<&TipLocation>) -> Result<()>;

    /// Drop the tip, into the trash when `location` is `None`.
    fn drop_tip(&mut self, location: Option<&Location>) -> Result<()>;

    /// Put the tip back where it was picked up.
    fn return_tip(&mut self) -> Result<()>;

    /// Forget which tips were used; called after the operator refills racks.
    fn reset_tip_inventory(&mut self) -> Result<()>;

    fn aspirate(&mut self, volume: f64, location: &Location, rate: f64) -> Result<()>;

    fn dispense(&mut self, volume: f64, location: &Location, rate: f64) -> Result<()>;

    fn mix(&mut self, cycles: u32, volume: f64, location: &Location, rate: f64) -> Result<()>;

    /// Touch the tip to the well walls `depth` mm below the top.
    fn touch_tip(&mut self, well: &WellRef, depth: f64) -> Result<()>;

    fn blow_out(&mut self, location: &Location) -> Result<()>;

    fn home(&mut self) -> Result<()>;
}

/// Operator-facing side of the robot.
pub trait Host {
    /// Block until the operator acknowledges. Never times out.
    fn pause(&mut self, message: &str);

    fn set_lights(&mut self, on: bool);

    fn delay(&mut self, seconds: f64);

    fn comment(&mut self, message: &str);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_display() {
        let w = WellRef::new("3", "B2");
        assert_eq!(w.bottom(1.0).to_string(), "3B2 bottom+1.0");
        assert_eq!(w.top(TOP_OFFSET).to_string(), "3B2 top-5.0");
        assert_eq!(Location::Trash.to_string(), "trash");
        assert_eq!(w.to_string(), "B2 in slot 3");
    }

    #[test]
    fn location_yaml_is_tagged() {
        let yaml = serde_yaml::to_string(&WellRef::new("1", "A1").bottom(2.0)).unwrap();
        assert!(yaml.contains("type: well"));
        assert!(yaml.contains("from: bottom"));
    }
}
