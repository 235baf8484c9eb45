//! Recording simulator for the hardware seams.
//!
//! All parts of a [`SimRig`] append to one shared event log. Operator pauses
//! are acknowledged immediately. The actuator refuses physically impossible
//! commands (no tip, double pick-up, dispensing more than it holds) with
//! [`PipetteError::Hardware`], which makes it useful as a dry-run checker.

use crate::config::RunConfig;
use crate::error::{PipetteError, Result};
use crate::executor::Robot;
use crate::hardware::{Actuator, Deck, Host, Location, TipLocation, WellRef};
use crate::types::Mount;
use crate::well;
use serde::Serialize;
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

const VOLUME_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum SimEvent {
    PickUpTip {
        mount: Mount,
        tip: Option<TipLocation>,
    },
    DropTip {
        mount: Mount,
        location: Option<Location>,
    },
    ReturnTip {
        mount: Mount,
    },
    ResetTips {
        mount: Mount,
    },
    Aspirate {
        mount: Mount,
        volume: f64,
        location: Location,
        rate: f64,
    },
    Dispense {
        mount: Mount,
        volume: f64,
        location: Location,
        rate: f64,
    },
    Mix {
        mount: Mount,
        cycles: u32,
        volume: f64,
        location: Location,
        rate: f64,
    },
    TouchTip {
        mount: Mount,
        well: WellRef,
        depth: f64,
    },
    BlowOut {
        mount: Mount,
        location: Location,
    },
    Home {
        mount: Mount,
    },
    Pause {
        message: String,
    },
    Lights {
        on: bool,
    },
    Delay {
        seconds: f64,
    },
    Comment {
        message: String,
    },
}

impl SimEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SimEvent::PickUpTip { .. } => "pick_up_tip",
            SimEvent::DropTip { .. } => "drop_tip",
            SimEvent::ReturnTip { .. } => "return_tip",
            SimEvent::ResetTips { .. } => "reset_tips",
            SimEvent::Aspirate { .. } => "aspirate",
            SimEvent::Dispense { .. } => "dispense",
            SimEvent::Mix { .. } => "mix",
            SimEvent::TouchTip { .. } => "touch_tip",
            SimEvent::BlowOut { .. } => "blow_out",
            SimEvent::Home { .. } => "home",
            SimEvent::Pause { .. } => "pause",
            SimEvent::Lights { .. } => "lights",
            SimEvent::Delay { .. } => "delay",
            SimEvent::Comment { .. } => "comment",
        }
    }

    pub fn mount(&self) -> Option<Mount> {
        match self {
            SimEvent::PickUpTip { mount, .. }
            | SimEvent::DropTip { mount, .. }
            | SimEvent::ReturnTip { mount }
            | SimEvent::ResetTips { mount }
            | SimEvent::Aspirate { mount, .. }
            | SimEvent::Dispense { mount, .. }
            | SimEvent::Mix { mount, .. }
            | SimEvent::TouchTip { mount, .. }
            | SimEvent::BlowOut { mount, .. }
            | SimEvent::Home { mount } => Some(*mount),
            _ => None,
        }
    }

    /// Human-readable arguments, for tables.
    pub fn detail(&self) -> String {
        match self {
            SimEvent::PickUpTip { tip, .. } => tip
                .as_ref()
                .map(|t| t.to_string())
                .unwrap_or_else(|| "next".into()),
            SimEvent::DropTip { location, .. } => location
                .as_ref()
                .map(|l| l.to_string())
                .unwrap_or_else(|| "trash".into()),
            SimEvent::ReturnTip { .. } | SimEvent::ResetTips { .. } | SimEvent::Home { .. } => {
                String::new()
            }
            SimEvent::Aspirate {
                volume,
                location,
                rate,
                ..
            }
            | SimEvent::Dispense {
                volume,
                location,
                rate,
                ..
            } => format!("{volume:.1} µL @ {location} x{rate}"),
            SimEvent::Mix {
                cycles,
                volume,
                location,
                ..
            } => format!("{cycles} x {volume:.1} µL @ {location}"),
            SimEvent::TouchTip { well, depth, .. } => format!("{well} -{depth} mm"),
            SimEvent::BlowOut { location, .. } => location.to_string(),
            SimEvent::Pause { message } | SimEvent::Comment { message } => message.clone(),
            SimEvent::Lights { on } => (if *on { "on" } else { "off" }).to_string(),
            SimEvent::Delay { seconds } => format!("{seconds} s"),
        }
    }
}

type Log = Rc<RefCell<Vec<SimEvent>>>;

// ---------------------------------------------------------------------------
// SimRig
// ---------------------------------------------------------------------------

/// Factory for simulator parts sharing one log.
#[derive(Debug, Clone, Default)]
pub struct SimRig {
    log: Log,
    slots: Option<BTreeSet<String>>,
}

impl SimRig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only the given slots hold labware; resolving any other slot fails.
    pub fn with_slots<I, S>(mut self, slots: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.slots = Some(slots.into_iter().map(Into::into).collect());
        self
    }

    pub fn deck(&self) -> SimDeck {
        SimDeck {
            slots: self.slots.clone(),
        }
    }

    pub fn actuator(&self, mount: Mount) -> SimActuator {
        SimActuator {
            mount,
            log: Rc::clone(&self.log),
            tip: false,
            held: 0.0,
        }
    }

    pub fn host(&self) -> SimHost {
        SimHost {
            log: Rc::clone(&self.log),
        }
    }

    /// A robot with one simulated actuator per configured mount.
    pub fn robot(&self, config: &RunConfig) -> Robot {
        let mut robot = Robot::new(Box::new(self.deck()), Box::new(self.host()));
        for mount in config.pipettes.keys() {
            robot = robot.with_actuator(*mount, Box::new(self.actuator(*mount)));
        }
        robot
    }

    pub fn events(&self) -> Vec<SimEvent> {
        self.log.borrow().clone()
    }

    pub fn count(&self, predicate: impl Fn(&SimEvent) -> bool) -> usize {
        self.log.borrow().iter().filter(|e| predicate(e)).count()
    }
}

// ---------------------------------------------------------------------------
// Parts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SimDeck {
    slots: Option<BTreeSet<String>>,
}

impl Deck for SimDeck {
    fn resolve(&self, slot: &str, well_label: &str) -> Result<WellRef> {
        if let Some(slots) = &self.slots {
            if !slots.contains(slot) {
                return Err(PipetteError::InvalidConfig(format!(
                    "no labware loaded in slot {slot}"
                )));
            }
        }
        Ok(WellRef::new(slot, well::normalize(well_label)?))
    }
}

#[derive(Debug)]
pub struct SimActuator {
    mount: Mount,
    log: Log,
    tip: bool,
    /// Liquid and air currently in the tip (µL).
    held: f64,
}

impl SimActuator {
    fn record(&self, event: SimEvent) {
        self.log.borrow_mut().push(event);
    }

    fn require_volume(&self, action: &str, volume: f64) -> Result<()> {
        if volume > 0.0 {
            Ok(())
        } else {
            Err(PipetteError::Hardware(format!(
                "{} pipette cannot {action} {volume} µL",
                self.mount
            )))
        }
    }

    fn require_tip(&self, action: &str) -> Result<()> {
        if self.tip {
            Ok(())
        } else {
            Err(PipetteError::Hardware(format!(
                "{} pipette cannot {action} without a tip",
                self.mount
            )))
        }
    }
}

impl Actuator for SimActuator {
    fn has_tip(&self) -> bool {
        self.tip
    }

    fn pick_up_tip(&mut self, tip: Option<&TipLocation>) -> Result<()> {
        if self.tip {
            return Err(PipetteError::Hardware(format!(
                "{} pipette already holds a tip",
                self.mount
            )));
        }
        self.tip = true;
        self.held = 0.0;
        self.record(SimEvent::PickUpTip {
            mount: self.mount,
            tip: tip.cloned(),
        });
        Ok(())
    }

    fn drop_tip(&mut self, location: Option<&Location>) -> Result<()> {
        self.require_tip("drop a tip")?;
        self.tip = false;
        self.held = 0.0;
        self.record(SimEvent::DropTip {
            mount: self.mount,
            location: location.cloned(),
        });
        Ok(())
    }

    fn return_tip(&mut self) -> Result<()> {
        self.require_tip("return a tip")?;
        self.tip = false;
        self.held = 0.0;
        self.record(SimEvent::ReturnTip { mount: self.mount });
        Ok(())
    }

    fn reset_tip_inventory(&mut self) -> Result<()> {
        self.record(SimEvent::ResetTips { mount: self.mount });
        Ok(())
    }

    fn aspirate(&mut self, volume: f64, location: &Location, rate: f64) -> Result<()> {
        self.require_tip("aspirate")?;
        self.require_volume("aspirate", volume)?;
        self.held += volume;
        self.record(SimEvent::Aspirate {
            mount: self.mount,
            volume,
            location: location.clone(),
            rate,
        });
        Ok(())
    }

    fn dispense(&mut self, volume: f64, location: &Location, rate: f64) -> Result<()> {
        self.require_tip("dispense")?;
        self.require_volume("dispense", volume)?;
        if volume > self.held + VOLUME_EPSILON {
            return Err(PipetteError::Hardware(format!(
                "{} pipette cannot dispense {volume} µL holding {} µL",
                self.mount, self.held
            )));
        }
        self.held = (self.held - volume).max(0.0);
        self.record(SimEvent::Dispense {
            mount: self.mount,
            volume,
            location: location.clone(),
            rate,
        });
        Ok(())
    }

    fn mix(&mut self, cycles: u32, volume: f64, location: &Location, rate: f64) -> Result<()> {
        self.require_tip("mix")?;
        self.record(SimEvent::Mix {
            mount: self.mount,
            cycles,
            volume,
            location: location.clone(),
            rate,
        });
        Ok(())
    }

    fn touch_tip(&mut self, well: &WellRef, depth: f64) -> Result<()> {
        self.require_tip("touch")?;
        self.record(SimEvent::TouchTip {
            mount: self.mount,
            well: well.clone(),
            depth,
        });
        Ok(())
    }

    fn blow_out(&mut self, location: &Location) -> Result<()> {
        self.require_tip("blow out")?;
        self.held = 0.0;
        self.record(SimEvent::BlowOut {
            mount: self.mount,
            location: location.clone(),
        });
        Ok(())
    }

    fn home(&mut self) -> Result<()> {
        self.record(SimEvent::Home { mount: self.mount });
        Ok(())
    }
}

#[derive(Debug)]
pub struct SimHost {
    log: Log,
}

impl Host for SimHost {
    fn pause(&mut self, message: &str) {
        tracing::info!("pause acknowledged: {message}");
        self.log.borrow_mut().push(SimEvent::Pause {
            message: message.to_string(),
        });
    }

    fn set_lights(&mut self, on: bool) {
        self.log.borrow_mut().push(SimEvent::Lights { on });
    }

    fn delay(&mut self, seconds: f64) {
        self.log.borrow_mut().push(SimEvent::Delay { seconds });
    }

    fn comment(&mut self, message: &str) {
        self.log.borrow_mut().push(SimEvent::Comment {
            message: message.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actuator_refuses_without_tip() {
        let rig = SimRig::new();
        let mut p = rig.actuator(Mount::Left);
        let loc = WellRef::new("1", "A1").bottom(1.0);
        assert!(matches!(
            p.aspirate(10.0, &loc, 1.0),
            Err(PipetteError::Hardware(_))
        ));
        p.pick_up_tip(None).unwrap();
        assert!(p.pick_up_tip(None).is_err());
        p.aspirate(10.0, &loc, 1.0).unwrap();
        assert!(p.dispense(11.0, &loc, 1.0).is_err());
        p.dispense(10.0, &loc, 1.0).unwrap();
        p.drop_tip(None).unwrap();
        assert!(!p.has_tip());
        assert_eq!(rig.events().len(), 4);
    }

    #[test]
    fn actuator_refuses_empty_volumes() {
        let rig = SimRig::new();
        let mut p = rig.actuator(Mount::Left);
        let loc = WellRef::new("1", "A1").bottom(1.0);
        p.pick_up_tip(None).unwrap();
        assert!(matches!(
            p.aspirate(-0.5, &loc, 1.0),
            Err(PipetteError::Hardware(_))
        ));
        assert!(p.aspirate(0.0, &loc, 1.0).is_err());
        p.aspirate(5.0, &loc, 1.0).unwrap();
        assert!(p.dispense(0.0, &loc, 1.0).is_err());
        assert_eq!(rig.count(|e| matches!(e, SimEvent::Aspirate { .. })), 1);
    }

    #[test]
    fn parts_share_one_log() {
        let rig = SimRig::new();
        let mut host = rig.host();
        let mut p = rig.actuator(Mount::Right);
        host.set_lights(true);
        p.home().unwrap();
        host.pause("refill");
        let names: Vec<&str> = rig.events().iter().map(|e| e.name()).collect();
        assert_eq!(names, ["lights", "home", "pause"]);
        assert_eq!(rig.events()[1].mount(), Some(Mount::Right));
    }

    #[test]
    fn deck_checks_slots_and_wells() {
        let deck = SimRig::new().with_slots(["1", "2"]).deck();
        assert_eq!(deck.resolve("1", "a01").unwrap(), WellRef::new("1", "A1"));
        assert!(deck.resolve("3", "A1").is_err());
        assert!(deck.resolve("1", "Q1").is_err());
    }

    #[test]
    fn event_detail_for_tables() {
        let e = SimEvent::Aspirate {
            mount: Mount::Left,
            volume: 12.5,
            location: WellRef::new("2", "B1").bottom(1.0),
            rate: 1.0,
        };
        assert_eq!(e.detail(), "12.5 µL @ 2B1 bottom+1.0 x1");
    }
}
