use crate::config::{Policy, RunConfig};
use crate::error::{PipetteError, Result};
use crate::hardware::TipLocation;
use crate::plan::WellSpec;
use crate::profile::ActuatorProfile;
use crate::selector::{self, Selection};
use crate::tips::TipInventory;
use crate::types::Mount;
use std::collections::{BTreeMap, HashSet};

// ---------------------------------------------------------------------------
// Contamination tracking
// ---------------------------------------------------------------------------

/// (slot, well) identity of a source or destination.
pub type WellKey = (String, String);

pub fn well_key(spec: &WellSpec) -> WellKey {
    (spec.slot.clone(), spec.well.clone())
}

#[derive(Debug, Clone, Default)]
pub struct TipHygiene {
    pub last_source: Option<WellKey>,
    /// The tip touched destination liquid.
    pub dirty: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ContaminationTracker {
    mounts: BTreeMap<Mount, TipHygiene>,
    dest_history: HashSet<WellKey>,
}

impl ContaminationTracker {
    pub fn is_dirty(&self, mount: Mount) -> bool {
        self.mounts.get(&mount).map(|h| h.dirty).unwrap_or(false)
    }

    pub fn mark_dirty(&mut self, mount: Mount) {
        self.mounts.entry(mount).or_default().dirty = true;
    }

    pub fn mark_clean(&mut self, mount: Mount) {
        self.mounts.entry(mount).or_default().dirty = false;
    }

    pub fn same_source(&self, mount: Mount, source: &WellSpec) -> bool {
        self.mounts
            .get(&mount)
            .and_then(|h| h.last_source.as_ref())
            .map(|(slot, well)| *slot == source.slot && *well == source.well)
            .unwrap_or(false)
    }

    pub fn set_last_source(&mut self, mount: Mount, source: &WellSpec) {
        self.mounts.entry(mount).or_default().last_source = Some(well_key(source));
    }

    pub fn served(&self, dest: &WellSpec) -> bool {
        self.dest_history.contains(&well_key(dest))
    }

    pub fn record_destination(&mut self, dest: &WellSpec) {
        self.dest_history.insert(well_key(dest));
    }

    pub fn destinations_served(&self) -> usize {
        self.dest_history.len()
    }
}

// ---------------------------------------------------------------------------
// RunState
// ---------------------------------------------------------------------------

/// The mutable state of one run. Created at start, discarded at the end.
#[derive(Debug)]
pub struct RunState<'a> {
    pub config: &'a RunConfig,
    pub active: Option<Mount>,
    pub previous: Option<Mount>,
    pub tips: BTreeMap<Mount, TipInventory>,
    pub contamination: ContaminationTracker,
}

/// Result of [`RunState::select_mount`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MountChange {
    pub mount: Mount,
    pub overflow: bool,
    pub switched: bool,
    /// The mount that was active before a switch.
    pub previous: Option<Mount>,
}

impl<'a> RunState<'a> {
    pub fn new(config: &'a RunConfig) -> Result<Self> {
        config.check()?;
        let mut tips = BTreeMap::new();
        for (mount, rig) in &config.pipettes {
            tips.insert(
                *mount,
                TipInventory::new(*mount, rig.tipracks.clone(), rig.tip_last)?,
            );
        }
        Ok(Self {
            config,
            active: None,
            previous: None,
            tips,
            contamination: ContaminationTracker::default(),
        })
    }

    pub fn policy(&self) -> &'a Policy {
        &self.config.policy
    }

    pub fn profile(&self, mount: Mount) -> Result<&'a ActuatorProfile> {
        self.config.profile(mount)
    }

    /// Resolve the pipette for `volume` and make it active.
    pub fn select_mount(&mut self, volume: f64) -> Result<MountChange> {
        let Selection { mount, overflow } = selector::select(self.config.profiles(), volume)?;
        Ok(self.activate(mount, overflow))
    }

    /// Make `mount` active regardless of volume.
    pub fn activate(&mut self, mount: Mount, overflow: bool) -> MountChange {
        let switched = self.active != Some(mount);
        let previous = if switched { self.active } else { self.previous };
        if switched {
            self.previous = self.active;
            self.active = Some(mount);
            tracing::debug!(%mount, "pipette selected");
        }
        MountChange {
            mount,
            overflow,
            switched,
            previous,
        }
    }

    pub fn acquire_tip(&mut self, mount: Mount) -> Result<TipLocation> {
        self.tips
            .get_mut(&mount)
            .ok_or(PipetteError::MountNotInstalled(mount))?
            .acquire()
    }

    pub fn reset_tips(&mut self, mount: Mount) -> Result<()> {
        self.tips
            .get_mut(&mount)
            .ok_or(PipetteError::MountNotInstalled(mount))?
            .reset();
        Ok(())
    }

    /// A destination counts as filled unless history is kept and it has not
    /// been written to yet in this run.
    pub fn dest_filled(&self, dest: &WellSpec) -> bool {
        !self.policy().store_dest_history || self.contamination.served(dest)
    }
}
