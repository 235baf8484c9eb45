//! Batching consecutive same-source requests into one aspirate.
//!
//! [`distributable`] decides whether a candidate batch (the cached rows plus
//! the newest one) may be served by a single aspirate of `Σv + min`, and
//! [`Executor::distribute`] performs it. The flush rules that decide when a
//! batch is executed live in the orchestrator's main loop.

use crate::error::{PipetteError, Result};
use crate::executor::{droplet_height, Executor};
use crate::hardware::TOP_OFFSET;
use crate::plan::{SourceMix, TransferRequest};
use crate::state::RunState;
use crate::types::{Mount, TipReuse};

/// Verdict for a candidate batch plus the warnings it raised.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Assessment {
    pub distributable: bool,
    pub warnings: Vec<String>,
}

fn min_volume(batch: &[TransferRequest]) -> f64 {
    batch.iter().map(|r| r.volume).fold(f64::INFINITY, f64::min)
}

/// The smallest pipette that can aspirate the whole batch plus its own
/// minimum as residual, while still reaching the smallest dispense.
pub fn batch_actuator(batch: &[TransferRequest], state: &RunState) -> Option<Mount> {
    let total: f64 = batch.iter().map(|r| r.volume).sum();
    let smallest = min_volume(batch);
    state
        .config
        .profiles()
        .filter(|(_, p)| p.covers(smallest) && total + p.min_volume <= p.max_volume)
        .min_by(|a, b| a.1.max_volume.total_cmp(&b.1.max_volume))
        .map(|(mount, _)| mount)
}

/// Decide whether `batch` can be distributed. The last row is the newest.
pub fn distributable(batch: &[TransferRequest], state: &RunState) -> Result<Assessment> {
    let mut assessment = Assessment::default();
    let (Some(first), Some(last)) = (batch.first(), batch.last()) else {
        return Ok(assessment);
    };
    let policy = state.policy();

    let capacity = batch_actuator(batch, state).is_some();
    let same_source = first.source.key() == last.source.key();

    let earlier = &batch[..batch.len() - 1];
    let repeated_dest = earlier.iter().any(|r| r.dest.key() == last.dest.key());
    let fresh_dest =
        policy.store_dest_history && !state.contamination.served(&last.dest) && !repeated_dest;
    let from_above = last.volume > policy.blowout_above
        && !last.touch.touches_destination()
        && last.dest_height.is_none()
        && last.mix_after.is_none();
    let clean_dest = fresh_dest || from_above;
    let volume_floor = min_volume(batch) >= policy.distribute_above;

    match last.distribute {
        Some(false) => return Ok(assessment),
        Some(true) => {
            if policy.safety_catch && policy.tip_reuse != TipReuse::Never {
                return Err(PipetteError::CrossContaminationRisk {
                    line: last.line,
                    reason: "distribute is forced by the plan while tips are replaced; \
                             clear the override or set tip_reuse to never"
                        .to_string(),
                });
            }
            assessment
                .warnings
                .push("distribute forced by the plan; cross-contamination may happen".to_string());
            assessment.distributable = same_source && capacity;
            return Ok(assessment);
        }
        None => {}
    }

    assessment.distributable = capacity && same_source && clean_dest && volume_floor;
    if assessment.distributable && batch.len() > 1 {
        let mixed = last.source_mix != SourceMix::None;
        let touch_differs = last.touch.touches_source() != first.touch.touches_source();
        let options_differ = last.source_height != first.source_height
            || last.touch_depth != first.touch_depth
            || last.rate != first.rate
            || last.mix_after != first.mix_after;
        if mixed || touch_differs || options_differ {
            assessment.warnings.push(
                "inconsistent options within a distribute batch \
                 (source mix, source touch, rate or aspirate height); the safest are used"
                    .to_string(),
            );
        }
    }
    Ok(assessment)
}

impl<'a> Executor<'a> {
    /// Run [`distributable`] and record its warnings against the newest row.
    pub fn assess(&mut self, batch: &[TransferRequest]) -> Result<bool> {
        let assessment = distributable(batch, &self.state)?;
        let line = batch.last().map(|r| r.line);
        for message in assessment.warnings {
            self.warn(line, message);
        }
        Ok(assessment.distributable)
    }

    /// Tip went into liquid it must not carry back to the source.
    fn contaminated(&mut self, mount: Mount, line: usize, message: &str) -> Result<()> {
        self.state.contamination.mark_dirty(mount);
        let policy = self.state.policy();
        if policy.safety_catch && policy.tip_reuse != TipReuse::Never {
            return Err(PipetteError::CrossContaminationRisk {
                line,
                reason: message.to_string(),
            });
        }
        self.warn(Some(line), message);
        Ok(())
    }

    /// Serve every row of `batch` from one aspirate at the shared source.
    pub fn distribute(&mut self, batch: &[TransferRequest]) -> Result<()> {
        let Some(first) = batch.first() else {
            return Ok(());
        };
        let last_line = batch.last().map(|r| r.line).unwrap_or(first.line);
        let policy = self.state.policy();
        let mount = batch_actuator(batch, &self.state).ok_or_else(|| {
            PipetteError::InvalidConfig(format!(
                "lines {}-{last_line}: no pipette can hold the distribute batch",
                first.line
            ))
        })?;
        tracing::info!(
            lines = batch.len(),
            first = first.line,
            %mount,
            "distributing"
        );

        // Filled status is decided before this batch enters the history.
        let mut filled = Vec::with_capacity(batch.len());
        for (i, r) in batch.iter().enumerate() {
            let repeated = batch[..i].iter().any(|p| p.dest.key() == r.dest.key());
            let is_filled = self.state.dest_filled(&r.dest) || repeated;
            if !is_filled {
                self.note(&format!("line {}: destination is empty", r.line));
            }
            filled.push(is_filled);
        }
        for r in batch {
            self.state.contamination.record_destination(&r.dest);
        }

        let source_height = batch
            .iter()
            .map(|r| r.source_height)
            .fold(f64::INFINITY, f64::min);
        let rate = batch
            .iter()
            .map(|r| self.rate(r))
            .fold(f64::INFINITY, f64::min);

        // Source mix for the whole batch: a manual pause wins over any volume.
        let manual = batch.iter().any(|r| r.source_mix == SourceMix::Manual);
        let mix_volume = batch
            .iter()
            .filter_map(|r| match r.source_mix {
                SourceMix::Volume(v) => Some(v),
                _ => None,
            })
            .reduce(f64::max);
        let mut force_once = false;
        if manual {
            self.manual_mix_pause(&first.source)?;
        } else if let Some(volume) = mix_volume {
            self.mix_source(first.line, &first.source, source_height, volume, rate)?;
            force_once = policy.mix_same_tip;
        }

        let change = self.state.activate(mount, false);
        let mount = self.prepare_tip(change, &first.source, force_once)?;
        let profile = self.state.profile(mount)?;
        let (min, max) = (profile.min_volume, profile.max_volume);
        let total = batch.iter().map(|r| r.volume).sum::<f64>() + min;

        let source = self.robot.resolve(&first.source)?;
        self.robot
            .actuator(mount)?
            .aspirate(total, &source.bottom(source_height), rate)?;
        self.report.aspirates += 1;
        self.step_delay();
        if let Some(toucher) = batch.iter().find(|r| r.touch.touches_source()) {
            self.robot
                .actuator(mount)?
                .touch_tip(&source, toucher.touch_depth_or_default())?;
        }

        let mut last_dest = None;
        for (r, dest_filled) in batch.iter().zip(filled) {
            let dest = self.robot.resolve(&r.dest)?;
            let forced = r.dest_height.is_some() || r.mix_after.is_some();
            let cycles = r.mix_after.unwrap_or(policy.mix_after_cycle);
            let mix_after = forced && cycles != 0;

            if r.volume > policy.blowout_above && !mix_after {
                self.robot
                    .actuator(mount)?
                    .dispense(r.volume, &dest.top(TOP_OFFSET), rate)?;
            } else {
                let height = r.dest_height.unwrap_or_else(|| droplet_height(r.volume));
                self.robot
                    .actuator(mount)?
                    .dispense(r.volume, &dest.bottom(height), rate)?;
                if dest_filled {
                    self.contaminated(
                        mount,
                        r.line,
                        "tip dipped into a filled destination during distribute",
                    )?;
                } else if mix_after {
                    let mix_height = r.dest_height.unwrap_or(1.0);
                    self.robot.actuator(mount)?.mix(
                        cycles,
                        r.volume.min(max),
                        &dest.bottom(mix_height),
                        rate,
                    )?;
                }
            }
            self.report.dispenses += 1;
            self.step_delay();

            if r.touch.touches_destination() {
                self.robot
                    .actuator(mount)?
                    .touch_tip(&dest, r.touch_depth_or_default())?;
                if dest_filled {
                    self.contaminated(
                        mount,
                        r.line,
                        "tip touched a filled destination during distribute",
                    )?;
                }
            }
            last_dest = Some(dest);
        }

        let dirty = self.state.contamination.is_dirty(mount);
        if policy.return_source && (!dirty || policy.tip_reuse == TipReuse::Never) {
            let returned = match (&last_dest, policy.residual_air_gap) {
                (Some(dest), true) => {
                    self.robot
                        .actuator(mount)?
                        .aspirate(min, &dest.top(TOP_OFFSET), rate)?;
                    min * 2.0
                }
                _ => min,
            };
            self.robot
                .actuator(mount)?
                .dispense(returned, &source.top(TOP_OFFSET), rate)?;
            self.step_delay();
            for _ in 0..policy.blowout_cycle {
                self.robot.actuator(mount)?.blow_out(&source.top(TOP_OFFSET))?;
            }
        } else {
            let trash = self.robot.deck.trash();
            self.robot.actuator(mount)?.blow_out(&trash)?;
            if dirty {
                self.note("residual not returned to the source: the tip is dirty");
            }
        }

        self.report.distributes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Policy, RunConfig};
    use crate::hardware::Location;
    use crate::plan::WellSpec;
    use crate::profile::ActuatorProfile;
    use crate::sim::{SimEvent, SimRig};
    use crate::types::TouchMode;

    fn policy() -> Policy {
        Policy {
            distribute_above: 50.0,
            ..Policy::default()
        }
    }

    fn config(policy: Policy) -> RunConfig {
        RunConfig::new(policy).with_pipette(
            Mount::Left,
            ActuatorProfile::new("p1000", 100.0, 1000.0),
            vec!["1".into()],
            96,
        )
    }

    fn row(line: usize, src_slot: &str, dest: &str, volume: f64) -> TransferRequest {
        TransferRequest::new(
            line,
            WellSpec::new("plate", src_slot, "A1"),
            1.0,
            WellSpec::new("plate", "4", dest),
            volume,
        )
    }

    fn batch() -> Vec<TransferRequest> {
        vec![
            row(2, "3", "B1", 100.0),
            row(3, "3", "B2", 100.0),
            row(4, "3", "B3", 100.0),
        ]
    }

    #[test]
    fn same_source_fresh_destinations_are_distributable() {
        let cfg = config(policy());
        let state = RunState::new(&cfg).unwrap();
        let a = distributable(&batch(), &state).unwrap();
        assert!(a.distributable);
        assert!(a.warnings.is_empty());
    }

    #[test]
    fn different_last_source_breaks_the_batch() {
        let cfg = config(policy());
        let state = RunState::new(&cfg).unwrap();
        let mut rows = batch();
        rows[2].source.slot = "5".into();
        assert!(!distributable(&rows, &state).unwrap().distributable);
    }

    #[test]
    fn volume_floor_and_capacity() {
        let cfg = config(Policy::default());
        let state = RunState::new(&cfg).unwrap();
        // default distribute_above is 1000
        assert!(!distributable(&batch(), &state).unwrap().distributable);

        let cfg = config(policy());
        let state = RunState::new(&cfg).unwrap();
        let big: Vec<_> = (0..10).map(|i| row(i + 2, "3", "C1", 100.0)).collect();
        assert!(batch_actuator(&big, &state).is_none());
    }

    #[test]
    fn repeated_destination_in_batch_is_not_clean() {
        let cfg = config(Policy {
            distribute_above: 20.0,
            ..Policy::default()
        });
        let state = RunState::new(&cfg).unwrap();
        let mut rows = batch();
        rows[2].dest.well = "B1".into();
        rows[2].volume = 40.0;
        assert!(!distributable(&rows, &state).unwrap().distributable);
    }

    #[test]
    fn override_forbid_and_force() {
        let cfg = config(policy());
        let state = RunState::new(&cfg).unwrap();
        let mut rows = batch();
        rows[2].distribute = Some(false);
        assert!(!distributable(&rows, &state).unwrap().distributable);

        rows[2].distribute = Some(true);
        assert!(matches!(
            distributable(&rows, &state),
            Err(PipetteError::CrossContaminationRisk { line: 4, .. })
        ));

        let cfg = config(Policy {
            safety_catch: false,
            ..policy()
        });
        let state = RunState::new(&cfg).unwrap();
        let a = distributable(&rows, &state).unwrap();
        assert!(a.distributable);
        assert_eq!(a.warnings.len(), 1);
    }

    #[test]
    fn inconsistent_options_only_warn() {
        let cfg = config(policy());
        let state = RunState::new(&cfg).unwrap();
        let mut rows = batch();
        rows[2].touch = TouchMode::Source;
        let a = distributable(&rows, &state).unwrap();
        assert!(a.distributable);
        assert_eq!(a.warnings.len(), 1);
    }

    #[test]
    fn distribute_aspirates_once_and_returns_residual() {
        let cfg = config(policy());
        let sim = SimRig::new();
        let mut exec = Executor::new(RunState::new(&cfg).unwrap(), sim.robot(&cfg));
        exec.distribute(&batch()).unwrap();

        let aspirates: Vec<f64> = sim
            .events()
            .iter()
            .filter_map(|e| match e {
                SimEvent::Aspirate { volume, .. } => Some(*volume),
                _ => None,
            })
            .collect();
        // 300 + min, then the air gap
        assert_eq!(aspirates, vec![400.0, 100.0]);
        assert_eq!(
            sim.count(|e| matches!(e, SimEvent::Dispense { volume, .. } if *volume == 100.0)),
            3
        );
        assert!(sim.events().iter().any(|e| matches!(
            e,
            SimEvent::Dispense { volume, location, .. }
                if *volume == 200.0 && location.to_string() == "3A1 top-5.0"
        )));
        assert_eq!(exec.report.aspirates, 1);
        assert_eq!(exec.report.dispenses, 3);
        assert_eq!(exec.report.distributes, 1);
        assert_eq!(exec.state.contamination.destinations_served(), 3);
    }

    #[test]
    fn filled_destination_is_fatal_under_safety_catch() {
        let cfg = config(policy());
        let sim = SimRig::new();
        let mut exec = Executor::new(RunState::new(&cfg).unwrap(), sim.robot(&cfg));
        let rows = vec![row(2, "3", "B1", 100.0), row(3, "3", "B2", 40.0)];
        exec.state.contamination.record_destination(&rows[1].dest);
        assert!(matches!(
            exec.distribute(&rows),
            Err(PipetteError::CrossContaminationRisk { line: 3, .. })
        ));
    }

    #[test]
    fn dirty_residual_goes_to_trash_without_safety_catch() {
        let cfg = config(Policy {
            safety_catch: false,
            ..policy()
        });
        let sim = SimRig::new();
        let mut exec = Executor::new(RunState::new(&cfg).unwrap(), sim.robot(&cfg));
        let rows = vec![row(2, "3", "B1", 100.0), row(3, "3", "B2", 40.0)];
        exec.state.contamination.record_destination(&rows[1].dest);
        exec.distribute(&rows).unwrap();
        assert!(exec.report.has_warning("filled destination"));
        assert!(sim.events().iter().any(|e| matches!(
            e,
            SimEvent::BlowOut { location: Location::Trash, .. }
        )));
    }

    fn returned_to_source(sim: &SimRig) -> Vec<f64> {
        sim.events()
            .iter()
            .filter_map(|e| match e {
                SimEvent::Dispense { volume, location, .. }
                    if location.to_string() == "3A1 top-5.0" =>
                {
                    Some(*volume)
                }
                _ => None,
            })
            .collect()
    }

    #[test]
    fn residual_without_air_gap_dispenses_minimum_at_source() {
        let cfg = config(Policy {
            residual_air_gap: false,
            ..policy()
        });
        let sim = SimRig::new();
        let mut exec = Executor::new(RunState::new(&cfg).unwrap(), sim.robot(&cfg));
        exec.distribute(&batch()).unwrap();

        assert_eq!(sim.count(|e| matches!(e, SimEvent::Aspirate { .. })), 1);
        assert_eq!(returned_to_source(&sim), vec![100.0]);
        assert_eq!(exec.report.dispenses, 3);
    }

    #[test]
    fn clean_residual_goes_to_trash_without_return_source() {
        let cfg = config(Policy {
            return_source: false,
            ..policy()
        });
        let sim = SimRig::new();
        let mut exec = Executor::new(RunState::new(&cfg).unwrap(), sim.robot(&cfg));
        exec.distribute(&batch()).unwrap();

        assert!(!exec.state.contamination.is_dirty(Mount::Left));
        assert!(returned_to_source(&sim).is_empty());
        assert_eq!(sim.count(|e| matches!(e, SimEvent::Aspirate { .. })), 1);
        assert!(sim.events().iter().any(|e| matches!(
            e,
            SimEvent::BlowOut { location: Location::Trash, .. }
        )));
    }
}
