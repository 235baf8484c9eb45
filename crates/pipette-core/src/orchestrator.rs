//! Run driver: preflight, verification, the batching main loop, finalize.

use crate::carryover::{self, LEG_CEILING};
use crate::config::RunConfig;
use crate::error::{PipetteError, Result};
use crate::executor::{source_mix_cycles, Executor, Robot};
use crate::plan::{SourceMix, TransferRequest};
use crate::report::{RunReport, RunWarning};
use crate::selector;
use crate::state::RunState;
use crate::types::{Mount, RunPhase};

/// Checks that must pass before anything moves. Returns the warnings that
/// do not stop the run.
pub fn preflight(config: &RunConfig, plan: &[TransferRequest]) -> Result<Vec<RunWarning>> {
    config.check()?;
    let policy = &config.policy;
    let smallest = config.smallest_min();

    let mut warnings = Vec::new();
    if !policy.safety_catch {
        warnings.push(RunWarning {
            line: None,
            message: "safety catch is off: a clean simulation does not certify the plan"
                .to_string(),
        });
    }

    for req in plan {
        if req.volume < smallest {
            return Err(PipetteError::VolumeBelowRange {
                line: req.line,
                volume: req.volume,
                min: smallest,
            });
        }

        if let SourceMix::Volume(volume) = req.source_mix {
            let mount = selector::select(config.profiles(), volume)?.mount;
            let max = config.profile(mount)?.max_volume;
            let cycles = source_mix_cycles(volume, max);
            if policy.safety_catch && cycles > policy.mix_cycle_limit {
                return Err(PipetteError::MixCycleLimit {
                    line: req.line,
                    volume,
                    cycles,
                    limit: policy.mix_cycle_limit,
                });
            }
        }

        let selection = selector::select(config.profiles(), req.volume)?;
        if selection.overflow {
            let max = config.profile(selection.mount)?.max_volume;
            let required = carryover::required_legs(req.volume, max);
            let limit = if policy.strict_carryover {
                policy.max_carryover.min(LEG_CEILING)
            } else {
                LEG_CEILING
            };
            if required > limit {
                return Err(PipetteError::CarryoverOverflow {
                    line: req.line,
                    volume: req.volume,
                    required,
                    limit,
                });
            }
        }
    }
    Ok(warnings)
}

pub struct Orchestrator<'a> {
    exec: Executor<'a>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(config: &'a RunConfig, robot: Robot) -> Result<Self> {
        let state = RunState::new(config)?;
        Ok(Self {
            exec: Executor::new(state, robot),
        })
    }

    /// Execute `plan` in order and report what happened.
    pub fn run(mut self, plan: &[TransferRequest]) -> Result<RunReport> {
        let config = self.exec.state.config;
        for warning in preflight(config, plan)? {
            self.exec.warn(warning.line, warning.message);
        }
        tracing::info!(
            rows = plan.len(),
            safety_catch = config.policy.safety_catch,
            "run started"
        );

        self.exec.lights(RunPhase::Init);
        if config.policy.initial_verification {
            self.verify(plan)?;
        }
        self.exec.lights(RunPhase::Run);

        let mut cache: Vec<TransferRequest> = Vec::new();
        for req in plan {
            cache.push(req.clone());
            if self.exec.assess(&cache)? {
                continue;
            }
            match cache.len() {
                1 => {
                    self.exec.transfer(&cache[0])?;
                    cache.clear();
                }
                2 => {
                    self.exec.transfer(&cache[0])?;
                    cache.remove(0);
                }
                _ => {
                    let Some(newest) = cache.pop() else {
                        continue;
                    };
                    self.exec.distribute(&cache)?;
                    cache.clear();
                    cache.push(newest);
                }
            }
        }
        match cache.len() {
            0 => {}
            1 => self.exec.transfer(&cache[0])?,
            _ => self.exec.distribute(&cache)?,
        }

        self.finalize()
    }

    /// Each pipette picks its first-rack verification tip, mixes once above
    /// the first source and puts the tip back.
    fn verify(&mut self, plan: &[TransferRequest]) -> Result<()> {
        let Some(first) = plan.first() else {
            return Ok(());
        };
        tracing::info!("verifying tip rack positions");
        let well = self.exec.robot.resolve(&first.source)?;
        let mounts: Vec<Mount> = self.exec.state.config.pipettes.keys().copied().collect();
        for mount in mounts {
            self.exec.verify_mount(mount, Some(&well))?;
        }
        self.exec.robot.host.comment(
            "Tip rack verification: pause now if a pipette did not pick up the expected tip.",
        );
        Ok(())
    }

    fn finalize(mut self) -> Result<RunReport> {
        let policy = self.exec.state.policy();
        let mounts: Vec<Mount> = self.exec.robot.actuators.keys().copied().collect();
        for mount in mounts {
            if !self.exec.robot.has_tip(mount) {
                continue;
            }
            if policy.return_tips_at_end {
                self.exec.robot.actuator(mount)?.return_tip()?;
            } else {
                self.exec.drop_tip(mount)?;
            }
        }
        self.exec.lights(RunPhase::End);

        let mut report = self.exec.report;
        report.finish();
        let summary = format!(
            "Run complete: {} transfers, {} distributes, {} tips used.",
            report.transfers,
            report.distributes,
            report.total_tips()
        );
        tracing::info!("{summary}");
        self.exec.robot.host.comment(&summary);
        Ok(report)
    }
}

/// Convenience wrapper: build an [`Orchestrator`] and run `plan`.
pub fn run(config: &RunConfig, robot: Robot, plan: &[TransferRequest]) -> Result<RunReport> {
    Orchestrator::new(config, robot)?.run(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Policy;
    use crate::plan::WellSpec;
    use crate::profile::ActuatorProfile;
    use crate::sim::{SimEvent, SimRig};

    fn config(policy: Policy) -> RunConfig {
        RunConfig::new(policy)
            .with_pipette(
                Mount::Left,
                ActuatorProfile::new("p20", 1.0, 20.0),
                vec!["1".into()],
                96,
            )
            .with_pipette(
                Mount::Right,
                ActuatorProfile::new("p300", 20.0, 300.0),
                vec!["2".into()],
                96,
            )
    }

    fn row(line: usize, src: &str, dest: &str, volume: f64) -> TransferRequest {
        TransferRequest::new(
            line,
            WellSpec::new("plate", "3", src),
            1.0,
            WellSpec::new("plate", "4", dest),
            volume,
        )
    }

    #[test]
    fn volume_below_every_minimum_is_rejected() {
        let cfg = RunConfig::new(Policy::default()).with_pipette(
            Mount::Right,
            ActuatorProfile::new("p300", 20.0, 300.0),
            vec!["2".into()],
            96,
        );
        assert!(matches!(
            preflight(&cfg, &[row(2, "A1", "B1", 5.0)]),
            Err(PipetteError::VolumeBelowRange { line: 2, .. })
        ));
    }

    #[test]
    fn mix_cycle_limit_under_safety_catch() {
        let cfg = config(Policy::default());
        let mut req = row(2, "A1", "B1", 50.0);
        req.source_mix = SourceMix::Volume(1500.0);
        assert!(matches!(
            preflight(&cfg, &[req.clone()]),
            Err(PipetteError::MixCycleLimit { cycles: 50, limit: 30, .. })
        ));

        let cfg = config(Policy {
            safety_catch: false,
            ..Policy::default()
        });
        let warnings = preflight(&cfg, &[req]).unwrap();
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn strict_carryover_fails_early() {
        let cfg = config(Policy {
            strict_carryover: true,
            ..Policy::default()
        });
        assert!(matches!(
            preflight(&cfg, &[row(2, "A1", "B1", 1800.0)]),
            Err(PipetteError::CarryoverOverflow { required: 6, limit: 5, .. })
        ));
        assert!(preflight(&cfg, &[row(2, "A1", "B1", 1500.0)]).is_ok());
    }

    #[test]
    fn absurd_leg_count_fails_early_without_strict_carryover() {
        let cfg = config(Policy {
            safety_catch: false,
            ..Policy::default()
        });
        let volume = 300.0 * (LEG_CEILING + 1) as f64;
        assert!(matches!(
            preflight(&cfg, &[row(2, "A1", "B1", volume)]),
            Err(PipetteError::CarryoverOverflow { limit: LEG_CEILING, .. })
        ));
        assert!(preflight(&cfg, &[row(2, "A1", "B1", 1800.0)]).is_ok());
    }

    #[test]
    fn empty_plan_only_toggles_lights() {
        let cfg = config(Policy::default());
        let sim = SimRig::new();
        let report = run(&cfg, sim.robot(&cfg), &[]).unwrap();
        assert_eq!(report.transfers, 0);
        assert!(report.finished_at.is_some());
        assert_eq!(sim.count(|e| matches!(e, SimEvent::PickUpTip { .. })), 0);
    }

    #[test]
    fn verification_returns_tips_and_drops_at_end() {
        let cfg = config(Policy::default());
        let sim = SimRig::new();
        let report = run(&cfg, sim.robot(&cfg), &[row(2, "A1", "B1", 10.0)]).unwrap();
        assert_eq!(sim.count(|e| matches!(e, SimEvent::ReturnTip { .. })), 2);
        assert_eq!(sim.count(|e| matches!(e, SimEvent::DropTip { .. })), 1);
        assert_eq!(report.transfers, 1);
        assert_eq!(report.total_tips(), 1);
    }

    #[test]
    fn lights_follow_mode() {
        let cfg = config(Policy::default());
        let sim = SimRig::new();
        run(&cfg, sim.robot(&cfg), &[row(2, "A1", "B1", 10.0)]).unwrap();
        let lights: Vec<bool> = sim
            .events()
            .iter()
            .filter_map(|e| match e {
                SimEvent::Lights { on } => Some(*on),
                _ => None,
            })
            .collect();
        // run_off: init on, run off, end on
        assert_eq!(lights, vec![true, false, true]);
    }

    #[test]
    fn two_rows_that_cannot_batch_run_as_transfers() {
        let cfg = config(Policy::default());
        let sim = SimRig::new();
        let plan = [row(2, "A1", "B1", 10.0), row(3, "A2", "B2", 10.0)];
        let report = run(&cfg, sim.robot(&cfg), &plan).unwrap();
        assert_eq!(report.transfers, 2);
        assert_eq!(report.distributes, 0);
    }

    #[test]
    fn flush_distributes_all_but_newest() {
        let cfg = config(Policy {
            distribute_above: 5.0,
            ..Policy::default()
        });
        let sim = SimRig::new();
        let plan = [
            row(2, "A1", "B1", 50.0),
            row(3, "A1", "B2", 50.0),
            row(4, "A1", "B3", 50.0),
            row(5, "A2", "B4", 50.0),
        ];
        let report = run(&cfg, sim.robot(&cfg), &plan).unwrap();
        assert_eq!(report.distributes, 1);
        assert_eq!(report.transfers, 1);
        assert_eq!(report.dispenses, 4);
        assert_eq!(report.aspirates, 2);
    }
}
