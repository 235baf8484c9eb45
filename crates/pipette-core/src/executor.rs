//! Pipette-level execution of single transfers.
//!
//! [`Executor`] owns the run state and the robot and is the only place that
//! issues actuator commands. Tip selection, source mixing and the per-leg
//! transfer step live here; batching lives in [`crate::distribute`].

use crate::carryover;
use crate::error::{PipetteError, Result};
use crate::hardware::{Actuator, Deck, Host, WellRef, TOP_OFFSET};
use crate::plan::{SourceMix, TransferRequest, WellSpec};
use crate::report::{RunReport, RunWarning};
use crate::state::{MountChange, RunState};
use crate::types::{Mount, RunPhase, TipReuse};
use std::collections::BTreeMap;
use std::f64::consts::PI;

/// Seconds to wait after the verification mix.
pub const VERIFICATION_DELAY: f64 = 3.0;

/// The physical side of a run: deck, one actuator per mount, operator host.
pub struct Robot {
    pub deck: Box<dyn Deck>,
    pub actuators: BTreeMap<Mount, Box<dyn Actuator>>,
    pub host: Box<dyn Host>,
}

impl Robot {
    pub fn new(deck: Box<dyn Deck>, host: Box<dyn Host>) -> Self {
        Self {
            deck,
            actuators: BTreeMap::new(),
            host,
        }
    }

    pub fn with_actuator(mut self, mount: Mount, actuator: Box<dyn Actuator>) -> Self {
        self.actuators.insert(mount, actuator);
        self
    }

    pub fn actuator(&mut self, mount: Mount) -> Result<&mut dyn Actuator> {
        match self.actuators.get_mut(&mount) {
            Some(a) => Ok(a.as_mut()),
            None => Err(PipetteError::MountNotInstalled(mount)),
        }
    }

    pub fn has_tip(&self, mount: Mount) -> bool {
        self.actuators
            .get(&mount)
            .map(|a| a.has_tip())
            .unwrap_or(false)
    }

    pub fn resolve(&self, spec: &WellSpec) -> Result<WellRef> {
        self.deck.resolve(&spec.slot, &spec.well)
    }
}

/// Dispense height for an unspecified destination height: the diameter of a
/// spherical droplet of `volume` minus 1 mm, kept within 1..=3 mm.
pub fn droplet_height(volume: f64) -> f64 {
    let diameter = 2.0 * (3.0 * volume / (4.0 * PI)).cbrt();
    (diameter - 1.0).clamp(1.0, 3.0)
}

/// Mixing cycles for a source mix of `volume` on a pipette holding `max`.
pub fn source_mix_cycles(volume: f64, max: f64) -> u32 {
    ((10.0 * volume / max).round() as u32).max(10)
}

pub struct Executor<'a> {
    pub state: RunState<'a>,
    pub robot: Robot,
    pub report: RunReport,
}

impl<'a> Executor<'a> {
    pub fn new(state: RunState<'a>, robot: Robot) -> Self {
        Self {
            state,
            robot,
            report: RunReport::start(),
        }
    }

    // -----------------------------------------------------------------------
    // Operator channel
    // -----------------------------------------------------------------------

    /// Detail note: always traced, echoed to the host with `detail_comment`.
    pub(crate) fn note(&mut self, message: &str) {
        tracing::debug!("{message}");
        if self.state.policy().detail_comment {
            self.robot.host.comment(message);
        }
    }

    pub(crate) fn warn(&mut self, line: Option<usize>, message: impl Into<String>) {
        let warning = RunWarning {
            line,
            message: message.into(),
        };
        tracing::warn!("{warning}");
        self.robot.host.comment(&format!("WARNING: {warning}"));
        self.report.warnings.push(warning);
    }

    pub fn lights(&mut self, phase: RunPhase) {
        let on = self.state.policy().light_on.lit(phase);
        self.robot.host.set_lights(on);
    }

    pub(crate) fn step_delay(&mut self) {
        let delay = self.state.policy().step_delay;
        if delay > 0.0 {
            self.robot.host.delay(delay);
        }
    }

    pub(crate) fn blow_out(&mut self, mount: Mount, well: &WellRef) -> Result<()> {
        for _ in 0..self.state.policy().blowout_cycle {
            self.robot.actuator(mount)?.blow_out(&well.top(TOP_OFFSET))?;
        }
        Ok(())
    }

    /// Lights to the pause state, home, wait for the operator, lights back.
    pub fn manual_mix_pause(&mut self, source: &WellSpec) -> Result<()> {
        self.lights(RunPhase::Pause);
        for actuator in self.robot.actuators.values_mut() {
            actuator.home()?;
        }
        self.robot.host.pause(&format!(
            "Mix the source {} in slot {} manually, spin it down and resume.",
            source.well, source.slot
        ));
        self.lights(RunPhase::Run);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Tips
    // -----------------------------------------------------------------------

    /// Pick up the next tip for `mount`, pausing for a refill on exhaustion.
    pub fn acquire_tip(&mut self, mount: Mount) -> Result<()> {
        loop {
            match self.state.acquire_tip(mount) {
                Ok(tip) => {
                    self.robot.actuator(mount)?.pick_up_tip(Some(&tip))?;
                    self.state.contamination.mark_clean(mount);
                    self.report.tip_used(mount);
                    self.note(&format!("{mount} pipette picked up tip {tip}"));
                    return Ok(());
                }
                Err(PipetteError::TipsExhausted(m)) => self.refill(m)?,
                Err(e) => return Err(e),
            }
        }
    }

    fn refill(&mut self, mount: Mount) -> Result<()> {
        tracing::info!(%mount, "tip racks exhausted; waiting for refill");
        self.lights(RunPhase::Pause);
        let racks = self
            .state
            .tips
            .get(&mount)
            .map(|t| t.racks().join(", "))
            .unwrap_or_default();
        self.robot.host.pause(&format!(
            "Replace the empty tip racks of the {mount} pipette (slots {racks}) and resume."
        ));
        if self.state.policy().initial_verification {
            let mounts: Vec<Mount> = self.state.config.pipettes.keys().copied().collect();
            for installed in mounts {
                // a mount still holding a tip is kept as is
                if self.robot.has_tip(installed) {
                    continue;
                }
                self.verify_mount(installed, None)?;
            }
        }
        self.robot.actuator(mount)?.reset_tip_inventory()?;
        self.state.reset_tips(mount)?;
        self.report.refills += 1;
        self.lights(RunPhase::Run);
        Ok(())
    }

    pub fn drop_tip(&mut self, mount: Mount) -> Result<()> {
        self.robot.actuator(mount)?.drop_tip(None)?;
        self.state.contamination.mark_clean(mount);
        Ok(())
    }

    /// Pick the verification tip, mix once with the minimum volume above
    /// `target` (when given), wait and put the tip back.
    pub fn verify_mount(&mut self, mount: Mount, target: Option<&WellRef>) -> Result<()> {
        let tip = self
            .state
            .tips
            .get(&mount)
            .ok_or(PipetteError::MountNotInstalled(mount))?
            .verification_tip()?;
        let min = self.state.profile(mount)?.min_volume;
        let rate = self.state.policy().pipette_rate;
        self.note(&format!("verifying {mount} pipette with tip {tip}"));
        let actuator = self.robot.actuator(mount)?;
        actuator.pick_up_tip(Some(&tip))?;
        if let Some(well) = target {
            actuator.mix(1, min, &well.top(TOP_OFFSET), rate)?;
        }
        self.robot.host.delay(VERIFICATION_DELAY);
        self.robot.actuator(mount)?.return_tip()?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Selection
    // -----------------------------------------------------------------------

    /// Make the right pipette active for `req` holding a usable tip.
    ///
    /// `force_once` keeps a held tip unconditionally when it just mixed this
    /// request's source on the same pipette.
    pub fn select_for_request(&mut self, req: &TransferRequest, force_once: bool) -> Result<Mount> {
        let change = self.state.select_mount(req.volume)?;
        self.prepare_tip(change, &req.source, force_once)
    }

    /// Apply the tip rules to an already chosen pipette.
    pub fn prepare_tip(
        &mut self,
        change: MountChange,
        source: &WellSpec,
        force_once: bool,
    ) -> Result<Mount> {
        let policy = self.state.policy();
        let mount = change.mount;

        if change.switched && policy.drop_dirtytip && policy.tip_reuse != TipReuse::Never {
            if let Some(previous) = change.previous {
                if self.robot.has_tip(previous) {
                    self.note(&format!("{previous} pipette is idle; dropping its tip"));
                    self.drop_tip(previous)?;
                }
            }
        }

        if self.robot.has_tip(mount) {
            let same_source = self.state.contamination.same_source(mount, source);
            let keep = force_once && !change.switched && same_source;
            if !keep {
                let replace = match policy.tip_reuse {
                    TipReuse::Always => true,
                    TipReuse::Once => self.state.contamination.is_dirty(mount) || !same_source,
                    TipReuse::Never => false,
                };
                if replace {
                    self.drop_tip(mount)?;
                    self.acquire_tip(mount)?;
                }
            }
        } else {
            self.acquire_tip(mount)?;
        }

        self.state.contamination.set_last_source(mount, source);
        Ok(mount)
    }

    // -----------------------------------------------------------------------
    // Source mix
    // -----------------------------------------------------------------------

    /// Mix `source` with `volume` using the pipette chosen for that volume.
    pub fn mix_source(
        &mut self,
        line: usize,
        source: &WellSpec,
        height: f64,
        volume: f64,
        rate: f64,
    ) -> Result<Mount> {
        let change = self.state.select_mount(volume)?;
        let mount = self.prepare_tip(change, source, false)?;
        let max = self.state.profile(mount)?.max_volume;
        let cycles = source_mix_cycles(volume, max);
        let limit = self.state.policy().mix_cycle_limit;
        if cycles > limit {
            self.warn(
                Some(line),
                format!(
                    "mixing {volume} µL needs {cycles} cycles (limit {limit}); \
                     mix manually with a source mix of 0 or install a larger pipette"
                ),
            );
        }
        let well = self.robot.resolve(source)?;
        self.note(&format!("mixing {well} {cycles} times with {} µL", volume.min(max)));
        self.robot
            .actuator(mount)?
            .mix(cycles, volume.min(max), &well.bottom(height), rate)?;
        self.step_delay();
        self.blow_out(mount, &well)?;
        Ok(mount)
    }

    /// Run the row's source mix. Returns whether the following selection
    /// may keep the mixing tip.
    pub fn source_mix(&mut self, req: &TransferRequest) -> Result<bool> {
        match req.source_mix {
            SourceMix::None => Ok(false),
            SourceMix::Manual => {
                self.manual_mix_pause(&req.source)?;
                Ok(false)
            }
            SourceMix::Volume(volume) => {
                let rate = self.rate(req);
                self.mix_source(req.line, &req.source, req.source_height, volume, rate)?;
                Ok(self.state.policy().mix_same_tip)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Transfer
    // -----------------------------------------------------------------------

    pub fn rate(&self, req: &TransferRequest) -> f64 {
        req.rate.unwrap_or(self.state.policy().pipette_rate)
    }

    /// Execute one request as a single (possibly carried-over) transfer.
    pub fn transfer(&mut self, req: &TransferRequest) -> Result<()> {
        let force_once = self.source_mix(req)?;
        let mount = self.select_for_request(req, force_once)?;
        let policy = self.state.policy();
        let max = self.state.profile(mount)?.max_volume;

        let plan = carryover::split(req.volume, max, policy.max_carryover, policy.safety_catch);
        if plan.exceeds_limit(policy.max_carryover) {
            self.warn(
                Some(req.line),
                format!(
                    "{} µL needs {} carryover cycles on the {mount} pipette (limit {})",
                    req.volume, plan.required_cycles, policy.max_carryover
                ),
            );
        }

        let source = self.robot.resolve(&req.source)?;
        let dest = self.robot.resolve(&req.dest)?;
        let filled = self.state.dest_filled(&req.dest);
        if !filled {
            self.note(&format!("line {}: destination {dest} is empty", req.line));
        }
        let carry = plan.cycles() > 1;
        for leg in &plan.volumes {
            self.transfer_step(mount, req, &source, &dest, *leg, filled, carry)?;
        }

        self.state.contamination.record_destination(&req.dest);
        self.report.transfers += 1;
        Ok(())
    }

    /// One aspirate/dispense leg of a transfer.
    #[allow(clippy::too_many_arguments)]
    pub fn transfer_step(
        &mut self,
        mount: Mount,
        req: &TransferRequest,
        source: &WellRef,
        dest: &WellRef,
        volume: f64,
        dest_filled: bool,
        carryover: bool,
    ) -> Result<()> {
        let policy = self.state.policy();
        let max = self.state.profile(mount)?.max_volume;
        let rate = self.rate(req);
        let forced_mix = req.dest_height.is_some() || req.mix_after.is_some();
        let mix_cycles = req.mix_after.unwrap_or(policy.mix_after_cycle);

        if !self.robot.has_tip(mount) {
            self.acquire_tip(mount)?;
        }

        self.robot
            .actuator(mount)?
            .aspirate(volume, &source.bottom(req.source_height), rate)?;
        self.report.aspirates += 1;
        self.step_delay();
        if req.touch.touches_source() {
            self.robot
                .actuator(mount)?
                .touch_tip(source, req.touch_depth_or_default())?;
        }

        if volume > policy.blowout_above && !forced_mix {
            self.robot
                .actuator(mount)?
                .dispense(volume, &dest.top(TOP_OFFSET), rate)?;
        } else {
            let height = req.dest_height.unwrap_or_else(|| droplet_height(volume));
            self.robot
                .actuator(mount)?
                .dispense(volume, &dest.bottom(height), rate)?;
            if dest_filled || forced_mix {
                self.state.contamination.mark_dirty(mount);
                if mix_cycles != 0 {
                    let mix_height = req.dest_height.unwrap_or(1.0);
                    self.robot.actuator(mount)?.mix(
                        mix_cycles,
                        volume.min(max),
                        &dest.bottom(mix_height),
                        rate,
                    )?;
                }
            }
        }
        self.report.dispenses += 1;
        self.step_delay();
        self.blow_out(mount, dest)?;

        if req.touch.touches_destination() {
            self.robot
                .actuator(mount)?
                .touch_tip(dest, req.touch_depth_or_default())?;
            if dest_filled {
                self.state.contamination.mark_dirty(mount);
            }
        }

        if carryover
            && self.state.contamination.is_dirty(mount)
            && policy.tip_reuse != TipReuse::Never
        {
            self.note(&format!("line {}: dirty tip replaced between carryover legs", req.line));
            self.drop_tip(mount)?;
        }
        Ok(())
    }
}
