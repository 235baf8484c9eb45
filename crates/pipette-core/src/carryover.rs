use serde::Serialize;

/// Leg volumes for one logical transfer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CarryoverPlan {
    pub volumes: Vec<f64>,
    /// Cycles the volume needs at this pipette's maximum.
    pub required_cycles: u32,
    /// The cycle count was cut to the limit; legs may exceed the maximum.
    pub clamped: bool,
}

impl CarryoverPlan {
    pub fn cycles(&self) -> usize {
        self.volumes.len()
    }

    pub fn exceeds_limit(&self, max_cycles: u32) -> bool {
        self.required_cycles > max_cycles
    }

    pub fn total(&self) -> f64 {
        self.volumes.iter().sum()
    }
}

/// Most legs a single transfer may be split into, whatever the policy.
pub const LEG_CEILING: u32 = 1000;

/// Legs `volume` needs on a pipette holding `max`. Saturates at `u32::MAX`.
pub fn required_legs(volume: f64, max: f64) -> u32 {
    if volume <= max {
        1
    } else {
        (volume / max).ceil() as u32
    }
}

/// Split `volume` into legs no larger than `max` where possible.
///
/// The irregular remainder goes first and every later leg carries the same
/// rounded-up unit. When rounding up would leave nothing for the first leg
/// the volume is split evenly instead. With `safety_catch` and more than
/// `max_cycles` legs required, the count is clamped to `max_cycles` (the
/// total is kept, so the legs then exceed `max`). The count never exceeds
/// [`LEG_CEILING`].
pub fn split(volume: f64, max: f64, max_cycles: u32, safety_catch: bool) -> CarryoverPlan {
    let required = required_legs(volume, max);
    if required == 1 {
        return CarryoverPlan {
            volumes: vec![volume],
            required_cycles: 1,
            clamped: false,
        };
    }

    let mut cycles = required;
    if safety_catch && required > max_cycles {
        cycles = max_cycles.max(1);
    }
    cycles = cycles.min(LEG_CEILING);

    let n = cycles as f64;
    let rounded = (volume / n).ceil();
    let first = volume - (n - 1.0) * rounded;
    let volumes = if first > 0.0 {
        let mut volumes = Vec::with_capacity(cycles as usize);
        volumes.push(first);
        volumes.extend(std::iter::repeat(rounded).take(cycles as usize - 1));
        volumes
    } else {
        vec![volume / n; cycles as usize]
    };
    tracing::debug!(volume, required, ?volumes, "carryover split");

    CarryoverPlan {
        volumes,
        required_cycles: required,
        clamped: cycles != required,
    }
}
