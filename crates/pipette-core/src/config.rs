use crate::error::{PipetteError, Result};
use crate::profile::ActuatorProfile;
use crate::types::{LightMode, Mount, TipReuse, TipType};
use crate::well;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Fully resolved run policy. Immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub tip_reuse: TipReuse,
    /// Volumes above this are dispensed from above the destination.
    pub blowout_above: f64,
    pub blowout_cycle: u32,
    pub max_carryover: u32,
    pub mix_after_cycle: u32,
    /// Drop the tip of the idle pipette when the other one takes over.
    pub drop_dirtytip: bool,
    pub mix_cycle_limit: u32,
    /// Smallest per-destination volume eligible for distribute.
    pub distribute_above: f64,
    pub return_source: bool,
    pub store_dest_history: bool,
    /// Seconds to wait after aspirating and before blowing out.
    pub step_delay: f64,
    pub pipette_rate: f64,
    pub mix_same_tip: bool,
    pub safety_catch: bool,
    pub initial_verification: bool,
    pub light_on: LightMode,
    pub detail_comment: bool,
    pub return_tips_at_end: bool,
    /// Reject plans whose carryover exceeds `max_carryover` before any motion.
    pub strict_carryover: bool,
    /// Draw an air gap above the last destination before returning the residual.
    pub residual_air_gap: bool,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            tip_reuse: TipReuse::Once,
            blowout_above: 50.0,
            blowout_cycle: 2,
            max_carryover: 5,
            mix_after_cycle: 1,
            drop_dirtytip: true,
            mix_cycle_limit: 30,
            distribute_above: 1000.0,
            return_source: true,
            store_dest_history: true,
            step_delay: 0.0,
            pipette_rate: 1.0,
            mix_same_tip: true,
            safety_catch: true,
            initial_verification: true,
            light_on: LightMode::RunOff,
            detail_comment: false,
            return_tips_at_end: false,
            strict_carryover: false,
            residual_air_gap: true,
        }
    }
}

impl Policy {
    /// Hard defaults, then the mode preset, then user overrides.
    pub fn resolve(mode: Mode, overrides: &PolicyOverrides) -> Self {
        let mut policy = Policy::default();
        policy.apply(&mode.preset());
        policy.apply(overrides);
        policy
    }

    pub fn apply(&mut self, o: &PolicyOverrides) {
        if let Some(v) = o.tip_reuse {
            self.tip_reuse = v;
        }
        if let Some(v) = o.blowout_above {
            self.blowout_above = v;
        }
        if let Some(v) = o.blowout_cycle {
            self.blowout_cycle = v;
        }
        if let Some(v) = o.max_carryover {
            self.max_carryover = v;
        }
        if let Some(v) = o.mix_after_cycle {
            self.mix_after_cycle = v;
        }
        if let Some(v) = o.drop_dirtytip {
            self.drop_dirtytip = v;
        }
        if let Some(v) = o.mix_cycle_limit {
            self.mix_cycle_limit = v;
        }
        if let Some(v) = o.distribute_above {
            self.distribute_above = v;
        }
        if let Some(v) = o.return_source {
            self.return_source = v;
        }
        if let Some(v) = o.store_dest_history {
            self.store_dest_history = v;
        }
        if let Some(v) = o.step_delay {
            self.step_delay = v;
        }
        if let Some(v) = o.pipette_rate {
            self.pipette_rate = v;
        }
        if let Some(v) = o.mix_same_tip {
            self.mix_same_tip = v;
        }
        if let Some(v) = o.safety_catch {
            self.safety_catch = v;
        }
        if let Some(v) = o.initial_verification {
            self.initial_verification = v;
        }
        if let Some(v) = o.light_on {
            self.light_on = v;
        }
        if let Some(v) = o.detail_comment {
            self.detail_comment = v;
        }
        if let Some(v) = o.return_tips_at_end {
            self.return_tips_at_end = v;
        }
        if let Some(v) = o.strict_carryover {
            self.strict_carryover = v;
        }
        if let Some(v) = o.residual_air_gap {
            self.residual_air_gap = v;
        }
    }
}

// ---------------------------------------------------------------------------
// PolicyOverrides
// ---------------------------------------------------------------------------

/// Partial policy: one tier of the layered configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolicyOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tip_reuse: Option<TipReuse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blowout_above: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blowout_cycle: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_carryover: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mix_after_cycle: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drop_dirtytip: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mix_cycle_limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distribute_above: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_source: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_dest_history: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_delay: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipette_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mix_same_tip: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub safety_catch: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_verification: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub light_on: Option<LightMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail_comment: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_tips_at_end: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strict_carryover: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub residual_air_gap: Option<bool>,
}

impl PolicyOverrides {
    /// Parse profile text: one `key:value` pair per line, blank lines and
    /// `#` comments ignored. Values follow YAML scalar rules.
    pub fn from_profile_text(text: &str) -> Result<Self> {
        let mut yaml = String::new();
        for (n, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once(':') else {
                return Err(PipetteError::InvalidConfig(format!(
                    "profile line {}: expected 'key: value', got '{line}'",
                    n + 1
                )));
            };
            yaml.push_str(&format!("{}: {}\n", key.trim(), value.trim()));
        }
        if yaml.is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(&yaml)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_profile_text(&data)
    }
}

// ---------------------------------------------------------------------------
// Mode
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Slow, generous margins, fresh tip every step.
    Safe,
    /// Balanced tip and time consumption.
    #[default]
    Simple,
    /// Short margins for non-viscous, non-critical samples.
    Rapid,
    /// Dry run: one tip per pipette, returned to the rack at the end.
    Test,
    Custom,
    Debug,
}

impl Mode {
    pub fn all() -> &'static [Mode] {
        &[
            Mode::Safe,
            Mode::Simple,
            Mode::Rapid,
            Mode::Test,
            Mode::Custom,
            Mode::Debug,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Safe => "safe",
            Mode::Simple => "simple",
            Mode::Rapid => "rapid",
            Mode::Test => "test",
            Mode::Custom => "custom",
            Mode::Debug => "debug",
        }
    }

    pub fn preset(self) -> PolicyOverrides {
        match self {
            Mode::Safe => PolicyOverrides {
                tip_reuse: Some(TipReuse::Always),
                initial_verification: Some(true),
                blowout_above: Some(1001.0),
                blowout_cycle: Some(3),
                max_carryover: Some(5),
                mix_after_cycle: Some(2),
                drop_dirtytip: Some(true),
                mix_cycle_limit: Some(100),
                distribute_above: Some(1000.0),
                return_source: Some(false),
                store_dest_history: Some(true),
                step_delay: Some(1.0),
                pipette_rate: Some(1.0),
                mix_same_tip: Some(false),
                light_on: Some(LightMode::AlwaysOff),
                ..Default::default()
            },
            Mode::Simple => PolicyOverrides {
                tip_reuse: Some(TipReuse::Once),
                initial_verification: Some(true),
                blowout_above: Some(50.0),
                blowout_cycle: Some(2),
                max_carryover: Some(5),
                mix_after_cycle: Some(1),
                drop_dirtytip: Some(true),
                mix_cycle_limit: Some(30),
                distribute_above: Some(1000.0),
                return_source: Some(true),
                store_dest_history: Some(true),
                mix_same_tip: Some(true),
                step_delay: Some(0.0),
                pipette_rate: Some(1.0),
                light_on: Some(LightMode::RunOff),
                ..Default::default()
            },
            Mode::Rapid => PolicyOverrides {
                tip_reuse: Some(TipReuse::Once),
                initial_verification: Some(false),
                blowout_above: Some(20.0),
                blowout_cycle: Some(2),
                max_carryover: Some(5),
                mix_after_cycle: Some(0),
                drop_dirtytip: Some(false),
                mix_cycle_limit: Some(10),
                distribute_above: Some(100.0),
                return_source: Some(true),
                store_dest_history: Some(true),
                step_delay: Some(0.0),
                pipette_rate: Some(1.0),
                mix_same_tip: Some(true),
                light_on: Some(LightMode::RunOff),
                ..Default::default()
            },
            Mode::Test => PolicyOverrides {
                tip_reuse: Some(TipReuse::Never),
                initial_verification: Some(true),
                blowout_cycle: Some(1),
                mix_after_cycle: Some(1),
                drop_dirtytip: Some(false),
                mix_cycle_limit: Some(0),
                store_dest_history: Some(true),
                safety_catch: Some(false),
                detail_comment: Some(true),
                step_delay: Some(0.0),
                pipette_rate: Some(1.0),
                mix_same_tip: Some(true),
                light_on: Some(LightMode::AlwaysOn),
                return_tips_at_end: Some(true),
                ..Default::default()
            },
            Mode::Custom => PolicyOverrides::default(),
            Mode::Debug => PolicyOverrides {
                safety_catch: Some(false),
                detail_comment: Some(true),
                ..Default::default()
            },
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Mode {
    type Err = PipetteError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase();
        let key = key.strip_suffix("_mode").unwrap_or(key.as_str());
        Mode::all()
            .iter()
            .copied()
            .find(|m| m.as_str() == key)
            .ok_or_else(|| PipetteError::InvalidConfig(format!("unknown mode '{s}'")))
    }
}

// ---------------------------------------------------------------------------
// RigConfig (on-disk)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipetteSetup {
    pub model: String,
    /// Tip rack slots, first entry is the (possibly partially used) first rack.
    pub tipracks: Vec<String>,
    /// Last usable tip of the first rack; tips are taken backward from here.
    #[serde(default = "default_tip_last_well")]
    pub tip_last_well: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_volume: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_volume: Option<f64>,
}

fn default_tip_last_well() -> String {
    "H12".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RigConfig {
    #[serde(default)]
    pub mode: Mode,
    #[serde(default)]
    pub tip_type: TipType,
    #[serde(default)]
    pub pipettes: BTreeMap<Mount, PipetteSetup>,
    #[serde(default)]
    pub overrides: PolicyOverrides,
}

impl RigConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let cfg: RigConfig = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(path, data.as_bytes())
    }

    /// Resolve into a run configuration. `mode` replaces the file's mode and
    /// `profile` is layered over the file's own overrides.
    pub fn resolve(&self, mode: Option<Mode>, profile: &PolicyOverrides) -> Result<RunConfig> {
        let mut policy = Policy::resolve(mode.unwrap_or(self.mode), &self.overrides);
        policy.apply(profile);

        let mut run = RunConfig::new(policy);
        for (mount, setup) in &self.pipettes {
            let mut profile = ActuatorProfile::from_catalog(&setup.model, self.tip_type)?;
            if let Some(min) = setup.min_volume {
                profile.min_volume = min;
            }
            if let Some(max) = setup.max_volume {
                profile.max_volume = max;
            }
            let tip_last = well::to_index(&setup.tip_last_well)?;
            run = run.with_pipette(*mount, profile, setup.tipracks.clone(), tip_last);
        }
        run.check()?;
        Ok(run)
    }

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let error = |message: String| ConfigWarning {
            level: WarnLevel::Error,
            message,
        };
        let warning = |message: String| ConfigWarning {
            level: WarnLevel::Warning,
            message,
        };

        // 1. At least one pipette, each from the catalog with a usable tip setup
        if self.pipettes.is_empty() {
            warnings.push(error("no pipettes configured".to_string()));
        }
        let mut rack_owner: HashMap<&str, Mount> = HashMap::new();
        for (mount, setup) in &self.pipettes {
            if let Err(e) = ActuatorProfile::from_catalog(&setup.model, self.tip_type) {
                warnings.push(error(format!("{mount} pipette: {e}")));
            }
            if setup.tipracks.is_empty() {
                warnings.push(error(format!("{mount} pipette has no tip racks")));
            }
            if well::to_index(&setup.tip_last_well).is_err() {
                warnings.push(error(format!(
                    "{mount} pipette: tip_last_well '{}' is not a valid well",
                    setup.tip_last_well
                )));
            }
            // 2. Racks are never shared between mounts
            for slot in &setup.tipracks {
                if let Some(owner) = rack_owner.insert(slot.as_str(), *mount) {
                    if owner != *mount {
                        warnings.push(error(format!(
                            "tip rack in slot {slot} is assigned to both pipettes"
                        )));
                    } else {
                        warnings.push(warning(format!(
                            "tip rack in slot {slot} is listed twice for the {mount} pipette"
                        )));
                    }
                }
            }
        }

        // 3. Policy sanity
        let policy = Policy::resolve(self.mode, &self.overrides);
        if !(policy.pipette_rate > 0.0 && policy.pipette_rate <= 1.0) {
            warnings.push(error(format!(
                "pipette_rate={} must be in (0, 1]",
                policy.pipette_rate
            )));
        }
        if policy.step_delay < 0.0 {
            warnings.push(error(format!(
                "step_delay={} must not be negative",
                policy.step_delay
            )));
        }
        if policy.max_carryover == 0 {
            warnings.push(error("max_carryover must be at least 1".to_string()));
        }
        if !policy.safety_catch {
            warnings.push(warning(
                "safety_catch is off: a clean simulation does not certify the run".to_string(),
            ));
        }
        if policy.blowout_cycle == 0 {
            warnings.push(warning(
                "blowout_cycle=0 leaves residual liquid in the tip".to_string(),
            ));
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// RunConfig (resolved)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipetteRig {
    pub profile: ActuatorProfile,
    pub tipracks: Vec<String>,
    /// Linear index (1-96) of the last usable tip in the first rack.
    pub tip_last: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub policy: Policy,
    pub pipettes: BTreeMap<Mount, PipetteRig>,
}

impl RunConfig {
    pub fn new(policy: Policy) -> Self {
        Self {
            policy,
            pipettes: BTreeMap::new(),
        }
    }

    pub fn with_pipette(
        mut self,
        mount: Mount,
        profile: ActuatorProfile,
        tipracks: Vec<String>,
        tip_last: u32,
    ) -> Self {
        self.pipettes.insert(
            mount,
            PipetteRig {
                profile,
                tipracks,
                tip_last,
            },
        );
        self
    }

    pub fn profile(&self, mount: Mount) -> Result<&ActuatorProfile> {
        self.pipettes
            .get(&mount)
            .map(|p| &p.profile)
            .ok_or(PipetteError::MountNotInstalled(mount))
    }

    pub fn profiles(&self) -> impl Iterator<Item = (Mount, &ActuatorProfile)> {
        self.pipettes.iter().map(|(m, p)| (*m, &p.profile))
    }

    /// Smallest minimum volume among installed pipettes.
    pub fn smallest_min(&self) -> f64 {
        self.profiles()
            .map(|(_, p)| p.min_volume)
            .fold(f64::INFINITY, f64::min)
    }

    /// Structural checks that must hold before a run can start.
    pub fn check(&self) -> Result<()> {
        if self.pipettes.is_empty() {
            return Err(PipetteError::NoActuator);
        }
        let mut seen: HashMap<&str, Mount> = HashMap::new();
        for (mount, rig) in &self.pipettes {
            if rig.tipracks.is_empty() {
                return Err(PipetteError::InvalidConfig(format!(
                    "{mount} pipette has no tip racks"
                )));
            }
            if rig.tip_last == 0 || rig.tip_last > well::WELL_COUNT {
                return Err(PipetteError::InvalidTipIndex(rig.tip_last));
            }
            if rig.profile.min_volume <= 0.0 || rig.profile.min_volume > rig.profile.max_volume {
                return Err(PipetteError::InvalidConfig(format!(
                    "{mount} pipette has an empty volume range {}-{} µL",
                    rig.profile.min_volume, rig.profile.max_volume
                )));
            }
            for slot in &rig.tipracks {
                if let Some(owner) = seen.insert(slot.as_str(), *mount) {
                    if owner != *mount {
                        return Err(PipetteError::InvalidConfig(format!(
                            "tip rack in slot {slot} is shared by both pipettes"
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
