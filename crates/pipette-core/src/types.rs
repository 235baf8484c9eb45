use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Mount
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mount {
    Left,
    Right,
}

impl Mount {
    pub fn all() -> &'static [Mount] {
        &[Mount::Left, Mount::Right]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mount::Left => "left",
            Mount::Right => "right",
        }
    }
}

impl fmt::Display for Mount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Mount {
    type Err = crate::error::PipetteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "left" => Ok(Mount::Left),
            "right" => Ok(Mount::Right),
            _ => Err(crate::error::PipetteError::InvalidConfig(format!(
                "unknown mount '{s}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// TipReuse
// ---------------------------------------------------------------------------

/// When a held tip is replaced before the next aspirate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TipReuse {
    /// Keep one tip per pipette for the whole run.
    Never,
    /// Replace when the tip may be contaminated or the source changes.
    Once,
    /// Replace before every step.
    Always,
}

impl TipReuse {
    pub fn as_str(self) -> &'static str {
        match self {
            TipReuse::Never => "never",
            TipReuse::Once => "once",
            TipReuse::Always => "always",
        }
    }
}

impl fmt::Display for TipReuse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// TouchMode
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TouchMode {
    #[default]
    None,
    Source,
    Destination,
    Both,
}

impl TouchMode {
    pub fn touches_source(self) -> bool {
        matches!(self, TouchMode::Source | TouchMode::Both)
    }

    pub fn touches_destination(self) -> bool {
        matches!(self, TouchMode::Destination | TouchMode::Both)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TouchMode::None => "none",
            TouchMode::Source => "source",
            TouchMode::Destination => "destination",
            TouchMode::Both => "both",
        }
    }
}

impl fmt::Display for TouchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TouchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(TouchMode::None),
            "source" => Ok(TouchMode::Source),
            "dest" | "destination" => Ok(TouchMode::Destination),
            "both" => Ok(TouchMode::Both),
            other => Err(format!("unknown touch tip mode '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// TipType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TipType {
    #[default]
    Standard,
    Filter,
}

impl TipType {
    pub fn as_str(self) -> &'static str {
        match self {
            TipType::Standard => "standard",
            TipType::Filter => "filter",
        }
    }
}

impl fmt::Display for TipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// LightMode
// ---------------------------------------------------------------------------

/// Rail light schedule across the phases of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LightMode {
    AlwaysOn,
    StartEnd,
    StartOnly,
    #[default]
    RunOff,
    AlwaysOff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Init,
    Run,
    Pause,
    End,
}

impl LightMode {
    pub fn lit(self, phase: RunPhase) -> bool {
        let (init, run, pause, end) = match self {
            LightMode::AlwaysOn => (true, true, true, true),
            LightMode::StartEnd => (true, false, false, true),
            LightMode::StartOnly => (true, false, false, false),
            LightMode::RunOff => (true, false, true, true),
            LightMode::AlwaysOff => (false, false, false, false),
        };
        match phase {
            RunPhase::Init => init,
            RunPhase::Run => run,
            RunPhase::Pause => pause,
            RunPhase::End => end,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touch_mode_accepts_dest_alias() {
        assert_eq!("dest".parse::<TouchMode>().unwrap(), TouchMode::Destination);
        assert_eq!("Both".parse::<TouchMode>().unwrap(), TouchMode::Both);
        assert_eq!("".parse::<TouchMode>().unwrap(), TouchMode::None);
        assert!("sideways".parse::<TouchMode>().is_err());
    }

    #[test]
    fn run_off_keeps_pause_lit() {
        assert!(LightMode::RunOff.lit(RunPhase::Init));
        assert!(!LightMode::RunOff.lit(RunPhase::Run));
        assert!(LightMode::RunOff.lit(RunPhase::Pause));
        assert!(!LightMode::AlwaysOff.lit(RunPhase::End));
    }

    #[test]
    fn mount_yaml_is_snake_case() {
        let yaml = serde_yaml::to_string(&Mount::Left).unwrap();
        assert_eq!(yaml.trim(), "left");
        assert_eq!("right".parse::<Mount>().unwrap(), Mount::Right);
    }
}
