use crate::types::Mount;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipetteError {
    #[error("invalid well label '{0}': expected A-H followed by 1-12")]
    InvalidWellLabel(String),

    #[error("invalid tip index {0}: expected 1-96")]
    InvalidTipIndex(u32),

    #[error("malformed plan row at line {line}: {reason}")]
    MalformedRow { line: usize, reason: String },

    #[error("line {line}: volume {volume} µL is below the minimum of every installed pipette ({min} µL)")]
    VolumeBelowRange { line: usize, volume: f64, min: f64 },

    #[error("no pipette installed")]
    NoActuator,

    #[error("no pipette installed on the {0} mount")]
    MountNotInstalled(Mount),

    #[error("unknown pipette model '{model}' with {tip_type} tips")]
    UnknownPipette { model: String, tip_type: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("tip racks of the {0} pipette are exhausted")]
    TipsExhausted(Mount),

    #[error("line {line}: transferring {volume} µL needs {required} carryover cycles (limit {limit})")]
    CarryoverOverflow {
        line: usize,
        volume: f64,
        required: u32,
        limit: u32,
    },

    #[error("line {line}: mixing {volume} µL needs {cycles} cycles (limit {limit})")]
    MixCycleLimit {
        line: usize,
        volume: f64,
        cycles: u32,
        limit: u32,
    },

    #[error("line {line}: cross-contamination risk: {reason}")]
    CrossContaminationRisk { line: usize, reason: String },

    #[error("hardware: {0}")]
    Hardware(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, PipetteError>;
