//! Transfer plan rows.
//!
//! Column layout (8 required, up to 15):
//!
//! ```text
//! source labware, source slot, source well, source height,
//! dest labware, dest slot, dest well, volume,
//! dest height?, source mix?, touch tip?, touch depth?, rate?,
//! mix after?, distribute?
//! ```

use crate::error::{PipetteError, Result};
use crate::types::TouchMode;
use crate::well;
use serde::{Deserialize, Serialize};

pub const REQUIRED_COLUMNS: usize = 8;
pub const MAX_COLUMNS: usize = 15;
pub const DEFAULT_TOUCH_DEPTH: f64 = 5.0;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WellSpec {
    pub labware: String,
    pub slot: String,
    pub well: String,
}

impl WellSpec {
    pub fn new(labware: impl Into<String>, slot: impl Into<String>, well: impl Into<String>) -> Self {
        Self {
            labware: labware.into(),
            slot: slot.into(),
            well: well.into(),
        }
    }

    /// Identity used for source/destination comparisons.
    pub fn key(&self) -> (&str, &str) {
        (&self.slot, &self.well)
    }
}

/// Source mixing requested before the transfer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "volume", rename_all = "snake_case")]
pub enum SourceMix {
    #[default]
    None,
    /// Pause so the operator mixes the source by hand.
    Manual,
    Volume(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRequest {
    /// 1-based row number in the plan, for messages.
    pub line: usize,
    pub source: WellSpec,
    pub source_height: f64,
    pub dest: WellSpec,
    pub volume: f64,
    pub dest_height: Option<f64>,
    pub source_mix: SourceMix,
    pub touch: TouchMode,
    pub touch_depth: Option<f64>,
    pub rate: Option<f64>,
    pub mix_after: Option<u32>,
    /// `Some(true)` forces distribute, `Some(false)` forbids it.
    pub distribute: Option<bool>,
}

impl TransferRequest {
    /// Minimal request with every optional column empty.
    pub fn new(line: usize, source: WellSpec, source_height: f64, dest: WellSpec, volume: f64) -> Self {
        Self {
            line,
            source,
            source_height,
            dest,
            volume,
            dest_height: None,
            source_mix: SourceMix::None,
            touch: TouchMode::None,
            touch_depth: None,
            rate: None,
            mix_after: None,
            distribute: None,
        }
    }

    pub fn touch_depth_or_default(&self) -> f64 {
        self.touch_depth.unwrap_or(DEFAULT_TOUCH_DEPTH)
    }

    /// Parse one row of already-split cells.
    pub fn from_fields(line: usize, fields: &[&str]) -> Result<Self> {
        let malformed = |reason: String| PipetteError::MalformedRow { line, reason };
        if fields.len() < REQUIRED_COLUMNS {
            return Err(malformed(format!(
                "expected at least {REQUIRED_COLUMNS} columns, got {}",
                fields.len()
            )));
        }
        if fields.len() > MAX_COLUMNS {
            return Err(malformed(format!(
                "expected at most {MAX_COLUMNS} columns, got {}",
                fields.len()
            )));
        }
        let cell = |i: usize| fields.get(i).map(|s| s.trim()).unwrap_or("");

        let number = |i: usize, name: &str| -> Result<f64> {
            cell(i)
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| malformed(format!("{name} '{}' is not a number", cell(i))))
        };
        let optional_number = |i: usize, name: &str| -> Result<Option<f64>> {
            if cell(i).is_empty() {
                Ok(None)
            } else {
                number(i, name).map(Some)
            }
        };
        let well_at = |i: usize| -> Result<String> {
            well::normalize(cell(i)).map_err(|_| malformed(format!("invalid well '{}'", cell(i))))
        };
        let slot_at = |i: usize, name: &str| -> Result<String> {
            let slot = cell(i);
            if slot.is_empty() {
                Err(malformed(format!("{name} slot is empty")))
            } else {
                Ok(slot.to_string())
            }
        };

        let source = WellSpec::new(cell(0), slot_at(1, "source")?, well_at(2)?);
        let source_height = number(3, "source height")?;
        let dest = WellSpec::new(cell(4), slot_at(5, "destination")?, well_at(6)?);
        let volume = number(7, "volume")?;
        if volume <= 0.0 {
            return Err(malformed(format!("volume {volume} must be positive")));
        }

        let source_mix = match cell(9) {
            "" => SourceMix::None,
            "0" => SourceMix::Manual,
            _ => {
                let v = number(9, "source mix volume")?;
                if v < 0.0 {
                    return Err(malformed(format!("source mix volume {v} is negative")));
                }
                if v == 0.0 {
                    SourceMix::Manual
                } else {
                    SourceMix::Volume(v)
                }
            }
        };
        let touch = cell(10).parse::<TouchMode>().map_err(malformed)?;
        let mix_after = match cell(13) {
            "" => None,
            s => Some(
                s.parse::<u32>()
                    .map_err(|_| malformed(format!("mix after cycles '{s}' is not a count")))?,
            ),
        };
        let distribute = match cell(14).to_ascii_lowercase().as_str() {
            "" => None,
            "1" | "true" | "yes" | "force" => Some(true),
            "0" | "false" | "no" | "never" => Some(false),
            other => return Err(malformed(format!("distribute override '{other}' not understood"))),
        };

        Ok(Self {
            line,
            source,
            source_height,
            dest,
            volume,
            dest_height: optional_number(8, "destination height")?,
            source_mix,
            touch,
            touch_depth: optional_number(11, "touch depth")?,
            rate: optional_number(12, "rate")?,
            mix_after,
            distribute,
        })
    }
}

/// Parse plan text: comma separated, one header row, rows whose first cell
/// is blank are skipped. Cells are trimmed and lower-cased.
pub fn parse_csv(text: &str) -> Result<Vec<TransferRequest>> {
    let mut requests = Vec::new();
    let mut header_seen = false;
    for (n, raw) in text.lines().enumerate() {
        let cells: Vec<String> = raw.split(',').map(|c| c.trim().to_lowercase()).collect();
        if cells.first().map(|c| c.is_empty()).unwrap_or(true) {
            continue;
        }
        if !header_seen {
            header_seen = true;
            continue;
        }
        let fields: Vec<&str> = cells.iter().map(|c| c.as_str()).collect();
        requests.push(TransferRequest::from_fields(n + 1, &fields)?);
    }
    Ok(requests)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(fields: &[&str]) -> Result<TransferRequest> {
        TransferRequest::from_fields(2, fields)
    }

    #[test]
    fn required_columns_only() {
        let r = row(&["plate", "1", "a01", "1", "plate", "2", "b3", "50"]).unwrap();
        assert_eq!(r.source.well, "A1");
        assert_eq!(r.dest.key(), ("2", "B3"));
        assert_eq!(r.volume, 50.0);
        assert_eq!(r.source_mix, SourceMix::None);
        assert_eq!(r.touch, TouchMode::None);
        assert_eq!(r.touch_depth_or_default(), 5.0);
        assert_eq!(r.distribute, None);
    }

    #[test]
    fn optional_columns() {
        let r = row(&[
            "plate", "1", "A1", "1.5", "plate", "2", "B1", "20", "2", "0", "both", "3", "0.5",
            "4", "1",
        ])
        .unwrap();
        assert_eq!(r.dest_height, Some(2.0));
        assert_eq!(r.source_mix, SourceMix::Manual);
        assert_eq!(r.touch, TouchMode::Both);
        assert_eq!(r.touch_depth, Some(3.0));
        assert_eq!(r.rate, Some(0.5));
        assert_eq!(r.mix_after, Some(4));
        assert_eq!(r.distribute, Some(true));
    }

    #[test]
    fn mix_volume_and_forbid_override() {
        let r = row(&[
            "p", "1", "A1", "1", "p", "2", "B1", "20", "", "150", "dest", "", "", "", "no",
        ])
        .unwrap();
        assert_eq!(r.source_mix, SourceMix::Volume(150.0));
        assert_eq!(r.touch, TouchMode::Destination);
        assert_eq!(r.distribute, Some(false));
    }

    #[test]
    fn malformed_rows() {
        assert!(matches!(
            row(&["p", "1", "A1"]),
            Err(PipetteError::MalformedRow { line: 2, .. })
        ));
        assert!(row(&["p", "1", "Z9", "1", "p", "2", "B1", "20"]).is_err());
        assert!(row(&["p", "1", "A1", "x", "p", "2", "B1", "20"]).is_err());
        assert!(row(&["p", "1", "A1", "1", "p", "2", "B1", "-5"]).is_err());
        assert!(row(&["p", "", "A1", "1", "p", "2", "B1", "5"]).is_err());
        assert!(row(&["p", "1", "A1", "1", "p", "2", "B1", "5", "", "", "up"]).is_err());
    }

    #[test]
    fn csv_skips_header_and_blank_rows() {
        let text = "\
Source Labware,Source Slot,Source Well,Height,Dest Labware,Dest Slot,Dest Well,Volume
Plate,1,A1,1,Plate,2,A1,10
,,,,,,,
plate,1,A1,1,plate,2,B1,20,,,SOURCE

";
        let plan = parse_csv(text).unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].line, 2);
        assert_eq!(plan[0].source.labware, "plate");
        assert_eq!(plan[1].line, 4);
        assert_eq!(plan[1].touch, TouchMode::Source);
    }
}
