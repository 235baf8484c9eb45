use crate::error::{PipetteError, Result};
use crate::types::TipType;
use serde::{Deserialize, Serialize};

/// Reliable volume range of one pipette with its current tip type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActuatorProfile {
    pub name: String,
    pub min_volume: f64,
    pub max_volume: f64,
}

impl ActuatorProfile {
    pub fn new(name: impl Into<String>, min_volume: f64, max_volume: f64) -> Self {
        Self {
            name: name.into(),
            min_volume,
            max_volume,
        }
    }

    /// Look up a pipette model in the built-in catalog.
    pub fn from_catalog(model: &str, tip_type: TipType) -> Result<Self> {
        let (min, max) = catalog_range(model, tip_type).ok_or_else(|| {
            PipetteError::UnknownPipette {
                model: model.to_string(),
                tip_type: tip_type.to_string(),
            }
        })?;
        Ok(Self::new(model, min, max))
    }

    pub fn covers(&self, volume: f64) -> bool {
        volume >= self.min_volume && volume <= self.max_volume
    }
}

struct CatalogEntry {
    model: &'static str,
    standard: (f64, f64),
    filter: (f64, f64),
    tiprack_standard: &'static str,
    tiprack_filter: &'static str,
}

const CATALOG: &[CatalogEntry] = &[
    CatalogEntry {
        model: "p10_single",
        standard: (1.0, 10.0),
        filter: (1.0, 10.0),
        tiprack_standard: "opentrons_96_tiprack_10ul",
        tiprack_filter: "opentrons_96_filtertiprack_20ul",
    },
    CatalogEntry {
        model: "p50_single",
        standard: (5.0, 50.0),
        filter: (5.0, 50.0),
        tiprack_standard: "opentrons_96_tiprack_300ul",
        tiprack_filter: "opentrons_96_filtertiprack_200ul",
    },
    CatalogEntry {
        model: "p300_single",
        standard: (30.0, 300.0),
        filter: (30.0, 200.0),
        tiprack_standard: "opentrons_96_tiprack_300ul",
        tiprack_filter: "opentrons_96_filtertiprack_200ul",
    },
    CatalogEntry {
        model: "p1000_single",
        standard: (100.0, 1000.0),
        filter: (100.0, 1000.0),
        tiprack_standard: "opentrons_96_tiprack_1000ul",
        tiprack_filter: "opentrons_96_filtertiprack_1000ul",
    },
    CatalogEntry {
        model: "p20_single_gen2",
        standard: (1.0, 20.0),
        filter: (1.0, 20.0),
        tiprack_standard: "opentrons_96_tiprack_20ul",
        tiprack_filter: "opentrons_96_filtertiprack_20ul",
    },
    CatalogEntry {
        model: "p300_single_gen2",
        standard: (20.0, 300.0),
        filter: (20.0, 200.0),
        tiprack_standard: "opentrons_96_tiprack_300ul",
        tiprack_filter: "opentrons_96_filtertiprack_200ul",
    },
    CatalogEntry {
        model: "p1000_single_gen2",
        standard: (100.0, 1000.0),
        filter: (100.0, 1000.0),
        tiprack_standard: "opentrons_96_tiprack_1000ul",
        tiprack_filter: "opentrons_96_filtertiprack_1000ul",
    },
];

fn entry(model: &str) -> Option<&'static CatalogEntry> {
    CATALOG.iter().find(|e| e.model == model)
}

fn catalog_range(model: &str, tip_type: TipType) -> Option<(f64, f64)> {
    entry(model).map(|e| match tip_type {
        TipType::Standard => e.standard,
        TipType::Filter => e.filter,
    })
}

/// Labware name of the tip rack that fits a pipette model.
pub fn tiprack_for(model: &str, tip_type: TipType) -> Option<&'static str> {
    entry(model).map(|e| match tip_type {
        TipType::Standard => e.tiprack_standard,
        TipType::Filter => e.tiprack_filter,
    })
}

pub fn known_models() -> impl Iterator<Item = &'static str> {
    CATALOG.iter().map(|e| e.model)
}
