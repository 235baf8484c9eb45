use crate::output::{print_json, print_pairs, print_table};
use anyhow::Context;
use clap::Subcommand;
use pipette_core::config::{RigConfig, WarnLevel};
use pipette_core::io::write_if_missing;
use pipette_core::profile::{known_models, tiprack_for};
use pipette_core::well;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show the resolved policy and pipettes
    Show {
        #[arg(long, env = "PIPETTE_RIG")]
        rig: PathBuf,
        /// Mode preset replacing the rig's own
        #[arg(long)]
        mode: Option<String>,
        /// Profile overrides, one `key: value` per line
        #[arg(long)]
        profile: Option<PathBuf>,
    },

    /// Validate the rig file for common mistakes
    Validate {
        #[arg(long, env = "PIPETTE_RIG")]
        rig: PathBuf,
    },

    /// Write a starter rig file (never overwrites)
    Init {
        #[arg(default_value = "rig.yaml")]
        path: PathBuf,
    },

    /// List the pipette models the catalog knows
    Models,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Show { rig, mode, profile } => {
            show(&rig, mode.as_deref(), profile.as_deref(), json)
        }
        ConfigSubcommand::Validate { rig } => validate(&rig, json),
        ConfigSubcommand::Init { path } => init(&path, json),
        ConfigSubcommand::Models => models(json),
    }
}

// ---------------------------------------------------------------------------
// show
// ---------------------------------------------------------------------------

fn show(rig: &Path, mode: Option<&str>, profile: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let (file, config) = super::resolve_rig(rig, mode, profile)?;

    if json {
        return print_json(&config);
    }

    let mode = mode.unwrap_or(file.mode.as_str());
    print_pairs(&[
        ("mode", mode.to_string()),
        ("tip type", file.tip_type.to_string()),
    ]);
    println!();

    let rows: Vec<Vec<String>> = config
        .pipettes
        .iter()
        .map(|(mount, p)| {
            let model = file
                .pipettes
                .get(mount)
                .map(|s| s.model.as_str())
                .unwrap_or(p.profile.name.as_str());
            let last_tip = well::to_label(p.tip_last).unwrap_or_default();
            vec![
                mount.to_string(),
                model.to_string(),
                format!("{}-{} µL", p.profile.min_volume, p.profile.max_volume),
                p.tipracks.join(","),
                last_tip,
                tiprack_for(model, file.tip_type).unwrap_or("-").to_string(),
            ]
        })
        .collect();
    print_table(
        &["MOUNT", "MODEL", "RANGE", "RACKS", "LAST TIP", "TIPRACK"],
        rows,
    );
    println!();

    let policy = serde_yaml::to_string(&config.policy).context("cannot render policy")?;
    print!("{policy}");
    Ok(())
}

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

fn validate(rig: &Path, json: bool) -> anyhow::Result<()> {
    let config = RigConfig::load(rig).with_context(|| format!("cannot load rig {}", rig.display()))?;
    let warnings = config.validate();

    if json {
        print_json(&serde_json::json!({ "warnings": warnings }))?;
    } else if warnings.is_empty() {
        println!("Rig is valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("rig validation found errors");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// init
// ---------------------------------------------------------------------------

const STARTER_RIG: &str = "\
# Pipettes by mount. Tips are taken backward from tip_last_well in the
# first rack, then forward from A1 of each following rack.
mode: safe
tip_type: standard
pipettes:
  left:
    model: p20_single_gen2
    tipracks: [\"1\", \"4\"]
    tip_last_well: H12
  right:
    model: p300_single_gen2
    tipracks: [\"7\", \"10\"]
    tip_last_well: H12
# Any policy key may be overridden here, e.g.
# overrides:
#   tip_reuse: never
#   distribute_above: 15
";

fn init(path: &Path, json: bool) -> anyhow::Result<()> {
    let created = write_if_missing(path, STARTER_RIG.as_bytes())
        .with_context(|| format!("cannot write {}", path.display()))?;

    if json {
        print_json(&serde_json::json!({
            "path": path.display().to_string(),
            "created": created,
        }))?;
    } else if created {
        println!("Wrote {}", path.display());
    } else {
        println!("{} already exists, left unchanged", path.display());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// models
// ---------------------------------------------------------------------------

fn models(json: bool) -> anyhow::Result<()> {
    let models: Vec<&str> = known_models().collect();
    if json {
        return print_json(&models);
    }
    for model in models {
        println!("{model}");
    }
    Ok(())
}
