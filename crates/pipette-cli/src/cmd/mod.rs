pub mod config;
pub mod run;
pub mod split;
pub mod well;

use anyhow::Context;
use pipette_core::config::{Mode, PolicyOverrides, RigConfig, RunConfig};
use std::path::Path;

/// Load the rig file and layer the optional mode and profile over it.
pub fn resolve_rig(
    rig: &Path,
    mode: Option<&str>,
    profile: Option<&Path>,
) -> anyhow::Result<(RigConfig, RunConfig)> {
    let file = RigConfig::load(rig).with_context(|| format!("cannot load rig {}", rig.display()))?;
    let mode = mode.map(str::parse::<Mode>).transpose()?;
    let overrides = match profile {
        Some(path) => PolicyOverrides::load(path)
            .with_context(|| format!("cannot load profile {}", path.display()))?,
        None => PolicyOverrides::default(),
    };
    let resolved = file
        .resolve(mode, &overrides)
        .context("rig configuration is not usable")?;
    Ok((file, resolved))
}
