use crate::error::{PipetteError, Result};
use crate::profile::ActuatorProfile;
use crate::types::Mount;
use serde::Serialize;

/// Which pipette serves a volume, and whether it has to carry over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Selection {
    pub mount: Mount,
    pub overflow: bool,
}

/// Pick the pipette for `volume`.
///
/// With two pipettes the one with the smaller minimum is "small". Volumes up
/// to its maximum, and volumes in a gap between the two ranges, go to the
/// small pipette; everything from the large minimum up goes to the large one.
/// `overflow` is set whenever the chosen pipette's maximum is exceeded.
pub fn select<'a, I>(profiles: I, volume: f64) -> Result<Selection>
where
    I: IntoIterator<Item = (Mount, &'a ActuatorProfile)>,
{
    let mut installed: Vec<(Mount, &ActuatorProfile)> = profiles.into_iter().collect();
    // on equal minimums the right pipette counts as small
    installed.sort_by(|a, b| {
        a.1.min_volume
            .total_cmp(&b.1.min_volume)
            .then_with(|| b.0.cmp(&a.0))
    });

    match installed.as_slice() {
        [] => Err(PipetteError::NoActuator),
        [(mount, only)] => Ok(Selection {
            mount: *mount,
            overflow: volume > only.max_volume,
        }),
        [(small_mount, small), (large_mount, large), ..] => {
            let selection = if volume <= small.max_volume {
                Selection {
                    mount: *small_mount,
                    overflow: false,
                }
            } else if volume < large.min_volume {
                Selection {
                    mount: *small_mount,
                    overflow: true,
                }
            } else {
                Selection {
                    mount: *large_mount,
                    overflow: volume > large.max_volume,
                }
            };
            Ok(selection)
        }
    }
}
