use crate::output::{print_json, print_table};
use pipette_core::carryover::split;

pub fn run(
    volume: f64,
    max: f64,
    max_cycles: u32,
    safety_catch: bool,
    json: bool,
) -> anyhow::Result<()> {
    if volume <= 0.0 || max <= 0.0 {
        anyhow::bail!("volume and --max must be positive");
    }
    let plan = split(volume, max, max_cycles, safety_catch);

    if json {
        return print_json(&plan);
    }

    let rows = plan
        .volumes
        .iter()
        .enumerate()
        .map(|(i, v)| vec![(i + 1).to_string(), format!("{v:.2}")])
        .collect();
    print_table(&["LEG", "VOLUME"], rows);
    println!();
    println!(
        "{} legs, {} required, total {:.2} µL{}",
        plan.cycles(),
        plan.required_cycles,
        plan.total(),
        if plan.clamped { " (clamped)" } else { "" }
    );
    if plan.exceeds_limit(max_cycles) {
        println!(
            "warning: {} carryover cycles exceed the limit of {max_cycles}",
            plan.required_cycles
        );
    }
    Ok(())
}
