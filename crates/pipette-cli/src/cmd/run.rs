use crate::output::{print_json, print_table};
use anyhow::Context;
use pipette_core::io::atomic_write;
use pipette_core::orchestrator;
use pipette_core::plan::parse_csv;
use pipette_core::sim::SimRig;
use std::path::Path;

pub struct RunArgs<'a> {
    pub rig: &'a Path,
    pub plan: &'a Path,
    pub mode: Option<&'a str>,
    pub profile: Option<&'a Path>,
    pub report: Option<&'a Path>,
}

pub fn run(args: RunArgs<'_>, json: bool) -> anyhow::Result<()> {
    let (_, config) = super::resolve_rig(args.rig, args.mode, args.profile)?;

    let text = std::fs::read_to_string(args.plan)
        .with_context(|| format!("cannot read plan {}", args.plan.display()))?;
    let plan = parse_csv(&text).context("invalid transfer plan")?;

    let sim = SimRig::new();
    let report = orchestrator::run(&config, sim.robot(&config), &plan).context("run aborted")?;
    let events = sim.events();

    if let Some(path) = args.report {
        let data = serde_json::to_vec_pretty(&report)?;
        atomic_write(path, &data)
            .with_context(|| format!("cannot write report {}", path.display()))?;
    }

    if json {
        print_json(&serde_json::json!({
            "report": report,
            "events": events,
        }))?;
        return Ok(());
    }

    let rows: Vec<Vec<String>> = events
        .iter()
        .enumerate()
        .map(|(i, e)| {
            vec![
                (i + 1).to_string(),
                e.name().to_string(),
                e.mount().map(|m| m.to_string()).unwrap_or_default(),
                e.detail(),
            ]
        })
        .collect();
    print_table(&["#", "COMMAND", "MOUNT", "DETAIL"], rows);

    println!();
    println!(
        "{} transfers, {} distributes, {} tips used, {} refills",
        report.transfers,
        report.distributes,
        report.total_tips(),
        report.refills
    );
    for warning in &report.warnings {
        println!("warning: {warning}");
    }
    Ok(())
}
