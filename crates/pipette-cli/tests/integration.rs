#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use std::path::PathBuf;
use tempfile::TempDir;

fn pipette() -> Command {
    let mut cmd = Command::cargo_bin("pipette").unwrap();
    cmd.env_remove("PIPETTE_RIG").env_remove("RUST_LOG");
    cmd
}

fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}

const RIG: &str = "\
pipettes:
  left: { model: p1000_single_gen2, tipracks: [\"1\"] }
";

const PLAN: &str = "\
source labware,source slot,source well,height,dest labware,dest slot,dest well,volume
plate,2,A1,1,plate,3,A1,100
plate,2,A1,1,plate,3,B1,100
plate,2,A1,1,plate,3,C1,100
";

fn stdout_json(cmd: &mut Command) -> serde_json::Value {
    let out = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&out).unwrap()
}

// ---------------------------------------------------------------------------
// pipette well
// ---------------------------------------------------------------------------

#[test]
fn well_label_to_index() {
    pipette()
        .args(["well", "b3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("B3 = 18"));
}

#[test]
fn well_index_to_label() {
    let v = stdout_json(pipette().args(["--json", "well", "96"]));
    assert_eq!(v["label"], "H12");
    assert_eq!(v["index"], 96);
}

#[test]
fn well_rejects_out_of_range() {
    pipette()
        .args(["well", "I1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid well label"));
    pipette()
        .args(["well", "97"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid tip index"));
}

// ---------------------------------------------------------------------------
// pipette split
// ---------------------------------------------------------------------------

#[test]
fn split_clamps_under_safety_catch() {
    let v = stdout_json(pipette().args(["--json", "split", "1800", "--max", "300"]));
    assert_eq!(v["volumes"].as_array().unwrap().len(), 5);
    assert_eq!(v["required_cycles"], 6);
    assert_eq!(v["clamped"], true);
}

#[test]
fn split_keeps_every_leg_without_safety_catch() {
    pipette()
        .args(["split", "1800", "--max", "300", "--no-safety-catch"])
        .assert()
        .success()
        .stdout(predicate::str::contains("6 legs"))
        .stdout(predicate::str::contains("exceed the limit of 5"));
}

#[test]
fn split_rejects_zero_max() {
    pipette()
        .args(["split", "100", "--max", "0"])
        .assert()
        .failure();
}

// ---------------------------------------------------------------------------
// pipette config
// ---------------------------------------------------------------------------

#[test]
fn config_init_writes_once_and_validates() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("rig.yaml");

    pipette()
        .args(["config", "init"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote"));
    assert!(path.exists());

    std::fs::write(&path, RIG).unwrap();
    pipette()
        .args(["config", "init"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), RIG);
}

#[test]
fn starter_rig_is_valid() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("rig.yaml");
    pipette().args(["config", "init"]).arg(&path).assert().success();
    pipette()
        .args(["config", "validate", "--rig"])
        .arg(&path)
        .assert()
        .success();
}

#[test]
fn validate_reports_shared_racks() {
    let dir = TempDir::new().unwrap();
    let rig = write(
        &dir,
        "rig.yaml",
        "pipettes:\n  left: { model: p20_single_gen2, tipracks: [\"1\"] }\n  right: { model: p300_single_gen2, tipracks: [\"1\"] }\n",
    );
    pipette()
        .args(["config", "validate", "--rig"])
        .arg(&rig)
        .assert()
        .failure()
        .stdout(predicate::str::contains("assigned to both pipettes"));
}

#[test]
fn show_layers_mode_and_profile() {
    let dir = TempDir::new().unwrap();
    let rig = write(&dir, "rig.yaml", RIG);
    let profile = write(&dir, "profile.txt", "# faster\npipette_rate: 0.5\n");

    let v = stdout_json(
        pipette()
            .args(["--json", "config", "show", "--mode", "test", "--rig"])
            .arg(&rig)
            .arg("--profile")
            .arg(&profile),
    );
    assert_eq!(v["policy"]["pipette_rate"], 0.5);
    assert_eq!(v["policy"]["return_tips_at_end"], true);
    assert_eq!(v["pipettes"]["left"]["profile"]["max_volume"], 1000.0);
}

#[test]
fn show_rejects_unknown_mode() {
    let dir = TempDir::new().unwrap();
    let rig = write(&dir, "rig.yaml", RIG);
    pipette()
        .args(["config", "show", "--mode", "turbo", "--rig"])
        .arg(&rig)
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown mode 'turbo'"));
}

#[test]
fn models_lists_the_catalog() {
    pipette()
        .args(["config", "models"])
        .assert()
        .success()
        .stdout(predicate::str::contains("p300_single_gen2"));
}

// ---------------------------------------------------------------------------
// pipette run
// ---------------------------------------------------------------------------

#[test]
fn run_batches_same_source_rows() {
    let dir = TempDir::new().unwrap();
    let rig = write(&dir, "rig.yaml", RIG);
    let plan = write(&dir, "plan.csv", PLAN);
    let profile = write(&dir, "profile.txt", "distribute_above: 50\n");

    let v = stdout_json(
        pipette()
            .args(["--json", "run", "--rig"])
            .arg(&rig)
            .arg("--plan")
            .arg(&plan)
            .arg("--profile")
            .arg(&profile),
    );
    assert_eq!(v["report"]["distributes"], 1);
    assert_eq!(v["report"]["transfers"], 0);
    let events = v["events"].as_array().unwrap();
    assert!(events
        .iter()
        .any(|e| e["op"] == "aspirate" && e["volume"] == 400.0));
}

#[test]
fn run_prints_a_command_table() {
    let dir = TempDir::new().unwrap();
    let rig = write(&dir, "rig.yaml", RIG);
    let plan = write(&dir, "plan.csv", PLAN);

    pipette()
        .args(["run", "--rig"])
        .arg(&rig)
        .arg("--plan")
        .arg(&plan)
        .assert()
        .success()
        .stdout(predicate::str::contains("COMMAND"))
        .stdout(predicate::str::contains("pick_up_tip"))
        .stdout(predicate::str::contains("3 transfers"));
}

#[test]
fn run_writes_the_report() {
    let dir = TempDir::new().unwrap();
    let rig = write(&dir, "rig.yaml", RIG);
    let plan = write(&dir, "plan.csv", PLAN);
    let report = dir.path().join("out/report.json");

    pipette()
        .args(["run", "--rig"])
        .arg(&rig)
        .arg("--plan")
        .arg(&plan)
        .arg("--report")
        .arg(&report)
        .assert()
        .success();

    let v: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&report).unwrap()).unwrap();
    assert_eq!(v["transfers"], 3);
    assert!(v["finished_at"].is_string());
}

#[test]
fn run_reports_malformed_rows() {
    let dir = TempDir::new().unwrap();
    let rig = write(&dir, "rig.yaml", RIG);
    let plan = write(
        &dir,
        "plan.csv",
        "header\nplate,2,A1,1,plate,3,A1,lots\n",
    );

    pipette()
        .args(["run", "--rig"])
        .arg(&rig)
        .arg("--plan")
        .arg(&plan)
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid transfer plan"))
        .stderr(predicate::str::contains("line 2"));
}

#[test]
fn run_needs_a_plan_file() {
    let dir = TempDir::new().unwrap();
    let rig = write(&dir, "rig.yaml", RIG);
    pipette()
        .args(["run", "--rig"])
        .arg(&rig)
        .arg("--plan")
        .arg(dir.path().join("missing.csv"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot read plan"));
}
