#![cfg(feature = "cli")]

use assert_cmd::Command;
use predicates::str::contains as str_contains;
use tempfile::tempdir;

const SEED: &str = "asof 2025-01-04\n\
home h1 yellowknife Lakeside Cabin\n\
system h1 furnace heating 2024-10-01 - Basement Furnace\n";

#[allow(deprecated)]
fn run_cli(script: &str) -> assert_cmd::assert::Assert {
    let mut cmd = Command::cargo_bin("cli").expect("cli binary");
    cmd.env("RUST_LOG", "off")
        .write_stdin(script.to_string())
        .assert()
}

fn stdout_of(assert: &assert_cmd::assert::Assert) -> String {
    String::from_utf8_lossy(&assert.get_output().stdout).into_owned()
}

#[test]
fn cli_report_shows_overdue_filter() {
    run_cli(&format!("{SEED}report h1\nquit\n"))
        .success()
        .stdout(str_contains("Furnace Filter Replacement"))
        .stdout(str_contains("overdue"))
        .stdout(str_contains("Home score:"));
}

#[test]
fn cli_rejects_unknown_category() {
    run_cli("home h1 yellowknife Cabin\nsystem h1 sauna spa - - Sauna\nquit\n")
        .success()
        .stdout(str_contains("unknown system category"));
}

#[test]
fn cli_cold_snap_raises_weather_alert() {
    run_cli(&format!("{SEED}weather yellowknife -31\nreport h1\nquit\n"))
        .success()
        .stdout(str_contains("Extreme cold in yellowknife"))
        .stdout(str_contains("weather:yellowknife:"));
}

#[test]
fn cli_failed_inspection_is_urgent() {
    run_cli(&format!(
        "{SEED}inspect h1 furnace 2025-01-02 fail cracked heat exchanger\nreport h1\nquit\n"
    ))
    .success()
    .stdout(str_contains("Inspection recorded."))
    .stdout(str_contains("urgent:furnace:2025-01-02"));
}

#[test]
fn cli_save_load_and_export_timeline() {
    let dir = tempdir().expect("create temp dir");
    let snapshot = dir.path().join("store.json");
    let timeline = dir.path().join("timeline.csv");
    let snapshot = snapshot.to_string_lossy();
    let timeline_path = timeline.to_string_lossy();

    let assert = run_cli(&format!("{SEED}report h1\nsave {snapshot}\nquit\n")).success();
    let output = stdout_of(&assert);
    assert!(output.contains("Saved to"), "expected save confirmation:\n{output}");

    // The filter instance id is deterministic, so pull it from the first report.
    let id = output
        .lines()
        .find(|line| line.contains("Furnace Filter Replacement"))
        .and_then(|line| line.split('|').nth(1))
        .map(|cell| cell.trim().to_string())
        .expect("filter row in report");

    let script = format!(
        "asof 2025-01-05\nload {snapshot}\ncomplete {id} 38.50 Sam\ntimeline h1\nexport h1 {timeline_path}\nquit\n"
    );
    let assert = run_cli(&script).success();
    let output = stdout_of(&assert);
    assert!(output.contains("Loaded"), "expected load confirmation:\n{output}");
    assert!(output.contains("Completed Furnace Filter Replacement."), "{output}");
    assert!(output.contains("Next Furnace Filter Replacement due 2025-04-05"), "{output}");
    assert!(output.contains("Exported 1 row(s)"), "{output}");

    let csv = std::fs::read_to_string(&timeline).expect("timeline written");
    assert!(csv.contains("38.50"));
    assert!(csv.contains("completed"));
}
