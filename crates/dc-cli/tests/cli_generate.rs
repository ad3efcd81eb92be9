use std::path::PathBuf;
use std::process::{Command, Output};

fn bin_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_datacard"))
}

fn fixture(name: &str) -> PathBuf {
    // crates/dc-cli -> repo root
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../tests/fixtures").join(name)
}

fn run(args: &[&str]) -> Output {
    Command::new(bin_path())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("failed to run {:?} {:?}: {}", bin_path(), args, e))
}

fn path_str(p: &std::path::Path) -> &str {
    p.to_str().unwrap()
}

#[test]
fn check_accepts_fixture_config() {
    let config = fixture("datacard.yaml");
    let out = run(&["check", "--config", path_str(&config)]);
    assert!(out.status.success(), "stderr={}", String::from_utf8_lossy(&out.stderr));
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["datacard_name"], "taujets test");
    assert_eq!(v["nuisances"].as_array().unwrap().len(), 7);
}

#[test]
fn check_rejects_unknown_nuisance_kind() {
    let dir = tempfile::tempdir().unwrap();
    let text = std::fs::read_to_string(fixture("datacard.yaml"))
        .unwrap()
        .replace("kind: counter", "kind: lookup_table");
    let config = dir.path().join("bad.yaml");
    std::fs::write(&config, text).unwrap();
    let out = run(&["check", "--config", path_str(&config)]);
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("lookup_table"), "stderr={}", stderr);
}

#[test]
fn generate_writes_models_and_diagnostics() {
    let dir = tempfile::tempdir().unwrap();
    let out_dir = dir.path().join("cards");
    let config = fixture("datacard.yaml");
    let store = fixture("store.json");
    let out = run(&[
        "generate",
        "--config",
        path_str(&config),
        "--store",
        path_str(&store),
        "--output-dir",
        path_str(&out_dir),
        "--mass",
        "120",
    ]);
    assert!(out.status.success(), "stderr={}", String::from_utf8_lossy(&out.stderr));

    let summary: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(summary["datacards"].as_array().unwrap().len(), 1);
    assert_eq!(summary["warnings"], 0);

    let card = out_dir.join("taujets_test_m120.json");
    let model: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(card).unwrap()).unwrap();
    assert_eq!(model["mass_point"], 120);
    assert_eq!(model["observation"]["rate"], 150.0);
    assert!(out_dir.join("taujets_test_QCDMeasurementFactorisedInfo.json").exists());
    assert!(!out_dir.join("taujets_test_m150.json").exists());
}

#[test]
fn generate_to_stdout_without_output_dir() {
    let config = fixture("datacard.yaml");
    let store = fixture("store.json");
    let out =
        run(&["generate", "--config", path_str(&config), "--store", path_str(&store)]);
    assert!(out.status.success(), "stderr={}", String::from_utf8_lossy(&out.stderr));
    let report: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(report["models"].as_array().unwrap().len(), 2);
    assert!(report["diagnostics"].as_array().unwrap().is_empty());
}

#[test]
fn generate_fails_on_missing_store_entry() {
    let dir = tempfile::tempdir().unwrap();
    let text = std::fs::read_to_string(fixture("datacard.yaml"))
        .unwrap()
        .replace("derived_observable_base_name: mtShape", "derived_observable_base_name: mtShapeX");
    let config = dir.path().join("card.yaml");
    std::fs::write(&config, text).unwrap();
    let store = fixture("store.json");
    let out = run(&["generate", "--config", path_str(&config), "--store", path_str(&store)]);
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("QCDfact/mtShapeX_bin0"), "stderr={}", stderr);
}
