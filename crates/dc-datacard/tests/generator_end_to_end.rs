//! End-to-end: fixture files on disk → generator → written outputs.

use std::path::PathBuf;

use approx::assert_relative_eq;
use dc_datacard::{DataCardGenerator, DatacardConfig, DiagnosticHistograms};
use dc_hist::MemoryStore;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../tests/fixtures").join(name)
}

#[test]
fn generate_from_fixture_files() {
    let config = DatacardConfig::from_path(&fixture("datacard.yaml")).unwrap();
    let store = MemoryStore::from_json_file(&fixture("store.json")).unwrap();
    let mut generator = DataCardGenerator::from_config(config, &store).unwrap();
    assert_relative_eq!(generator.luminosity(), 1000.0);
    let report = generator.run().unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = report.histograms.write_json(dir.path(), "taujets test").unwrap();
    assert_eq!(path, dir.path().join(DiagnosticHistograms::file_name("taujets test")));
    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert!(written.get("QCDfactEff_leg1").is_some());
    assert!(written.get("QCDFact_MtShape_bin_1").is_some());

    let model = serde_json::to_value(&report.models[0]).unwrap();
    assert_eq!(model["name"], "taujets test");
    assert_eq!(model["mass_point"], 120);
    let processes = model["processes"].as_array().unwrap();
    let labels: Vec<&str> = processes.iter().map(|p| p["label"].as_str().unwrap()).collect();
    assert_eq!(labels, vec!["HH120", "QCDfact", "EWK_Tau", "res."]);
    assert_eq!(model["nuisances"][1]["values"]["HH120"]["upper"], 0.08);
}

#[test]
fn check_reports_every_problem_of_a_broken_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.yaml");
    std::fs::write(&path, "datacard_name: x\nqcd_method: inverted\ndata_groups: []\n").unwrap();
    let config = DatacardConfig::from_path(&path).unwrap();
    let msg = config.validate().unwrap_err().to_string();
    assert!(msg.contains("mass_points"));
    assert!(msg.contains("not implemented"));
    assert!(msg.contains("data_groups"));
    assert!(msg.lines().count() >= 4, "{}", msg);
}
