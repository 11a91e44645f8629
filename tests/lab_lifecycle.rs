// tests/lab_lifecycle.rs
//
// End-to-end checks for the workspace open protocol, the role gate, and the
// append-only recipe journal.

use std::collections::BTreeMap;

use reprolab::{Lab, LabError, LabRole};
use serde_json::{json, Map, Value};

fn params(value: Value) -> Map<String, Value> {
    value.as_object().expect("params must be an object").clone()
}

fn open_admin(root: &std::path::Path) -> Lab {
    Lab::open(Some(root), None, None, None, LabRole::Admin).expect("open lab")
}

#[test]
fn fresh_workspace_bootstrap_and_idempotent_define() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let ws = tmp.path().join("ws");

    let mut lab = open_admin(&ws);

    // Open produced a config document and the directory skeleton.
    assert!(lab.layout().config_path().exists());
    assert!(lab.layout().recipes_dir().is_dir());
    assert!(lab.layout().variants_dir().is_dir());
    assert!(lab.layout().db_path().exists());
    assert!(lab.load_recipe().expect("load recipe").steps.is_empty());

    // First define: generated id, journal seeded with open_lab + the step.
    let first = lab
        .define_project(params(json!({"name": "Acme"})))
        .expect("define project");
    let first_id = first.get("id").and_then(Value::as_i64).expect("id");
    assert!(first_id > 0);

    let recipe = lab.load_recipe().expect("load recipe");
    assert_eq!(recipe.steps.len(), 2);
    assert_eq!(recipe.steps[0].step_type, "open_lab");
    assert_eq!(recipe.steps[1].step_type, "define_project");

    // Second define with the same natural key: same id, and the no-op is
    // not journaled.
    let second = lab
        .define_project(params(json!({"name": "Acme"})))
        .expect("re-define project");
    assert_eq!(second.get("id").and_then(Value::as_i64), Some(first_id));
    assert_eq!(lab.load_recipe().expect("reload").steps.len(), 2);
}

#[test]
fn journal_is_append_only_and_ordered() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let mut lab = open_admin(tmp.path());

    lab.define_project(params(json!({"name": "P1"}))).expect("p1");
    let sensor = lab
        .define_sensor(params(json!({"name": "S1", "serial": "X-100"})))
        .expect("s1");
    let sensor_id = sensor.get("id").and_then(Value::as_i64).expect("id");
    lab.modify_sensor(sensor_id, params(json!({"serial": "X-200"})))
        .expect("modify");

    let recipe = lab.load_recipe().expect("load");
    let types: Vec<&str> = recipe.steps.iter().map(|s| s.step_type.as_str()).collect();
    assert_eq!(
        types,
        vec!["open_lab", "define_project", "define_sensor", "modify_sensor"]
    );

    // Earlier entries are untouched by later appends.
    let first_step_id = recipe.steps[1].step_id.clone();
    lab.define_project(params(json!({"name": "P2"}))).expect("p2");
    let reloaded = lab.load_recipe().expect("reload");
    assert_eq!(reloaded.steps[1].step_id, first_step_id);
    assert_eq!(reloaded.steps.len(), 5);
}

#[test]
fn failed_mutation_leaves_no_trace() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let mut lab = open_admin(tmp.path());

    lab.define_project(params(json!({"name": "Base"}))).expect("base");
    let count_before = lab.load_recipe().expect("load").steps.len();

    // modify on a missing id fails with not-found...
    let err = lab
        .modify_project(424_242, params(json!({"description": "nope"})))
        .unwrap_err();
    assert!(matches!(err, LabError::NotFound { .. }));

    // ...and neither the journal nor the database recorded anything.
    assert_eq!(lab.load_recipe().expect("reload").steps.len(), count_before);
}

#[test]
fn remove_is_idempotent() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let mut lab = open_admin(tmp.path());

    let project = lab
        .define_project(params(json!({"name": "Doomed"})))
        .expect("define");
    let id = project.get("id").and_then(Value::as_i64).expect("id");

    assert_eq!(lab.remove_project(id).expect("first remove"), json!(true));
    let journal_len = lab.load_recipe().expect("load").steps.len();

    // A second remove of the same id is still success and adds nothing to
    // the journal.
    assert_eq!(lab.remove_project(id).expect("second remove"), json!(true));
    assert_eq!(lab.load_recipe().expect("reload").steps.len(), journal_len);
}

#[test]
fn viewer_cannot_mutate_but_stays_usable() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let ws = tmp.path().join("ws");

    // Admin creates the workspace first so the viewer can attach read-only.
    {
        let mut admin = open_admin(&ws);
        admin
            .define_project(params(json!({"name": "Shared"})))
            .expect("seed");
    }

    let mut viewer = Lab::open(Some(&ws), None, None, None, LabRole::Viewer).expect("open viewer");
    let err = viewer
        .define_project(params(json!({"name": "Forbidden"})))
        .unwrap_err();
    assert!(matches!(err, LabError::Permission(_)));

    // The instance remains valid for reads after the rejected call.
    assert_eq!(viewer.load_recipe().expect("load").steps.len(), 2);
}

#[test]
fn unknown_step_type_is_rejected() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let mut lab = open_admin(tmp.path());

    let err = lab
        .execute_step("calibrate_flux", params(json!({})), None)
        .unwrap_err();
    assert!(matches!(err, LabError::UnknownStep(_)));
}

#[test]
fn modify_config_is_journaled_and_effective() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let mut lab = open_admin(tmp.path());
    let shared = tmp.path().join("shared-results");
    let shared_str = shared.to_str().expect("utf-8 path").to_string();

    let mut updates = BTreeMap::new();
    updates.insert("results_path".to_string(), json!(shared_str.clone()));
    lab.modify_config(updates).expect("modify config");

    assert_eq!(lab.config().results_path.as_deref(), Some(shared_str.as_str()));

    let recipe = lab.load_recipe().expect("load");
    let last = recipe.steps.last().expect("steps");
    assert_eq!(last.step_type, "modify_config");

    // The persisted document survives a fresh open.
    drop(lab);
    let reopened = open_admin(tmp.path());
    assert_eq!(reopened.config().results_path.as_deref(), Some(shared_str.as_str()));
}

#[test]
fn base_root_derives_workspace_layout() {
    let tmp = tempfile::tempdir().expect("tempdir");

    let lab = Lab::open(None, None, None, Some(tmp.path()), LabRole::Admin).expect("open");
    assert!(lab.layout().root().ends_with("workspace"));
    assert_eq!(
        lab.input_root().expect("input root").file_name().and_then(|n| n.to_str()),
        Some("input")
    );

    // Both roots missing is a caller error.
    let err = Lab::open(None, None, None, None, LabRole::Admin).unwrap_err();
    assert!(matches!(err, LabError::InvalidArguments(_)));
}

#[test]
fn admin_open_seeds_catalog_best_effort() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let lab = open_admin(tmp.path());

    // Reference data landed without any explicit sync call.
    let desc = reprolab::entities::find_descriptor("tree_species").expect("descriptor");
    let count = reprolab::entities::count(lab.database().conn(), desc).expect("count");
    assert!(count > 0);
    assert!(lab.layout().catalog_version_path().exists());

    // Catalog seeding is not journaled: the recipe only holds user steps.
    assert!(lab.load_recipe().expect("load").steps.is_empty());
}
