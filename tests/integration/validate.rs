use werf_config::test_utils::TestProject;

use crate::common::{BASIC_CONFIG, run_werf_config};

const META: &str = "configVersion: 1\nproject: demo\n---\n";

fn validate_loose(config: &str) -> crate::common::CommandOutput {
    let project = TestProject::new().unwrap();
    project.write("werf.yaml", config).unwrap();
    project.write("Dockerfile.worker", "FROM alpine:3.20\n").unwrap();
    run_werf_config(project.path(), &["validate", "--loose-giterminism"]).unwrap()
}

/// The text summary lists images, artifacts and the build order
#[test]
fn test_validate_text_summary() {
    let output = validate_loose(BASIC_CONFIG);
    output
        .assert_success()
        .assert_stdout_contains("werf config of project demo is valid")
        .assert_stdout_contains("artifacts: builder")
        .assert_stdout_contains("app imports /out from artifact builder to /usr/local/bin");
}

/// JSON output for scripts
#[test]
fn test_validate_json() {
    let project = TestProject::new().unwrap();
    project.write("werf.yaml", BASIC_CONFIG).unwrap();
    project.write("Dockerfile.worker", "FROM alpine:3.20\n").unwrap();

    let output =
        run_werf_config(project.path(), &["validate", "--loose-giterminism", "--format", "json"]).unwrap();
    output.assert_success();

    let json: serde_json::Value = serde_json::from_str(&output.stdout).unwrap();
    assert_eq!(json["valid"], true);
    assert_eq!(json["project"], "demo");
    assert_eq!(json["images"], serde_json::json!(["app", "worker"]));

    let order: Vec<&str> = json["build_order"].as_array().unwrap().iter().filter_map(|v| v.as_str()).collect();
    let position = |name: &str| order.iter().position(|n| *n == name).unwrap();
    assert!(position("builder") < position("app"));

    project.write("werf.yaml", format!("{BASIC_CONFIG}---\nimage: app\nfrom: alpine\n")).unwrap();
    let output =
        run_werf_config(project.path(), &["validate", "--loose-giterminism", "--format", "json"]).unwrap();
    output.assert_failure();
    let json: serde_json::Value = serde_json::from_str(&output.stdout).unwrap();
    assert_eq!(json["valid"], false);
    assert!(json["errors"][0].as_str().unwrap().contains("must be unique"));
}

/// Images that depend on each other in a loop are rejected
#[test]
fn test_validate_cycle() {
    let output = validate_loose(&format!(
        "{META}image: a\nfromImage: b\n---\nimage: b\nfrom: alpine\nimport:\n- image: a\n  add: /app\n"
    ));
    output.assert_failure().assert_stderr_contains("infinite loop detected between images");
}

/// Duplicate names across images and artifacts
#[test]
fn test_validate_duplicate_names() {
    let output = validate_loose(&format!(
        "{META}image: app\nfrom: alpine\n---\nartifact: app\nfrom: golang\n"
    ));
    output.assert_failure().assert_stderr_contains("image and artifact names must be unique");
}

/// Unknown references get a suggestion
#[test]
fn test_validate_unresolved_reference() {
    let output = validate_loose(&format!(
        "{META}image: base\nfrom: alpine\n---\nimage: app\nfromImage: bse\n"
    ));
    output.assert_failure().assert_stderr_contains("unresolved references").assert_stderr_contains("bse");
}

/// Errors point at the line of the rendered stream
#[test]
fn test_validate_line_numbers() {
    let output = validate_loose(&format!("{META}image: app\nfrom: alpine\nunknownKey: 1\n"));
    output.assert_failure().assert_stderr_contains("unknownKey").assert_stderr_contains("line 6");
}

/// A config without meta suggests a project name from the origin remote
#[test]
fn test_validate_missing_meta_suggests_project() {
    let project = TestProject::with_git().unwrap();
    project.git().unwrap().remote_add("origin", "https://github.com/acme/backend-api.git").unwrap();
    project.write("werf.yaml", "image: app\nfrom: alpine\n").unwrap();
    project.commit_all("Initial commit").unwrap();

    let output = run_werf_config(project.path(), &["validate"]).unwrap();
    output
        .assert_failure()
        .assert_stderr_contains("meta config section (configVersion and project) is not defined")
        .assert_stderr_contains("project: backend-api");
}

/// Meta values are checked
#[test]
fn test_validate_meta_values() {
    let output = validate_loose("configVersion: 2\nproject: demo\n");
    output.assert_failure().assert_stderr_contains("configVersion");

    let output = validate_loose("configVersion: 1\nproject: Not_A_Slug\n");
    output.assert_failure().assert_stderr_contains("Not_A_Slug");
}
