use assert_cmd::Command;
use predicates::prelude::*;
use werf_config::test_utils::TestProject;

use crate::common::{BASIC_CONFIG, run_werf_config};

fn loose_project(config: &str) -> TestProject {
    let project = TestProject::new().unwrap();
    project.write("werf.yaml", config).unwrap();
    project
}

fn werf_config(project: &TestProject) -> Command {
    let mut cmd = Command::cargo_bin("werf-config").unwrap();
    cmd.current_dir(project.path())
        .env_remove("RUST_LOG")
        .env("NO_COLOR", "1")
        .env("WERF_LOOSE_GITERMINISM", "true");
    cmd
}

/// Without image names the whole rendered stream is printed
#[test]
fn test_render_whole_stream() {
    let project = loose_project(BASIC_CONFIG);

    werf_config(&project)
        .arg("render")
        .assert()
        .success()
        .stdout(predicate::str::contains("project: demo"))
        .stdout(predicate::str::contains("artifact: builder"))
        .stdout(predicate::str::contains("dockerfile: Dockerfile.worker"));
}

/// Named images print only their own sections, in the requested order
#[test]
fn test_render_selected_images() {
    let project = loose_project(BASIC_CONFIG);

    let output = werf_config(&project).args(["render", "worker", "app"]).output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();

    assert!(!stdout.contains("project: demo"));
    assert!(!stdout.contains("golang"));
    let worker = stdout.find("image: worker").unwrap();
    let app = stdout.find("image: app").unwrap();
    assert!(worker < app);
    assert!(stdout.contains("---\n"));
}

/// Unknown names fail with a suggestion
#[test]
fn test_render_unknown_image() {
    let project = loose_project(BASIC_CONFIG);

    werf_config(&project)
        .args(["render", "ap"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("specified image ap is not defined in werf.yaml"))
        .stderr(predicate::str::contains("Did you mean app?"));
}

/// Fragments from the templates directory can be included in any order
#[test]
fn test_render_with_templates() {
    let project = loose_project(
        "configVersion: 1\nproject: demo\n---\n{{ include(name=\"images/app.tmpl\") }}\n---\n{{ include(name=\"worker.tmpl\", data=\"debian\") }}\n",
    );
    project
        .write(".werf/images/app.tmpl", "image: app\nfrom: {% include \"_base.tmpl\" %}\n")
        .unwrap();
    project.write(".werf/_base.tmpl", "alpine:3.20").unwrap();
    project.write(".werf/worker.tmpl", "image: worker\nfrom: {{ value }}\n").unwrap();

    werf_config(&project)
        .arg("render")
        .assert()
        .success()
        .stdout(predicate::str::contains("from: alpine:3.20"))
        .stdout(predicate::str::contains("from: debian"));
}

/// A custom templates directory and config path
#[test]
fn test_render_custom_paths() {
    let project = TestProject::new().unwrap();
    project
        .write(
            "ci/werf-ci.yml",
            "configVersion: 1\nproject: demo\n---\nimage: app\nfrom: {{ include(name=\"base.tmpl\") }}\n",
        )
        .unwrap();
    project.write("ci/templates/base.tmpl", "ubuntu:24.04").unwrap();

    werf_config(&project)
        .args(["render", "--config", "ci/werf-ci.yml", "--config-templates-dir", "ci/templates"])
        .assert()
        .success()
        .stdout(predicate::str::contains("from: ubuntu:24.04"));
}

/// `Env` carries the --env value
#[test]
fn test_render_env_value() {
    let project = loose_project(
        "configVersion: 1\nproject: demo\n---\nimage: app\nfrom: alpine\n{% if Env == \"production\" %}docker:\n  ENV:\n    MODE: prod\n{% endif %}",
    );

    werf_config(&project)
        .args(["render", "--env", "production"])
        .assert()
        .success()
        .stdout(predicate::str::contains("MODE: prod"));

    werf_config(&project)
        .arg("render")
        .assert()
        .success()
        .stdout(predicate::str::contains("MODE").not());
}

/// A glob without matches renders an empty map and logs a warning
#[test]
fn test_files_glob_without_matches() {
    let project = loose_project(
        "configVersion: 1\nproject: demo\n---\nimage: app\nfrom: alpine\n# {{ files_glob(pattern=\"conf/*.ini\") | length }} config files\n",
    );

    werf_config(&project)
        .arg("render")
        .assert()
        .success()
        .stdout(predicate::str::contains("# 0 config files"))
        .stderr(predicate::str::contains("No matches in the project directory for the pattern 'conf/*.ini'"));
}

/// The rendered file is kept and its path logged on request
#[test]
fn test_log_rendered_file_path() {
    let project = loose_project(BASIC_CONFIG);

    let output = werf_config(&project).args(["render", "--log-rendered-file-path"]).output().unwrap();
    assert!(output.status.success());

    let stderr = String::from_utf8(output.stderr).unwrap();
    let line = stderr.lines().find(|line| line.contains("Using werf config render file: ")).unwrap();
    let path = line.split("Using werf config render file: ").nth(1).unwrap().trim();
    let content = std::fs::read_to_string(path).unwrap();
    assert!(content.contains("project: demo"));
    std::fs::remove_file(path).unwrap();
}

/// No config in the project directory
#[test]
fn test_render_without_config() {
    let project = TestProject::new().unwrap();

    let output = run_werf_config(project.path(), &["render", "--loose-giterminism"]).unwrap();
    output
        .assert_failure()
        .assert_stderr_contains("the werf config 'werf.yaml', 'werf.yml' not found in the project directory");
}

/// Template syntax errors name the broken fragment
#[test]
fn test_render_template_syntax_error() {
    let project = loose_project("configVersion: 1\nproject: demo\n---\n{{ include(name=\"broken.tmpl\") }}\n");
    project.write(".werf/broken.tmpl", "image: {{ name \n").unwrap();

    werf_config(&project)
        .arg("render")
        .assert()
        .failure()
        .stderr(predicate::str::contains("broken.tmpl"));
}
