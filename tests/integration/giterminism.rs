use werf_config::test_utils::TestProject;

use crate::common::{BASIC_CONFIG, run_werf_config, run_werf_config_with_env};

fn committed_project() -> TestProject {
    let project = TestProject::with_git().unwrap();
    project.write("werf.yaml", BASIC_CONFIG).unwrap();
    project.write("Dockerfile.worker", "FROM alpine:3.20\n").unwrap();
    project.commit_all("Initial commit").unwrap();
    project
}

/// A committed project validates from the head commit
#[test]
fn test_strict_reads_committed_config() {
    let project = committed_project();

    let output = run_werf_config(project.path(), &["validate"]).unwrap();
    output.assert_success().assert_stdout_contains("demo").assert_stdout_contains("app, worker");
}

/// A modified config is rejected until committed or read in loose mode
#[test]
fn test_uncommitted_config_changes() {
    let project = committed_project();
    project.write("werf.yaml", BASIC_CONFIG.replace("alpine:3.20", "alpine:3.21")).unwrap();

    let output = run_werf_config(project.path(), &["render"]).unwrap();
    output
        .assert_failure()
        .assert_stderr_contains("the werf config 'werf.yaml' has uncommitted changes")
        .assert_stderr_contains("config.allowUncommitted");

    let output = run_werf_config(project.path(), &["render", "--loose-giterminism"]).unwrap();
    output.assert_success().assert_stdout_contains("alpine:3.21");

    let output =
        run_werf_config_with_env(project.path(), &["render"], &[("WERF_LOOSE_GITERMINISM", "1")]).unwrap();
    output.assert_success().assert_stdout_contains("alpine:3.21");

    project.commit_all("Bump alpine").unwrap();
    let output = run_werf_config(project.path(), &["render"]).unwrap();
    output.assert_success().assert_stdout_contains("alpine:3.21");
}

/// Without a commit the config is reported as untracked
#[test]
fn test_untracked_config() {
    let project = TestProject::with_git().unwrap();
    project.write("README.md", "demo\n").unwrap();
    project.commit_all("Initial commit").unwrap();
    project.write("werf.yaml", BASIC_CONFIG).unwrap();

    let output = run_werf_config(project.path(), &["render"]).unwrap();
    output.assert_failure().assert_stderr_contains("the untracked werf config 'werf.yaml' must be committed");
}

/// An untracked template fails in strict mode unless the allow-list covers it
#[test]
fn test_uncommitted_template_allow_list() {
    let project = committed_project();
    project
        .write("werf.yaml", format!("{BASIC_CONFIG}---\n{{{{ include(name=\"extra.tmpl\") }}}}\n"))
        .unwrap();
    project.commit_all("Include extra").unwrap();
    project.write(".werf/extra.tmpl", "image: extra\nfrom: alpine\n").unwrap();

    let output = run_werf_config(project.path(), &["render", "extra"]).unwrap();
    output.assert_failure().assert_stderr_contains("untracked werf config template '.werf/extra.tmpl'");

    project
        .write(
            "werf-giterminism.yaml",
            "giterminismConfigVersion: 1\nconfig:\n  allowUncommittedTemplates: [\".werf/*.tmpl\"]\n",
        )
        .unwrap();
    project.commit_all("Allow templates").unwrap();
    // Allowed templates are read from the working tree even when they differ from the commit.
    project.write(".werf/extra.tmpl", "image: extra\nfrom: alpine:edge\n").unwrap();

    let output = run_werf_config(project.path(), &["render", "extra"]).unwrap();
    output.assert_success().assert_stdout_contains("from: alpine:edge");
}

/// Environment variables need an allow-list entry in strict mode
#[test]
fn test_env_variables_are_gated() {
    let project = TestProject::with_git().unwrap();
    project
        .write(
            "werf.yaml",
            "configVersion: 1\nproject: demo\n---\nimage: app\nfrom: alpine:{{ env(name=\"APP_VERSION\") }}\n",
        )
        .unwrap();
    project.commit_all("Initial commit").unwrap();
    let envs = [("APP_VERSION", "3.20")];

    let output = run_werf_config_with_env(project.path(), &["render"], &envs).unwrap();
    output.assert_failure().assert_stderr_contains("environment variable 'APP_VERSION' is not allowed");

    project
        .write(
            "werf-giterminism.yaml",
            "giterminismConfigVersion: 1\nconfig:\n  goTemplateRendering:\n    allowEnvVariables: [\"/^APP_/\"]\n",
        )
        .unwrap();
    project.commit_all("Allow APP_ variables").unwrap();

    let output = run_werf_config_with_env(project.path(), &["render"], &envs).unwrap();
    output.assert_success().assert_stdout_contains("from: alpine:3.20");
}

/// Dockerfiles are read from the commit by validate
#[test]
fn test_untracked_dockerfile() {
    let project = TestProject::with_git().unwrap();
    project.write("werf.yaml", BASIC_CONFIG).unwrap();
    project.commit_all("Initial commit").unwrap();
    project.write("Dockerfile.worker", "FROM alpine:3.20\n").unwrap();

    let output = run_werf_config(project.path(), &["validate"]).unwrap();
    output
        .assert_failure()
        .assert_stderr_contains("the untracked dockerfile 'Dockerfile.worker' must be committed")
        .assert_stderr_contains("image worker");
}

/// Files read by templates follow the same policy
#[test]
fn test_files_get_reads_commit() {
    let project = TestProject::with_git().unwrap();
    project
        .write(
            "werf.yaml",
            "configVersion: 1\nproject: demo\n---\nimage: app\nfrom: {{ files_get(path=\"base-image.txt\") | trim }}\n",
        )
        .unwrap();
    project.write("base-image.txt", "alpine:3.20\n").unwrap();
    project.commit_all("Initial commit").unwrap();

    let output = run_werf_config(project.path(), &["render"]).unwrap();
    output.assert_success().assert_stdout_contains("from: alpine:3.20");

    project.write("base-image.txt", "alpine:edge\n").unwrap();
    let output = run_werf_config(project.path(), &["render"]).unwrap();
    output.assert_failure().assert_stderr_contains("the file 'base-image.txt' has uncommitted changes");
}
