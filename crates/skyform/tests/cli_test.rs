#![allow(deprecated)] // TODO: cargo_bin → cargo_bin_cmd! へ移行

use assert_cmd::Command;
use predicates::prelude::*;
mod common;
use common::TestProject;

/// CLIヘルプが正しく表示されることを確認
#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("skyform").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("plan"))
        .stdout(predicate::str::contains("apply"))
        .stdout(predicate::str::contains("destroy"))
        .stdout(predicate::str::contains("output"));
}

#[test]
fn test_cli_version() {
    let mut cmd = Command::cargo_bin("skyform").unwrap();
    cmd.arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("skyform"));
}

#[test]
fn test_output_help() {
    let mut cmd = Command::cargo_bin("skyform").unwrap();
    cmd.arg("output")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--show-sensitive"));
}

#[test]
fn test_invalid_command() {
    let mut cmd = Command::cargo_bin("skyform").unwrap();
    cmd.arg("invalid-command").assert().failure();
}

/// プロジェクトディレクトリ外で validate するとエラーになる
#[test]
fn test_validate_without_project() {
    let project = TestProject::new();
    project
        .skyform()
        .arg("validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("skyform.kdl"));
}

#[test]
fn test_malformed_var_is_rejected() {
    let project = TestProject::with_golden_stack();
    project
        .skyform()
        .args(["validate", "--var", "ssh_ingress_cidr"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("KEY=VALUE"));
}

#[test]
fn test_init_writes_starter_document() {
    let project = TestProject::new();
    project
        .skyform()
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("skyform.kdl"));

    let document = std::fs::read_to_string(project.path().join("skyform.kdl")).unwrap();
    assert!(document.contains("aws_security_group"));
    let gitignore = std::fs::read_to_string(project.path().join(".skyform/.gitignore")).unwrap();
    assert_eq!(gitignore.trim(), "*");

    // 既存のファイルは --force なしでは上書きしない
    project.write_skyform_kdl("project \"mine\"\n");
    project.skyform().arg("init").assert().success();
    assert_eq!(
        std::fs::read_to_string(project.path().join("skyform.kdl")).unwrap(),
        "project \"mine\"\n"
    );
    project.skyform().args(["init", "--force"]).assert().success();
    assert!(
        std::fs::read_to_string(project.path().join("skyform.kdl"))
            .unwrap()
            .contains("aws_instance")
    );
}

#[test]
fn test_validate_golden_stack() {
    let project = TestProject::with_golden_stack();
    project
        .skyform()
        .args(["validate", "--var", common::OPERATOR_CIDR])
        .assert()
        .success()
        .stdout(predicate::str::contains("ドキュメントは正常です"))
        .stdout(predicate::str::contains("aws_instance.web"));
}

/// 0.0.0.0/0 からの SSH は検証で拒否される
#[test]
fn test_validate_rejects_open_ssh() {
    let project = TestProject::with_golden_stack();
    project
        .skyform()
        .args(["validate", "--var", "ssh_ingress_cidr=0.0.0.0/0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("検証エラー"))
        .stderr(predicate::str::contains("aws_security_group.ssh"));
}

#[test]
fn test_validate_rejects_missing_tags() {
    let project = TestProject::new();
    project.write_skyform_kdl(
        r#"
project "untagged"

provider "aws" {
    region "eu-west-1"
}

resource "aws_vpc" "main" {
    cidr_block "10.0.0.0/16"
}
"#,
    );
    project
        .skyform()
        .arg("validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Owner"));
}

#[test]
fn test_plan_shows_summary() {
    let project = TestProject::with_golden_stack();
    project
        .skyform()
        .args(["plan", "--var", common::OPERATOR_CIDR])
        .assert()
        .success()
        .stdout(predicate::str::contains("+ aws_vpc.main"))
        .stdout(predicate::str::contains("<= data.aws_ami.debian"))
        .stdout(predicate::str::contains("9 to create"));

    // plan は state を書かない
    assert!(!project.path().join(".skyform/state.json").exists());
}

#[test]
fn test_graph_dot() {
    let project = TestProject::with_golden_stack();
    project
        .skyform()
        .args(["graph", "--dot"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("digraph skyform {"))
        .stdout(predicate::str::contains(
            "\"aws_subnet.public\" -> \"aws_vpc.main\"",
        ));
}

#[test]
fn test_graph_rejects_cycle() {
    let project = TestProject::new();
    project.write_skyform_kdl(
        r#"
project "cycle"

provider "aws" {
    region "eu-west-1"
    default_tags {
        Owner "alice"
        Project "cycle"
        Environment "test"
    }
}

resource "aws_vpc" "a" {
    cidr_block "10.0.0.0/16"
    depends_on "aws_vpc.b"
}

resource "aws_vpc" "b" {
    cidr_block "10.1.0.0/16"
    depends_on "aws_vpc.a"
}
"#,
    );
    project
        .skyform()
        .arg("graph")
        .assert()
        .failure()
        .stderr(predicate::str::contains("aws_vpc.a"));
}

#[test]
fn test_output_without_state() {
    let project = TestProject::with_golden_stack();
    project
        .skyform()
        .arg("output")
        .assert()
        .success()
        .stdout(predicate::str::contains("output はありません"));

    project
        .skyform()
        .args(["output", "--show-sensitive"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("output 名"));
}
