use std::fs;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use fs2::FileExt;
use predicates::str::contains;
use tempfile::TempDir;

const BLOG: &str = r#"
id: blog
environment: prod
repository: git@example.com:blog.git
revision: v1.4.0
ruby_version: 2.0.0
ssl_enabled: true
server_names:
  - blog.example.com
environment_variables:
  DATABASE_NAME: blog_prod
  DATABASE_USERNAME: blog
  DATABASE_PASSWORD: secret
"#;

fn shipwright(root: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("shipwright"));
    cmd.arg("--root").arg(root).env("RUST_LOG", "warn");
    cmd
}

/// Config root with one app and every host path inside `root`.
fn config_root() -> TempDir {
    let root = TempDir::new().expect("root");
    fs::create_dir_all(root.path().join("apps")).unwrap();
    fs::write(root.path().join("apps/blog-prod.yaml"), BLOG).unwrap();
    let host = format!(
        "www_root: {0}/www\nlock_dir: {0}/locks\n",
        root.path().display()
    );
    fs::write(root.path().join("host.yaml"), host).unwrap();
    root
}

#[test]
fn apps_lists_configured_applications() {
    let root = config_root();
    shipwright(root.path())
        .arg("apps")
        .assert()
        .success()
        .stdout(contains("blog-prod"))
        .stdout(contains("v1.4.0"))
        .stdout(contains("blog.example.com"));
}

#[test]
fn apps_without_configuration() {
    let root = TempDir::new().unwrap();
    shipwright(root.path())
        .arg("apps")
        .assert()
        .success()
        .stdout(contains("No applications configured"));
}

#[test]
fn plan_json_lists_resources_in_declaration_order() {
    let root = config_root();
    let output = shipwright(root.path())
        .args(["plan", "blog-prod", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let plan: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let resources = plan.as_array().unwrap();
    assert_eq!(resources[0]["id"], "group[blog-prod]");
    assert_eq!(resources[1]["id"], "user[blog-prod]");

    let nginx = resources
        .iter()
        .find(|r| r["id"] == "service[nginx]")
        .unwrap();
    assert_eq!(nginx["action"], "nothing");

    let database = resources
        .iter()
        .find(|r| r["id"] == "database[blog_prod]")
        .unwrap();
    assert_eq!(database["guard"]["kind"], "not_if");
    assert_eq!(database["guard"]["user"], "postgres");
}

#[test]
fn plan_table_shows_notifications() {
    let root = config_root();
    shipwright(root.path())
        .args(["plan", "blog-prod"])
        .assert()
        .success()
        .stdout(contains("reload service[nginx]"));
}

#[test]
fn unknown_app_is_a_configuration_error() {
    let root = config_root();
    shipwright(root.path())
        .args(["plan", "shop-prod"])
        .assert()
        .code(2)
        .stderr(contains("not found"));
}

#[test]
fn descriptor_without_server_names_is_rejected() {
    let root = config_root();
    fs::write(
        root.path().join("apps/blog-prod.yaml"),
        BLOG.replace("  - blog.example.com\n", "").replace("server_names:\n", "server_names: []\n"),
    )
    .unwrap();
    shipwright(root.path())
        .args(["plan", "blog-prod"])
        .assert()
        .code(2)
        .stderr(contains("server_names"));
}

#[test]
fn releases_before_first_deploy() {
    let root = config_root();
    shipwright(root.path())
        .args(["releases", "blog-prod"])
        .assert()
        .success()
        .stdout(contains("No releases of 'blog-prod' yet"));
}

#[test]
fn deploy_refuses_to_run_while_locked() {
    let root = config_root();
    let locks = root.path().join("locks");
    fs::create_dir_all(&locks).unwrap();
    let held = fs::File::create(locks.join("blog-prod.lock")).unwrap();
    held.lock_exclusive().unwrap();

    shipwright(root.path())
        .args(["deploy", "blog-prod"])
        .assert()
        .code(19)
        .stderr(contains("another deploy of 'blog-prod'"));

    held.unlock().unwrap();
}

#[test]
fn rollback_without_history_is_refused() {
    let root = config_root();
    shipwright(root.path())
        .args(["rollback", "blog-prod"])
        .assert()
        .code(2)
        .stderr(contains("no earlier release"));
}
