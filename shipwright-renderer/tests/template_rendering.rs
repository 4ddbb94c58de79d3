use std::collections::BTreeMap;
use std::fs;

use shipwright_core::{settings, ApplicationDescriptor};
use shipwright_renderer::{RenderError, Renderer, TemplateContext, TemplateKind};
use tempfile::TempDir;

fn shop() -> ApplicationDescriptor {
    ApplicationDescriptor {
        id: "shop".to_string(),
        environment: "staging".to_string(),
        repository: "git@example.com:shop.git".to_string(),
        revision: "main".to_string(),
        ruby_version: "2.0.0".to_string(),
        ssl_enabled: false,
        delayed_job: false,
        server_names: vec!["shop.example.com".to_string()],
        environment_variables: BTreeMap::from([(
            "RAILS_ENV".to_string(),
            "staging".to_string(),
        )]),
    }
}

#[test]
fn host_settings_from_disk_drive_rendered_paths() {
    let root = TempDir::new().unwrap();
    fs::write(
        root.path().join("host.yaml"),
        "www_root: /srv/apps\nlog_root: /srv/log\n",
    )
    .unwrap();
    let host = settings::load_at(root.path()).unwrap();
    let renderer = Renderer::new(None).unwrap();

    let unicorn = renderer
        .render(&shop(), &host, TemplateKind::UnicornConfig)
        .unwrap();
    assert!(unicorn.contains(r#"working_directory "/srv/apps/shop-staging/current""#));
    assert!(unicorn.contains(r#"stdout_path "/srv/log/shop-staging.stdout.log""#));
    assert!(unicorn.contains(r#"ENV["RAILS_ENV"] = "staging""#));

    let nginx = renderer
        .render(&shop(), &host, TemplateKind::NginxSite)
        .unwrap();
    assert!(nginx.contains("root /srv/apps/shop-staging/current/public;"));
    assert!(nginx.contains("server_name shop.example.com;"));
}

#[test]
fn each_template_logs_to_its_own_file() {
    let host = settings::HostSettings::default();
    let renderer = Renderer::new(None).unwrap();

    let init = renderer
        .render(&shop(), &host, TemplateKind::InitScript)
        .unwrap();
    assert!(init.contains("export LOG_FILE='/var/log/www/shop-staging.application.log'"));

    let unicorn = renderer
        .render(&shop(), &host, TemplateKind::UnicornConfig)
        .unwrap();
    assert!(unicorn.contains(r#"ENV["LOG_FILE"] = "/var/log/www/shop-staging.chef.log""#));
}

#[test]
fn overridden_partial_is_used_by_embedded_template() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("_partials")).unwrap();
    fs::write(
        dir.path().join("_partials/env_exports.tera"),
        "# environment elided\n",
    )
    .unwrap();
    let renderer = Renderer::new(Some(dir.path())).unwrap();
    let host = settings::HostSettings::default();

    let init = renderer
        .render(&shop(), &host, TemplateKind::InitScript)
        .unwrap();
    assert!(init.contains("# environment elided"));
    assert!(!init.contains("export RAILS_ENV"));
}

#[test]
fn caller_supplied_context_is_rendered_as_given() {
    let host = settings::HostSettings::default();
    let mut ctx = TemplateContext::for_app(&shop(), &host, "application");
    ctx.server.names.push("shop.example.org".to_string());

    let nginx = Renderer::new(None)
        .unwrap()
        .render_with_context(&ctx, TemplateKind::NginxSite)
        .unwrap();
    assert!(nginx.contains("server_name shop.example.com shop.example.org;"));
}

#[test]
fn broken_override_is_reported_when_templates_load() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("nginx")).unwrap();
    fs::write(dir.path().join("nginx/site.conf.tera"), "server {{ app.name\n").unwrap();

    let err = Renderer::new(Some(dir.path())).err().unwrap();
    assert!(matches!(err, RenderError::Tera(_)), "got: {err}");
    assert!(err.to_string().starts_with("template error"));
}
