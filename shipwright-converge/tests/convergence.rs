use std::cell::RefCell;
use std::collections::HashSet;
use std::fs;

use shipwright_converge::{
    Action, ApplyError, ApplyOutcome, ConvergeError, ConvergenceEngine, GuardEvaluator, Ownership,
    Resource, ResourceHandler, ResourceId, ResourceRegistry, ResourceStatus, SystemHandler,
};
use shipwright_core::{ScriptedRunner, ShellRunner};
use tempfile::TempDir;

/// Records every apply; reports `Updated` unless the id is listed as
/// converged, and fails for the id listed as broken.
#[derive(Default)]
struct RecordingHandler {
    applied: RefCell<Vec<String>>,
    converged: HashSet<String>,
    broken: Option<String>,
}

impl RecordingHandler {
    fn converged(ids: &[&str]) -> Self {
        Self {
            converged: ids.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }

    fn broken(id: &str) -> Self {
        Self {
            broken: Some(id.to_string()),
            ..Self::default()
        }
    }

    fn applied(&self) -> Vec<String> {
        self.applied.borrow().clone()
    }
}

impl ResourceHandler for RecordingHandler {
    fn apply(&self, resource: &Resource, action: Action) -> Result<ApplyOutcome, ApplyError> {
        let id = resource.id.to_string();
        self.applied.borrow_mut().push(format!("{id}:{action}"));
        if self.broken.as_deref() == Some(id.as_str()) {
            return Err(ApplyError::Command {
                command: "apply".into(),
                code: Some(1),
                output: "boom".into(),
            });
        }
        if self.converged.contains(&id) {
            Ok(ApplyOutcome::Unchanged)
        } else {
            Ok(ApplyOutcome::Updated)
        }
    }
}

fn registry(resources: Vec<Resource>) -> ResourceRegistry {
    let mut reg = ResourceRegistry::new();
    for r in resources {
        reg.declare(r).expect("declare");
    }
    reg
}

fn app_service() -> ResourceId {
    ResourceId::service("app")
}

#[test]
fn repeated_notifications_fire_once_after_all_resources() {
    let reg = registry(vec![
        Resource::service("app"),
        Resource::file("/a", Ownership::new(), None).notifies(Action::Restart, app_service()),
        Resource::file("/b", Ownership::new(), None).notifies(Action::Restart, app_service()),
        Resource::file("/c", Ownership::new(), None).notifies(Action::Restart, app_service()),
    ]);
    let handler = RecordingHandler::default();
    let runner = ScriptedRunner::new();
    let engine = ConvergenceEngine::new(&handler, GuardEvaluator::new(&runner, None));

    let report = engine.run(&reg).unwrap();

    assert_eq!(
        handler.applied(),
        vec![
            "file[/a]:create",
            "file[/b]:create",
            "file[/c]:create",
            "service[app]:restart",
        ]
    );
    assert_eq!(report.notifications.len(), 1);
    assert_eq!(report.status_of(&app_service()), Some(ResourceStatus::Idle));
}

#[test]
fn unchanged_resources_do_not_notify() {
    let reg = registry(vec![
        Resource::service("app"),
        Resource::file("/a", Ownership::new(), None).notifies(Action::Restart, app_service()),
    ]);
    let handler = RecordingHandler::converged(&["file[/a]"]);
    let runner = ScriptedRunner::new();
    let engine = ConvergenceEngine::new(&handler, GuardEvaluator::new(&runner, None));

    let report = engine.run(&reg).unwrap();

    assert_eq!(handler.applied(), vec!["file[/a]:create"]);
    assert!(report.notifications.is_empty());
    assert_eq!(report.updated(), 0);
}

#[test]
fn notifications_settle_in_first_queued_order() {
    let reg = registry(vec![
        Resource::service("nginx"),
        Resource::service("monit"),
        Resource::file("/monitrc", Ownership::new(), None)
            .notifies(Action::Restart, ResourceId::service("monit")),
        Resource::file("/site", Ownership::new(), None)
            .notifies(Action::Reload, ResourceId::service("nginx"))
            .notifies(Action::Restart, ResourceId::service("monit")),
    ]);
    let handler = RecordingHandler::default();
    let runner = ScriptedRunner::new();
    let engine = ConvergenceEngine::new(&handler, GuardEvaluator::new(&runner, None));

    engine.run(&reg).unwrap();

    assert_eq!(
        &handler.applied()[2..],
        &["service[monit]:restart", "service[nginx]:reload"]
    );
}

#[test]
fn guarded_resources_are_skipped() {
    let reg = registry(vec![
        Resource::execute("create-database", "createdb blog", Some("postgres"))
            .not_if("psql --list | grep -q blog", Some("postgres")),
        Resource::execute("seed", "rake db:seed", None).only_if("test -f /seed-me", None),
    ]);
    let handler = RecordingHandler::default();
    let runner = ScriptedRunner::new().fail("test -f /seed-me", 1, "");
    let engine = ConvergenceEngine::new(&handler, GuardEvaluator::new(&runner, None));

    let report = engine.run(&reg).unwrap();

    assert!(handler.applied().is_empty());
    assert_eq!(report.count(ResourceStatus::Skipped), 2);
}

#[test]
fn apply_failure_aborts_before_later_resources_and_notifications() {
    let reg = registry(vec![
        Resource::service("app"),
        Resource::file("/a", Ownership::new(), None).notifies(Action::Restart, app_service()),
        Resource::file("/b", Ownership::new(), None),
        Resource::file("/c", Ownership::new(), None),
    ]);
    let handler = RecordingHandler::broken("file[/b]");
    let runner = ScriptedRunner::new();
    let engine = ConvergenceEngine::new(&handler, GuardEvaluator::new(&runner, None));

    let err = engine.run(&reg).unwrap_err();

    match err {
        ConvergeError::ResourceApply { resource, .. } => assert_eq!(resource.to_string(), "file[/b]"),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(handler.applied(), vec!["file[/a]:create", "file[/b]:create"]);
}

#[test]
fn guard_that_cannot_run_aborts_the_run() {
    let reg = registry(vec![
        Resource::execute("x", "do-x", None).not_if("check-x", None),
        Resource::file("/after", Ownership::new(), None),
    ]);
    let handler = RecordingHandler::default();
    let runner = ScriptedRunner::new().spawn_failure("check-x");
    let engine = ConvergenceEngine::new(&handler, GuardEvaluator::new(&runner, None));

    let err = engine.run(&reg).unwrap_err();

    assert!(matches!(err, ConvergeError::GuardExecution { .. }));
    assert!(handler.applied().is_empty());
}

#[test]
fn undeclared_notification_target_fails_before_any_apply() {
    let reg = registry(vec![
        Resource::file("/a", Ownership::new(), None),
        Resource::file("/b", Ownership::new(), None)
            .notifies(Action::Reload, ResourceId::service("nginx")),
    ]);
    let handler = RecordingHandler::default();
    let runner = ScriptedRunner::new();
    let engine = ConvergenceEngine::new(&handler, GuardEvaluator::new(&runner, None));

    let err = engine.run(&reg).unwrap_err();

    assert!(err.is_configuration());
    assert!(handler.applied().is_empty());
}

#[test]
#[cfg(unix)]
fn second_run_against_real_state_changes_nothing() {
    let root = TempDir::new().unwrap();
    let base = root.path();
    let marker = base.join("seeded");
    let build = || {
        registry(vec![
            Resource::service("app"),
            Resource::directory(base.join("shared/config"), Ownership::new().mode(0o755)).recursive(),
            Resource::template(
                base.join("shared/config/unicorn.rb"),
                Ownership::new().mode(0o644),
                "unicorn/unicorn.rb.tera",
                "worker_processes 2\n".to_string(),
            )
            .notifies(Action::Restart, app_service()),
            Resource::file(base.join("app.log"), Ownership::new(), None)
                .with_action(Action::CreateIfMissing),
            Resource::link(base.join("current"), base.join("shared")),
            Resource::execute("seed", format!("touch {}", marker.display()), None)
                .not_if(format!("test -f {}", marker.display()), None),
        ])
    };
    let runner = ShellRunner::new(None).unwrap();
    let handler = SystemHandler::new(&runner, None);
    // Notifications are routed through a recorder so no real service is touched.
    let first = {
        let recorder = NotifyRecorder { inner: &handler, fired: RefCell::default() };
        let report = ConvergenceEngine::new(&recorder, GuardEvaluator::new(&runner, None))
            .run(&build())
            .unwrap();
        assert_eq!(recorder.fired.borrow().as_slice(), ["service[app]:restart"]);
        report
    };
    assert_eq!(first.updated(), 5);
    assert!(marker.exists());

    let recorder = NotifyRecorder { inner: &handler, fired: RefCell::default() };
    let second = ConvergenceEngine::new(&recorder, GuardEvaluator::new(&runner, None))
        .run(&build())
        .unwrap();
    assert_eq!(second.updated(), 0);
    assert_eq!(second.count(ResourceStatus::Skipped), 1);
    assert!(recorder.fired.borrow().is_empty());
    assert_eq!(
        fs::read_to_string(base.join("shared/config/unicorn.rb")).unwrap(),
        "worker_processes 2\n"
    );
}

/// Passes everything but service actions through to the system handler.
struct NotifyRecorder<'a> {
    inner: &'a SystemHandler<'a>,
    fired: RefCell<Vec<String>>,
}

impl ResourceHandler for NotifyRecorder<'_> {
    fn apply(&self, resource: &Resource, action: Action) -> Result<ApplyOutcome, ApplyError> {
        if resource.id.kind == shipwright_converge::ResourceType::Service {
            self.fired.borrow_mut().push(format!("{}:{action}", resource.id));
            return Ok(ApplyOutcome::Updated);
        }
        self.inner.apply(resource, action)
    }
}
