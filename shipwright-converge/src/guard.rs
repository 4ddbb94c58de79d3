//! Guard evaluation: decides whether a resource's action is needed.

use std::time::Duration;

use shipwright_core::{CommandRunner, CommandSpec};

use crate::error::ConvergeError;
use crate::resource::{GuardKind, Resource};

pub struct GuardEvaluator<'a> {
    runner: &'a dyn CommandRunner,
    timeout: Option<Duration>,
}

impl<'a> GuardEvaluator<'a> {
    pub fn new(runner: &'a dyn CommandRunner, timeout: Option<Duration>) -> Self {
        Self { runner, timeout }
    }

    /// `not_if` passing or `only_if` failing means skip. No guard means
    /// apply. A check that cannot run at all is an error, never a skip.
    pub fn should_apply(&self, resource: &Resource) -> Result<bool, ConvergeError> {
        let Some(guard) = resource.guard.as_ref() else {
            return Ok(true);
        };
        let mut spec = CommandSpec::new(&guard.command).user_opt(guard.user.as_deref());
        if let Some(timeout) = self.timeout {
            spec = spec.timeout(timeout);
        }
        let output = self
            .runner
            .run(&spec)
            .map_err(|source| ConvergeError::GuardExecution {
                resource: resource.id.clone(),
                source,
            })?;
        let passed = output.success();
        let apply = match guard.kind {
            GuardKind::NotIf => !passed,
            GuardKind::OnlyIf => passed,
        };
        tracing::debug!(
            resource = %resource.id,
            guard = ?guard.kind,
            check_passed = passed,
            apply,
            "guard evaluated"
        );
        Ok(apply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Ownership;
    use rstest::rstest;
    use shipwright_core::ScriptedRunner;

    fn guarded(kind: GuardKind) -> Resource {
        let r = Resource::directory("/srv/x", Ownership::new());
        match kind {
            GuardKind::NotIf => r.not_if("check-x", Some("postgres")),
            GuardKind::OnlyIf => r.only_if("check-x", None),
        }
    }

    #[rstest]
    #[case(GuardKind::NotIf, true, false)]
    #[case(GuardKind::NotIf, false, true)]
    #[case(GuardKind::OnlyIf, true, true)]
    #[case(GuardKind::OnlyIf, false, false)]
    fn guard_truth_table(#[case] kind: GuardKind, #[case] check_ok: bool, #[case] expected: bool) {
        let runner = if check_ok {
            ScriptedRunner::new()
        } else {
            ScriptedRunner::new().fail("check-x", 1, "")
        };
        let eval = GuardEvaluator::new(&runner, None);
        assert_eq!(eval.should_apply(&guarded(kind)).unwrap(), expected);
    }

    #[test]
    fn no_guard_always_applies_without_running_anything() {
        let runner = ScriptedRunner::new();
        let eval = GuardEvaluator::new(&runner, None);
        let r = Resource::directory("/srv/x", Ownership::new());
        assert!(eval.should_apply(&r).unwrap());
        assert!(runner.commands().is_empty());
    }

    #[test]
    fn guard_runs_as_requested_user_with_timeout() {
        let runner = ScriptedRunner::new();
        let eval = GuardEvaluator::new(&runner, Some(Duration::from_secs(7)));
        eval.should_apply(&guarded(GuardKind::NotIf)).unwrap();
        let call = &runner.calls()[0];
        assert_eq!(call.user.as_deref(), Some("postgres"));
        assert_eq!(call.timeout, Some(Duration::from_secs(7)));
    }

    #[rstest]
    #[case::spawn(ScriptedRunner::new().spawn_failure("check-x"))]
    #[case::timeout(ScriptedRunner::new().time_out("check-x"))]
    fn unrunnable_guard_is_an_error(#[case] runner: ScriptedRunner) {
        let eval = GuardEvaluator::new(&runner, None);
        let err = eval.should_apply(&guarded(GuardKind::NotIf)).unwrap_err();
        assert!(matches!(err, ConvergeError::GuardExecution { .. }));
    }
}
