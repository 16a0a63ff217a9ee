//! Sandbox run lifecycle

use uuid::Uuid;

use super::SandboxJob;

/// Lifecycle of a single sandbox run
///
/// `Created → Provisioned → Running → Completed | Failed → Destroyed`, where
/// `Destroyed` is reachable from every state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Created,
    Provisioned,
    Running,
    Completed,
    Failed,
    Destroyed,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Provisioned => "provisioned",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Destroyed => "destroyed",
        }
    }

    /// Whether `self → next` is a legal transition
    pub fn can_transition_to(&self, next: RunState) -> bool {
        use RunState::*;
        match (self, next) {
            (Destroyed, _) => false,
            (_, Destroyed) => true,
            (Created, Provisioned) | (Provisioned, Running) => true,
            (Running, Completed) => true,
            (Created | Provisioned | Running, Failed) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Bookkeeping for one run, owned by the sandbox for its duration
#[derive(Debug)]
pub struct SandboxRun {
    pub run_id: Uuid,
    pub assignment_id: i64,
    pub submitter_id: i64,
    state: RunState,
    container_id: Option<String>,
}

impl SandboxRun {
    pub fn new(job: &SandboxJob) -> Self {
        Self {
            run_id: job.run_id,
            assignment_id: job.assignment_id,
            submitter_id: job.submitter_id,
            state: RunState::Created,
            container_id: None,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn container_id(&self) -> Option<&str> {
        self.container_id.as_deref()
    }

    pub fn attach_container(&mut self, container_id: &str) {
        self.container_id = Some(container_id.to_string());
    }

    /// Move to `next`; an illegal transition is logged and ignored
    pub fn transition(&mut self, next: RunState) {
        if !self.state.can_transition_to(next) {
            tracing::warn!(
                run_id = %self.run_id,
                from = %self.state,
                to = %next,
                "Ignoring illegal sandbox state transition"
            );
            return;
        }

        tracing::debug!(
            run_id = %self.run_id,
            assignment_id = self.assignment_id,
            submitter_id = self.submitter_id,
            container = self.container_id.as_deref().unwrap_or("-"),
            from = %self.state,
            to = %next,
            "Sandbox state transition"
        );
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn job() -> SandboxJob {
        SandboxJob {
            run_id: Uuid::new_v4(),
            assignment_id: 1,
            submitter_id: 2,
            submission: PathBuf::from("HW/HW_1_2.py"),
            test_suite: PathBuf::from("TESTS/test_HW_1.py"),
            report_file: "report.json".to_string(),
            test_command: "pytest".to_string(),
            collect_report: true,
        }
    }

    #[test]
    fn test_happy_path() {
        let mut run = SandboxRun::new(&job());
        assert_eq!(run.state(), RunState::Created);
        for next in [
            RunState::Provisioned,
            RunState::Running,
            RunState::Completed,
            RunState::Destroyed,
        ] {
            run.transition(next);
            assert_eq!(run.state(), next);
        }
    }

    #[test]
    fn test_destroyed_reachable_from_everywhere() {
        for state in [
            RunState::Created,
            RunState::Provisioned,
            RunState::Running,
            RunState::Completed,
            RunState::Failed,
        ] {
            assert!(state.can_transition_to(RunState::Destroyed), "{state}");
        }
        assert!(!RunState::Destroyed.can_transition_to(RunState::Destroyed));
    }

    #[test]
    fn test_illegal_transition_is_ignored() {
        let mut run = SandboxRun::new(&job());
        run.transition(RunState::Completed);
        assert_eq!(run.state(), RunState::Created);

        run.transition(RunState::Destroyed);
        run.transition(RunState::Running);
        assert_eq!(run.state(), RunState::Destroyed);
    }

    #[test]
    fn test_failed_cannot_complete() {
        assert!(!RunState::Failed.can_transition_to(RunState::Completed));
        assert!(RunState::Provisioned.can_transition_to(RunState::Failed));
    }
}
