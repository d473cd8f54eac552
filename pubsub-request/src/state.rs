//! The request lifecycle state machine.

use std::fmt;

/// Lifecycle state of a [`Request`](crate::Request).
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum TaskState {
    Initialized,
    Resumed,
    Cancelled,
    Finished,
}

impl TaskState {
    /// Whether moving from `self` to `target` is allowed.
    ///
    /// Rules are evaluated in order: anything leaves `Initialized`; nothing
    /// enters `Initialized` and nothing leaves `Cancelled` or `Finished`;
    /// `Resumed` may be cancelled but not resumed again; anything else may
    /// finish.
    pub fn can_transition(self, target: TaskState) -> bool {
        use TaskState::*;

        match (self, target) {
            (Initialized, _) => true,
            (_, Initialized) | (Cancelled, _) | (Finished, _) => false,
            (Resumed, Cancelled) => true,
            (Resumed, Resumed) => false,
            (_, Finished) => true,
        }
    }

    /// True for `Cancelled` and `Finished`.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Cancelled | TaskState::Finished)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskState::Initialized => "Initialized",
            TaskState::Resumed => "Resumed",
            TaskState::Cancelled => "Cancelled",
            TaskState::Finished => "Finished",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::TaskState::*;
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Initialized, Initialized, true)]
    #[case(Initialized, Resumed, true)]
    #[case(Initialized, Cancelled, true)]
    #[case(Initialized, Finished, true)]
    #[case(Resumed, Initialized, false)]
    #[case(Resumed, Resumed, false)]
    #[case(Resumed, Cancelled, true)]
    #[case(Resumed, Finished, true)]
    #[case(Cancelled, Initialized, false)]
    #[case(Cancelled, Resumed, false)]
    #[case(Cancelled, Cancelled, false)]
    #[case(Cancelled, Finished, false)]
    #[case(Finished, Initialized, false)]
    #[case(Finished, Resumed, false)]
    #[case(Finished, Cancelled, false)]
    #[case(Finished, Finished, false)]
    fn test_can_transition(#[case] from: TaskState, #[case] to: TaskState, #[case] allowed: bool) {
        assert_eq!(from.can_transition(to), allowed, "{from} -> {to}");
    }

    #[test]
    fn test_terminal_states() {
        assert!(Cancelled.is_terminal());
        assert!(Finished.is_terminal());
        assert!(!Resumed.is_terminal());
    }
}
