use std::fmt;

/// Lifecycle states of a harvest run
///
/// A run moves `Starting -> Running` and ends in exactly one of the terminal
/// states. `Starting` may also end directly in `FatalError` when the first
/// session cannot be acquired, or in `Interrupted` when cancelled meanwhile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunState {
    /// Acquiring sessions and loading the resume checkpoint
    Starting,

    /// Processing work items
    Running,

    // ===== Terminal States =====
    /// Every item from the resume point was consumed
    Completed,

    /// A cancellation signal stopped the run between items
    Interrupted,

    /// A session or ledger failure made further progress impossible
    FatalError,
}

impl RunState {
    /// Returns true if the run has ended
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Interrupted | Self::FatalError)
    }

    /// Returns true if `next` is a legal successor of this state
    pub fn can_transition_to(&self, next: RunState) -> bool {
        match self {
            Self::Starting => matches!(next, Self::Running | Self::Interrupted | Self::FatalError),
            Self::Running => next.is_terminal(),
            _ => false,
        }
    }

    /// Process exit code for a terminal state
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Completed => 0,
            Self::Interrupted => 130,
            Self::FatalError => 2,
            Self::Starting | Self::Running => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::FatalError => "fatal_error",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
