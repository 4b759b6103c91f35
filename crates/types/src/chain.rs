//! Chain metadata and lifecycle primitives.

use std::path::PathBuf;

/// Immutable description of a single simulated chain.
///
/// Built once at orchestrator construction and never mutated for the
/// remainder of the run. The indexer and relayer reference descriptors, they
/// never own them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainDescriptor {
    /// Chain ID, globally unique within a run.
    pub chain_id: u64,
    /// Human readable chain name.
    pub name: String,
    /// The RPC endpoint the chain is reachable at. For L2 chains this is the
    /// fronting proxy endpoint, not the raw node.
    pub rpc_url: String,
    /// Path to the chain's log file.
    pub log_path: PathBuf,
    /// The port the endpoint is bound to. Used for stable ordering of
    /// human-readable output.
    pub port: u16,
}

/// Lifecycle state of a chain process or RPC proxy.
///
/// Transitions are driven exclusively by the owning orchestrator's start and
/// stop calls. [`ChainLifecycleState::Failed`] is sticky: a failed component
/// never retries on its own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChainLifecycleState {
    /// The component has not been started yet.
    #[default]
    NotStarted,
    /// A start call is in flight.
    Starting,
    /// The component is up.
    Running,
    /// A stop call is in flight.
    Stopping,
    /// The component was stopped cleanly.
    Stopped,
    /// The component failed during startup or while running. Terminal.
    Failed,
}

impl ChainLifecycleState {
    /// Whether a start call is admissible from this state.
    pub const fn can_start(&self) -> bool {
        matches!(self, Self::NotStarted)
    }

    /// Whether this state is terminal.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Failed)
    }

    /// Whether the transition to `next` is one the lifecycle permits.
    pub const fn can_transition(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::NotStarted, Self::Starting) |
                (Self::Starting, Self::Running) |
                (Self::Starting, Self::Failed) |
                (Self::Running, Self::Stopping) |
                (Self::Running, Self::Failed) |
                (Self::Stopping, Self::Stopped)
        )
    }
}

impl std::fmt::Display for ChainLifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotStarted => "not started",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_permits_forward_transitions() {
        use ChainLifecycleState::*;
        assert!(NotStarted.can_transition(Starting));
        assert!(Starting.can_transition(Running));
        assert!(Running.can_transition(Stopping));
        assert!(Stopping.can_transition(Stopped));
    }

    #[test]
    fn failed_is_terminal_and_sticky() {
        use ChainLifecycleState::*;
        assert!(Failed.is_terminal());
        assert!(!Failed.can_transition(Starting));
        assert!(!Failed.can_transition(Running));
        assert!(!Stopped.can_transition(Starting));
    }

    #[test]
    fn failure_reachable_from_starting_and_running_only() {
        use ChainLifecycleState::*;
        assert!(Starting.can_transition(Failed));
        assert!(Running.can_transition(Failed));
        assert!(!NotStarted.can_transition(Failed));
        assert!(!Stopping.can_transition(Failed));
    }
}
