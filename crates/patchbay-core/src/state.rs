//! Service state machine types
//!
//! The transition table is data, not behavior: the runtime crate drives the
//! actual hooks and timeouts. Actions move a service from a listed source
//! state through a `during` state into a `target` state, or into `rejected`
//! when the hook fails or times out.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Default timeout applied to every transition unless configured otherwise
pub const DEFAULT_TRANSITION_TIMEOUT: Duration = Duration::from_secs(20);

/// Lifecycle state of a service
///
/// `Stopped`, `Running` and `Failed` are resting states; the others mark an
/// in-flight transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    /// Initial state, also reached after a successful stop
    Stopped,
    /// A start transition is in flight
    Starting,
    /// The service is operational
    Running,
    /// A stop transition is in flight
    Stopping,
    /// A restart from `Running` is in flight
    Restarting,
    /// A transition was rejected; only `stop` leads out of here
    Failed,
}

impl ServiceState {
    /// True for states that are not part of an in-flight transition
    pub fn is_resting(self) -> bool {
        matches!(self, Self::Stopped | Self::Running | Self::Failed)
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Restarting => "restarting",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// The three lifecycle actions a service understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionAction {
    /// Bring the service to `Running`
    Start,
    /// Bring the service to `Stopped`
    Stop,
    /// Stop and start again, staying `Running` when already running
    Restart,
}

impl fmt::Display for TransitionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
        };
        f.write_str(name)
    }
}

/// One row of the transition table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// The action this row belongs to
    pub action: TransitionAction,
    /// State while the hook runs
    pub during: ServiceState,
    /// State after the hook settled successfully
    pub target: ServiceState,
    /// State after the hook failed or timed out
    pub rejected: ServiceState,
}

/// Look up the transition for an action attempted from a given state
///
/// Returns `None` when the action is not defined for the source state; the
/// caller turns that into a wrong-state usage error.
pub fn transition_for(action: TransitionAction, from: ServiceState) -> Option<Transition> {
    use ServiceState as S;
    use TransitionAction as A;

    let (during, target) = match (action, from) {
        (A::Start | A::Restart, S::Stopped) => (S::Starting, S::Running),
        (A::Restart, S::Running) => (S::Restarting, S::Running),
        (A::Stop, S::Running | S::Starting | S::Failed) => (S::Stopping, S::Stopped),
        _ => return None,
    };

    Some(Transition {
        action,
        during,
        target,
        rejected: S::Failed,
    })
}
