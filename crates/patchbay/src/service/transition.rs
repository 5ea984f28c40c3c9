//! Transition driver
//!
//! Owns the rules around the state table: waiting for an in-flight
//! transition to settle, enforcing per-action timeouts, and routing hook
//! failures through the rejection path. A timed-out hook future is dropped,
//! so a hanging `on_start` cannot leak past its deadline.

use super::Service;
use patchbay_core::state::transition_for;
use patchbay_core::{Error, Result, ServiceState, Transition, TransitionAction};
use std::pin::pin;

/// Drive one lifecycle action on a service
pub(crate) async fn run<S: Service + ?Sized>(
    service: &S,
    action: TransitionAction,
) -> Result<()> {
    let mut waited = false;
    loop {
        // Register for settle notifications before reading the state, so a
        // transition completing in between cannot be missed.
        let mut notified = pin!(service.base().transition_settled().notified());
        notified.as_mut().enable();

        let state = service.base().state();
        if let Some(transition) = transition_for(action, state) {
            return execute(service, transition).await;
        }

        if !state.is_resting() {
            notified.await;
            waited = true;
            continue;
        }

        // An action requested while its own transition was in flight has
        // already been satisfied once the state settled on its target.
        if waited && state == settled_state(action) {
            return Ok(());
        }

        return Err(Error::InvalidState {
            action: action.to_string(),
            service: service.describe(),
        });
    }
}

fn settled_state(action: TransitionAction) -> ServiceState {
    match action {
        TransitionAction::Start | TransitionAction::Restart => ServiceState::Running,
        TransitionAction::Stop => ServiceState::Stopped,
    }
}

async fn execute<S: Service + ?Sized>(service: &S, transition: Transition) -> Result<()> {
    let base = service.base();
    let from = base.set_state(transition.during);
    service.state_changed(from, transition.during).await;

    let timeout = base.timeout_for(transition.action);
    let hook = async {
        match transition.action {
            TransitionAction::Start => service.on_start().await,
            TransitionAction::Stop => service.on_stop().await,
            TransitionAction::Restart => service.on_restart().await,
        }
    };

    match tokio::time::timeout(timeout, hook).await {
        Ok(Ok(())) => {
            // A transition preempted while its hook ran (stop during start)
            // leaves the committing to the preempting transition.
            if base.state() == transition.during {
                base.set_state(transition.target);
                service.state_changed(transition.during, transition.target).await;
            }
            base.notify_settled();
            Ok(())
        }
        Ok(Err(error)) => reject(service, transition, error.to_string()).await,
        Err(_) => {
            reject(
                service,
                transition,
                format!("timeout after {}", humantime::format_duration(timeout)),
            )
            .await
        }
    }
}

async fn reject<S: Service + ?Sized>(
    service: &S,
    transition: Transition,
    reason: String,
) -> Result<()> {
    let error = service.state_transition_rejection(&transition, &reason).await;
    let base = service.base();
    base.set_state(transition.rejected);
    service.state_changed(transition.during, transition.rejected).await;
    base.notify_settled();
    Err(error)
}
