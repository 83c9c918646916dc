//! Lifecycle coordination for engine components.
//!
//! A plain finite-state machine driven by the health of declared
//! dependencies: no reflective component registry, just explicit
//! registration and reports. Observers subscribe through a tokio watch
//! channel.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::watch;

// ---------------------------------------------------------------------------
// States
// ---------------------------------------------------------------------------

/// Aggregate state of a coordinated component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Registered dependencies have not all reported up yet.
    Starting,
    /// Every dependency is up.
    Up,
    /// A previously-up dependency went down, or the component was shut down.
    Down,
    /// A dependency reported an unrecoverable error.
    Error,
}

/// Health of one declared dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyHealth {
    Up,
    Down,
    Error,
}

// ---------------------------------------------------------------------------
// LifecycleCoordinator
// ---------------------------------------------------------------------------

struct Inner {
    dependencies: HashMap<String, Option<DependencyHealth>>,
    was_up: bool,
    shut_down: bool,
}

/// Tracks named dependency health and recomputes the aggregate state on
/// every report.
pub struct LifecycleCoordinator {
    name: String,
    inner: Mutex<Inner>,
    state_tx: watch::Sender<LifecycleState>,
}

impl LifecycleCoordinator {
    pub fn new(name: impl Into<String>) -> Self {
        let (state_tx, _) = watch::channel(LifecycleState::Starting);
        Self {
            name: name.into(),
            inner: Mutex::new(Inner {
                dependencies: HashMap::new(),
                was_up: false,
                shut_down: false,
            }),
            state_tx,
        }
    }

    /// Declare a dependency this component's health follows. Dependencies
    /// start unreported, holding the component in `Starting`.
    pub fn register_dependency(&self, dependency: impl Into<String>) {
        let mut inner = self.inner.lock().expect("lifecycle lock poisoned");
        inner.dependencies.entry(dependency.into()).or_insert(None);
        let state = Self::compute(&inner);
        drop(inner);
        self.transition(state);
    }

    /// Report the health of one dependency.
    pub fn report(&self, dependency: &str, health: DependencyHealth) {
        let mut inner = self.inner.lock().expect("lifecycle lock poisoned");
        match inner.dependencies.get_mut(dependency) {
            Some(slot) => *slot = Some(health),
            None => {
                tracing::warn!(
                    component = self.name.as_str(),
                    dependency,
                    "health report for unregistered dependency ignored"
                );
                return;
            }
        }
        let mut state = Self::compute(&inner);
        if state == LifecycleState::Up {
            inner.was_up = true;
        }
        if inner.shut_down {
            state = LifecycleState::Down;
        }
        drop(inner);
        self.transition(state);
    }

    /// Permanently take the component down.
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock().expect("lifecycle lock poisoned");
        inner.shut_down = true;
        drop(inner);
        self.transition(LifecycleState::Down);
    }

    /// Current aggregate state.
    pub fn state(&self) -> LifecycleState {
        *self.state_tx.borrow()
    }

    /// Subscribe to state transitions.
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state_tx.subscribe()
    }

    fn compute(inner: &Inner) -> LifecycleState {
        if inner.shut_down {
            return LifecycleState::Down;
        }
        let mut all_up = true;
        for health in inner.dependencies.values() {
            match health {
                Some(DependencyHealth::Error) => return LifecycleState::Error,
                Some(DependencyHealth::Down) => {
                    return if inner.was_up {
                        LifecycleState::Down
                    } else {
                        LifecycleState::Starting
                    };
                }
                Some(DependencyHealth::Up) => {}
                None => all_up = false,
            }
        }
        if all_up {
            LifecycleState::Up
        } else {
            LifecycleState::Starting
        }
    }

    fn transition(&self, state: LifecycleState) {
        let changed = self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
        if changed {
            tracing::info!(
                component = self.name.as_str(),
                state = ?state,
                "lifecycle transition"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_in_starting_and_comes_up() {
        let coordinator = LifecycleCoordinator::new("flow-engine");
        coordinator.register_dependency("checkpoint-store");
        coordinator.register_dependency("scheduler");
        assert_eq!(coordinator.state(), LifecycleState::Starting);

        coordinator.report("checkpoint-store", DependencyHealth::Up);
        assert_eq!(coordinator.state(), LifecycleState::Starting);

        coordinator.report("scheduler", DependencyHealth::Up);
        assert_eq!(coordinator.state(), LifecycleState::Up);
    }

    #[test]
    fn dependency_down_after_up_takes_component_down() {
        let coordinator = LifecycleCoordinator::new("flow-engine");
        coordinator.register_dependency("checkpoint-store");
        coordinator.report("checkpoint-store", DependencyHealth::Up);
        assert_eq!(coordinator.state(), LifecycleState::Up);

        coordinator.report("checkpoint-store", DependencyHealth::Down);
        assert_eq!(coordinator.state(), LifecycleState::Down);

        coordinator.report("checkpoint-store", DependencyHealth::Up);
        assert_eq!(coordinator.state(), LifecycleState::Up);
    }

    #[test]
    fn error_dominates() {
        let coordinator = LifecycleCoordinator::new("flow-engine");
        coordinator.register_dependency("checkpoint-store");
        coordinator.register_dependency("scheduler");
        coordinator.report("checkpoint-store", DependencyHealth::Up);
        coordinator.report("scheduler", DependencyHealth::Error);
        assert_eq!(coordinator.state(), LifecycleState::Error);
    }

    #[test]
    fn shutdown_is_permanent() {
        let coordinator = LifecycleCoordinator::new("flow-engine");
        coordinator.register_dependency("checkpoint-store");
        coordinator.report("checkpoint-store", DependencyHealth::Up);
        coordinator.shutdown();
        assert_eq!(coordinator.state(), LifecycleState::Down);

        coordinator.report("checkpoint-store", DependencyHealth::Up);
        assert_eq!(coordinator.state(), LifecycleState::Down);
    }

    #[tokio::test]
    async fn subscribers_observe_transitions() {
        let coordinator = LifecycleCoordinator::new("flow-engine");
        coordinator.register_dependency("checkpoint-store");
        let mut rx = coordinator.subscribe();

        coordinator.report("checkpoint-store", DependencyHealth::Up);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), LifecycleState::Up);
    }

    #[test]
    fn unregistered_dependency_report_is_ignored() {
        let coordinator = LifecycleCoordinator::new("flow-engine");
        coordinator.register_dependency("checkpoint-store");
        coordinator.report("unknown", DependencyHealth::Error);
        assert_eq!(coordinator.state(), LifecycleState::Starting);
    }
}
