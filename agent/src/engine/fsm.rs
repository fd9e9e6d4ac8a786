//! Lock state machine
//!
//! A pure planner: given the current lock state and a command it returns the
//! next state and the effects to run. Nothing here touches the store, the
//! clock or the OS, so every transition is testable on its own.

use crate::capability::alert::{Alert, AlertKind};
use crate::models::lock::{CommandKind, LockState};

/// Side effect requested by a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    ApplyLockdown,
    ReleaseLockdown,
    Alert(Alert),
    Ring,
    ScheduleReset,
}

/// Result of planning one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub next: LockState,
    pub effects: Vec<Effect>,
}

impl Plan {
    fn unchanged(state: &LockState) -> Self {
        Self {
            next: state.clone(),
            effects: Vec::new(),
        }
    }

    pub fn is_noop(&self) -> bool {
        self.effects.is_empty()
    }

    pub fn touches_lockdown(&self) -> bool {
        self.effects
            .iter()
            .any(|e| matches!(e, Effect::ApplyLockdown | Effect::ReleaseLockdown))
    }
}

/// Plan the transition for `command`.
///
/// `lockdown_active` is the persisted belief that the OS-level lockdown is in
/// place; it lets a retried `Lock` re-apply a lockdown that previously failed
/// and lets `Unlock` release a lockdown left behind by a partial release.
pub fn plan(state: &LockState, lockdown_active: bool, command: &CommandKind, message: &str) -> Plan {
    match command {
        CommandKind::Lock => {
            let mut next = state.clone();
            next.locked = true;
            next.lock_message = message.to_string();

            let mut effects = Vec::new();
            if !(state.locked && lockdown_active) {
                effects.push(Effect::ApplyLockdown);
            }
            effects.push(Effect::Alert(Alert::new(AlertKind::Locked, message)));
            Plan { next, effects }
        }
        CommandKind::Unlock => {
            if !state.locked && !lockdown_active {
                return Plan::unchanged(state);
            }
            let mut next = state.clone();
            next.locked = false;
            next.lock_message.clear();
            Plan {
                next,
                effects: vec![
                    Effect::ReleaseLockdown,
                    Effect::Alert(Alert::new(AlertKind::Unlocked, message)),
                ],
            }
        }
        CommandKind::Reminder => Plan {
            next: state.clone(),
            effects: vec![Effect::Alert(Alert::new(AlertKind::Reminder, message))],
        },
        CommandKind::Find => Plan {
            next: state.clone(),
            effects: vec![Effect::Ring],
        },
        CommandKind::Expired => {
            let mut next = state.clone();
            next.locked = false;
            next.lock_message.clear();

            let mut effects = Vec::new();
            if lockdown_active {
                effects.push(Effect::ReleaseLockdown);
            }
            effects.push(Effect::Alert(Alert::new(AlertKind::Expired, message)));
            Plan { next, effects }
        }
        CommandKind::Reset => Plan {
            next: state.clone(),
            effects: vec![
                Effect::Alert(Alert::new(AlertKind::ResetWarning, message)),
                Effect::ScheduleReset,
            ],
        },
        CommandKind::None | CommandKind::Unrecognized(_) => Plan::unchanged(state),
    }
}
