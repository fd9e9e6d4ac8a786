//! Lock planner tests

use lockagent::capability::alert::AlertKind;
use lockagent::engine::fsm::{plan, Effect};
use lockagent::models::lock::{CommandKind, LockState};

/// Fold a command sequence through the planner, assuming every lockdown
/// effect succeeds
fn run(commands: &[(CommandKind, &str)]) -> (LockState, bool, Vec<Effect>) {
    let mut state = LockState::default();
    let mut lockdown_active = false;
    let mut effects = Vec::new();

    for (command, message) in commands {
        let planned = plan(&state, lockdown_active, command, message);
        for effect in &planned.effects {
            match effect {
                Effect::ApplyLockdown => lockdown_active = true,
                Effect::ReleaseLockdown => lockdown_active = false,
                _ => {}
            }
        }
        state = planned.next;
        effects.extend(planned.effects);
    }
    (state, lockdown_active, effects)
}

fn lockdown_effects(effects: &[Effect]) -> usize {
    effects
        .iter()
        .filter(|e| matches!(e, Effect::ApplyLockdown | Effect::ReleaseLockdown))
        .count()
}

#[test]
fn test_initial_state_is_unlocked() {
    let state = LockState::default();
    assert!(!state.locked);
    assert!(state.lock_message.is_empty());
    assert_eq!(state.last_command, None);
    assert_eq!(state.last_sync_at_millis, 0);
}

#[test]
fn test_lock_reminder_unlock_flow() {
    let (state, lockdown_active, effects) = run(&[
        (CommandKind::Lock, "Pay EMI"),
        (CommandKind::Reminder, ""),
        (CommandKind::Unlock, ""),
    ]);

    assert!(!state.locked);
    assert!(state.lock_message.is_empty());
    assert!(!lockdown_active);
    assert_eq!(lockdown_effects(&effects), 2);
}

#[test]
fn test_repeated_lock_refreshes_message_only() {
    let (state, lockdown_active, effects) = run(&[
        (CommandKind::Lock, "Pay EMI"),
        (CommandKind::Lock, "Final notice"),
    ]);

    assert!(state.locked);
    assert_eq!(state.lock_message, "Final notice");
    assert!(lockdown_active);
    assert_eq!(lockdown_effects(&effects), 1);
}

#[test]
fn test_find_while_locked_keeps_lockdown() {
    let (state, lockdown_active, effects) = run(&[
        (CommandKind::Lock, "Pay EMI"),
        (CommandKind::Find, ""),
    ]);

    assert!(state.locked);
    assert!(lockdown_active);
    assert_eq!(effects.last(), Some(&Effect::Ring));
}

#[test]
fn test_expired_after_lock() {
    let (state, lockdown_active, effects) = run(&[
        (CommandKind::Lock, "Pay EMI"),
        (CommandKind::Expired, ""),
    ]);

    assert!(!state.locked);
    assert!(!lockdown_active);
    assert!(matches!(
        effects.last(),
        Some(Effect::Alert(alert)) if alert.kind == AlertKind::Expired
    ));
}

#[test]
fn test_expired_while_unlocked_only_alerts() {
    let (state, _, effects) = run(&[(CommandKind::Expired, "")]);

    assert!(!state.locked);
    assert_eq!(lockdown_effects(&effects), 0);
    assert_eq!(effects.len(), 1);
}

#[test]
fn test_none_and_unrecognized_change_nothing() {
    let (state, lockdown_active, effects) = run(&[
        (CommandKind::None, ""),
        (CommandKind::parse("self_destruct"), ""),
    ]);

    assert_eq!(state, LockState::default());
    assert!(!lockdown_active);
    assert!(effects.is_empty());
}

#[test]
fn test_reset_keeps_lock_until_wipe() {
    let (state, lockdown_active, effects) = run(&[
        (CommandKind::Lock, "Pay EMI"),
        (CommandKind::Reset, ""),
    ]);

    assert!(state.locked);
    assert!(lockdown_active);
    assert_eq!(effects.last(), Some(&Effect::ScheduleReset));
}
