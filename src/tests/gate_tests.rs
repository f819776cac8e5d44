// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use crate::event::Envelope;
use crate::gate::{ActionGate, GateOutcome};
use crate::types::action::Action;

fn persist_type(kind: &'static str, synchronous: bool) -> ActionGate {
    ActionGate::new(Box::new(move |a: &Action| a.action_type() == kind), synchronous)
}

fn act(kind: &str, n: u64) -> Action {
    Action::new(kind).with_field("n", n)
}

fn labels(seen: &[Action]) -> Vec<String> {
    seen.iter()
        .map(|a| format!("{}{}", a.action_type(), a.get("n").and_then(|v| v.as_u64()).unwrap()))
        .collect()
}

#[test]
fn test_default_gate_forwards_everything() {
    let mut gate = ActionGate::pass_through();
    let mut seen = Vec::new();
    let mut next = |a: Action| seen.push(a);

    assert_eq!(gate.handle(Envelope::Command(act("A", 1)), &mut next), GateOutcome::Forwarded);
    assert_eq!(gate.handle(Envelope::Command(act("B", 2)), &mut next), GateOutcome::Forwarded);
    assert!(gate.is_idle());
    assert_eq!(labels(&seen), vec!["A1", "B2"]);
}

#[test]
fn test_persisted_action_invisible_until_confirmed() {
    let mut gate = persist_type("X", false);
    let mut seen = Vec::new();

    let outcome = gate.handle(Envelope::Command(act("X", 1)), &mut |a: Action| seen.push(a));
    assert_eq!(
        outcome,
        GateOutcome::Persist { action: act("X", 1), forwarded: false }
    );
    assert!(seen.is_empty());
    assert_eq!(gate.pending(), 1);

    gate.handle(Envelope::confirmed(act("X", 1)), &mut |a: Action| seen.push(a));
    assert_eq!(labels(&seen), vec!["X1"]);
    assert!(gate.is_idle());
}

#[test]
fn test_unpersisted_action_deferred_behind_outstanding_write() {
    let mut gate = persist_type("X", false);
    let mut seen = Vec::new();

    gate.handle(Envelope::Command(act("X", 1)), &mut |a: Action| seen.push(a));
    let outcome = gate.handle(Envelope::Command(act("Y", 2)), &mut |a: Action| seen.push(a));
    assert_eq!(outcome, GateOutcome::Deferred);
    assert_eq!(gate.deferred(), 1);
    assert!(seen.is_empty());

    let outcome = gate.handle(Envelope::confirmed(act("X", 1)), &mut |a: Action| seen.push(a));
    assert_eq!(outcome, GateOutcome::Confirmed { flushed: 1 });
    assert_eq!(labels(&seen), vec!["X1", "Y2"]);
    assert!(gate.is_idle());
}

#[test]
fn test_queue_flushes_on_last_of_many_confirmations() {
    const N: u64 = 4;
    let mut gate = persist_type("X", false);
    let mut seen = Vec::new();

    // Interleave: X1 Y1 X2 Y2 ... all before any confirmation.
    for i in 1..=N {
        gate.handle(Envelope::Command(act("X", i)), &mut |a: Action| seen.push(a));
        gate.handle(Envelope::Command(act("Y", i)), &mut |a: Action| seen.push(a));
    }
    assert_eq!(gate.pending(), N as usize);
    assert_eq!(gate.deferred(), N as usize);
    assert!(seen.is_empty());

    for i in 1..N {
        let outcome = gate.handle(Envelope::confirmed(act("X", i)), &mut |a: Action| seen.push(a));
        assert_eq!(outcome, GateOutcome::Confirmed { flushed: 0 });
    }
    assert_eq!(gate.deferred(), N as usize);

    let outcome = gate.handle(Envelope::confirmed(act("X", N)), &mut |a: Action| seen.push(a));
    assert_eq!(outcome, GateOutcome::Confirmed { flushed: N as usize });
    assert_eq!(
        labels(&seen),
        vec!["X1", "X2", "X3", "X4", "Y1", "Y2", "Y3", "Y4"]
    );
    assert!(gate.is_idle());
}

#[test]
fn test_deferred_actions_arriving_late_wait_for_next_confirmation() {
    let mut gate = persist_type("X", false);
    let mut seen = Vec::new();

    gate.handle(Envelope::Command(act("X", 1)), &mut |a: Action| seen.push(a));
    gate.handle(Envelope::Command(act("X", 2)), &mut |a: Action| seen.push(a));
    gate.handle(Envelope::confirmed(act("X", 1)), &mut |a: Action| seen.push(a));
    assert_eq!(gate.pending(), 1);

    gate.handle(Envelope::Command(act("Y", 3)), &mut |a: Action| seen.push(a));
    assert_eq!(labels(&seen), vec!["X1"]);

    gate.handle(Envelope::confirmed(act("X", 2)), &mut |a: Action| seen.push(a));
    assert_eq!(labels(&seen), vec!["X1", "X2", "Y3"]);
}

#[test]
fn test_synchronous_mode_forwards_immediately() {
    let mut gate = persist_type("Z", true);
    let mut seen = Vec::new();

    let outcome = gate.handle(Envelope::Command(act("Z", 1)), &mut |a: Action| seen.push(a));
    assert_eq!(
        outcome,
        GateOutcome::Persist { action: act("Z", 1), forwarded: true }
    );
    assert_eq!(labels(&seen), vec!["Z1"]);
    assert_eq!(gate.pending(), 0);

    // Nothing is held back afterwards.
    assert_eq!(
        gate.handle(Envelope::Command(act("Y", 2)), &mut |a: Action| seen.push(a)),
        GateOutcome::Forwarded
    );
}

#[test]
fn test_replayed_confirmations_do_not_decrement() {
    let mut gate = persist_type("X", false);
    let mut seen = Vec::new();

    gate.handle(Envelope::Command(act("X", 1)), &mut |a: Action| seen.push(a));
    gate.handle(Envelope::replayed(act("X", 0)), &mut |a: Action| seen.push(a));
    assert_eq!(gate.pending(), 1);
}

#[test]
fn test_foreign_confirmation_saturates_at_zero() {
    let mut gate = persist_type("X", false);
    let mut seen = Vec::new();
    gate.handle(Envelope::confirmed(act("X", 9)), &mut |a: Action| seen.push(a));
    assert_eq!(gate.pending(), 0);
    assert_eq!(labels(&seen), vec!["X9"]);
}

#[test]
fn test_confirmation_from_another_writer_releases_deferred() {
    let mut gate = persist_type("X", false);
    let mut seen = Vec::new();

    gate.handle(Envelope::Command(act("X", 1)), &mut |a: Action| seen.push(a));
    gate.handle(Envelope::Command(act("Y", 2)), &mut |a: Action| seen.push(a));

    // Single-writer assumption: any confirmation counts as ours.
    gate.handle(Envelope::confirmed(act("X", 9)), &mut |a: Action| seen.push(a));
    assert_eq!(labels(&seen), vec!["X9", "Y2"]);
    assert_eq!(gate.pending(), 0);

    gate.handle(Envelope::confirmed(act("X", 1)), &mut |a: Action| seen.push(a));
    assert_eq!(labels(&seen), vec!["X9", "Y2", "X1"]);
    assert_eq!(gate.pending(), 0);
}

#[test]
fn test_release_flushes_at_zero() {
    let mut gate = persist_type("X", false);
    let mut seen = Vec::new();

    gate.acquire();
    gate.handle(Envelope::Command(act("X", 1)), &mut |a: Action| seen.push(a));
    gate.handle(Envelope::Command(act("Y", 2)), &mut |a: Action| seen.push(a));
    assert_eq!(gate.pending(), 2);

    // The write failed: one release, still one outstanding.
    assert_eq!(gate.release(&mut |a: Action| seen.push(a)), 0);
    assert!(seen.is_empty());

    // Squash finished.
    assert_eq!(gate.release(&mut |a: Action| seen.push(a)), 1);
    assert_eq!(labels(&seen), vec!["Y2"]);
    assert!(gate.is_idle());

    // Extra releases are harmless.
    assert_eq!(gate.release(&mut |a: Action| seen.push(a)), 0);
    assert_eq!(gate.pending(), 0);
}
