mod common;

use common::*;
use keyflow_core::keyboard::Key;
use keyflow_core::{EnginePhase, KeyflowError, Profile, ProfileId, StatusEvent};

fn email_profile() -> Profile {
    Profile::new("main").with_trigger("-em", "email@example.com")
}

#[test]
fn typing_a_trigger_in_a_sentence_expands_once() {
    let mut rig = rig();
    rig.controller.start(email_profile()).unwrap();
    assert_eq!(rig.controller.state(), EnginePhase::Running);

    rig.keyboard.type_text("x -em y");

    assert_eq!(
        rig.settle(),
        vec![StatusEvent::ExpansionFired("-em".to_string())]
    );
    assert_eq!(
        rig.injections.all(),
        vec![(3, "email@example.com".to_string())]
    );
}

#[test]
fn backspace_correction_still_expands() {
    let mut rig = rig();
    rig.controller
        .start(Profile::new("main").with_trigger("-email1", "me@example.com"))
        .unwrap();

    rig.keyboard.type_text("ab");
    rig.keyboard.press(Key::Backspace);
    rig.keyboard.type_text("-email1");

    assert_eq!(
        rig.settle(),
        vec![StatusEvent::ExpansionFired("-email1".to_string())]
    );
    assert_eq!(rig.injections.all().len(), 1);
}

#[test]
fn pause_mid_candidate_then_resume_fires_nothing() {
    let mut rig = rig();
    rig.controller.start(email_profile()).unwrap();

    rig.keyboard.type_text("-e");
    rig.controller.pause().unwrap();
    assert_eq!(rig.status.recv_timeout(WAIT).unwrap(), StatusEvent::Paused);
    assert_eq!(rig.controller.state(), EnginePhase::Paused);

    rig.controller.resume().unwrap();
    assert_eq!(rig.status.recv_timeout(WAIT).unwrap(), StatusEvent::Resumed);
    rig.keyboard.type_text("m");

    assert!(rig.settle().is_empty());
    assert!(rig.injections.all().is_empty());
}

#[test]
fn keystrokes_while_paused_pass_through() {
    let mut rig = rig();
    rig.controller.start(email_profile()).unwrap();
    rig.controller.pause().unwrap();
    rig.keyboard.type_text("-em");
    rig.controller.resume().unwrap();

    assert_eq!(rig.status.recv_timeout(WAIT).unwrap(), StatusEvent::Paused);
    assert_eq!(rig.status.recv_timeout(WAIT).unwrap(), StatusEvent::Resumed);
    assert!(rig.settle().is_empty());
    assert!(rig.injections.all().is_empty());
}

#[test]
fn switching_profile_discards_candidate() {
    let mut rig = rig();
    rig.controller.start(email_profile()).unwrap();

    rig.keyboard.type_text("-e");
    rig.controller
        .switch_profile(&Profile::new("work").with_trigger("-sig", "Regards"))
        .unwrap();
    rig.keyboard.type_text("m -em -sig");

    assert_eq!(
        rig.settle(),
        vec![
            StatusEvent::ProfileSwitched(ProfileId::from("work")),
            StatusEvent::ExpansionFired("-sig".to_string()),
        ]
    );
    assert_eq!(rig.injections.all(), vec![(4, "Regards".to_string())]);
}

#[test]
fn ambiguous_profile_keeps_previous_index() {
    let mut rig = rig();
    rig.controller.start(email_profile()).unwrap();

    let ambiguous = Profile::new("bad")
        .with_trigger("-e", "short")
        .with_trigger("-em", "long");
    let err = rig.controller.switch_profile(&ambiguous).unwrap_err();
    assert!(matches!(err, KeyflowError::AmbiguousTriggers { ref prefix, .. } if prefix == "-e"));

    rig.keyboard.type_text("-em");
    assert_eq!(
        rig.settle(),
        vec![StatusEvent::ExpansionFired("-em".to_string())]
    );
}

#[test]
fn injection_failure_is_reported_and_matching_continues() {
    let mut rig = rig();
    rig.controller.start(email_profile()).unwrap();
    rig.injections.fail_from_now();

    rig.keyboard.type_text("-em");
    let events = rig.settle();
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], StatusEvent::InjectionFailed(ref r) if r.contains("read-only")));
    assert!(rig.injections.all().is_empty());
}

#[test]
fn hook_install_failure_leaves_engine_stopped() {
    let mut rig = rig_with(Some("accessibility permission not granted"));
    let err = rig.controller.start(email_profile()).unwrap_err();
    assert!(matches!(err, KeyflowError::HookUnavailable(_)));
    assert_eq!(rig.controller.state(), EnginePhase::Stopped);
    assert!(!rig.keyboard.is_installed());
}

#[test]
fn stop_uninstalls_hook_and_joins() {
    let mut rig = rig();
    rig.controller.start(email_profile()).unwrap();
    rig.keyboard.type_text("-e");
    rig.controller.stop().unwrap();

    assert_eq!(rig.controller.state(), EnginePhase::Stopped);
    assert!(!rig.keyboard.is_installed());
    assert!(!rig.keyboard.send(keyflow_core::KeyEvent::typed('m')));
    assert!(rig.injections.all().is_empty());

    // Stopping twice is harmless; operations on a stopped engine are refused.
    rig.controller.stop().unwrap();
    assert!(matches!(
        rig.controller.pause(),
        Err(KeyflowError::InvalidState { .. })
    ));
}

#[test]
fn engine_can_restart_after_stop() {
    let mut rig = rig();
    rig.controller.start(email_profile()).unwrap();
    rig.controller.stop().unwrap();
    rig.controller.start(email_profile()).unwrap();

    rig.keyboard.type_text("-em");
    assert_eq!(rig.settle().len(), 1);
}

#[test]
fn starting_twice_is_rejected() {
    let mut rig = rig();
    rig.controller.start(email_profile()).unwrap();
    assert!(matches!(
        rig.controller.start(email_profile()),
        Err(KeyflowError::InvalidState { operation: "start", .. })
    ));
}

#[test]
fn set_profiles_reports_rejected_entries_and_cycles() {
    let mut rig = rig();
    rig.controller.start(email_profile()).unwrap();

    let profiles = vec![
        email_profile(),
        Profile::new("broken").with_trigger("a", "1").with_trigger("ab", "2"),
        Profile::new("work").with_trigger("-sig", "Regards"),
    ];
    rig.controller
        .set_profiles(&profiles, &ProfileId::from("main"))
        .unwrap();
    rig.keyboard.chord(Key::Function(11));

    let events = rig.settle();
    assert!(events.contains(&StatusEvent::ProfileSwitched(ProfileId::from("main"))));
    assert!(events
        .iter()
        .any(|e| matches!(e, StatusEvent::ProfileSwitchRejected { id, .. } if id.as_str() == "broken")));
    assert_eq!(
        events.last(),
        Some(&StatusEvent::ProfileSwitched(ProfileId::from("work")))
    );
}

#[test]
fn hook_loss_is_reported() {
    let mut rig = rig();
    rig.controller.start(email_profile()).unwrap();
    rig.keyboard.lose_hook("display server went away");
    assert_eq!(
        rig.settle(),
        vec![StatusEvent::HookLost("display server went away".to_string())]
    );
}

#[test]
fn inserted_text_containing_a_trigger_does_not_expand_again() {
    let mut rig = rig();
    rig.controller
        .start(Profile::new("main").with_trigger("-a", "x-a"))
        .unwrap();
    rig.injections.echo_from_now();

    rig.keyboard.type_text("-a");
    assert_eq!(
        rig.settle(),
        vec![StatusEvent::ExpansionFired("-a".to_string())]
    );
    assert_eq!(rig.injections.all(), vec![(2, "x-a".to_string())]);

    rig.keyboard.type_text(" -a");
    assert_eq!(
        rig.settle(),
        vec![StatusEvent::ExpansionFired("-a".to_string())]
    );
    assert_eq!(rig.injections.all().len(), 2);
}
